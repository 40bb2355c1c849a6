//! Transport discontinuity detection

use crate::position::{Frames, TransportState};
use serde::{Deserialize, Serialize};

/// Classification of one process cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityEvent {
    /// Position matches the previous cycle's progression (or a jump is still
    /// being reported)
    Continuous,
    /// Rising edge of a position mismatch
    Discontinuous,
    /// Position matches again after a reported discontinuity
    ContinuityRestored,
}

/// Compares each cycle's frame against the frame expected from the previous
/// cycle.
///
/// A jump is reported exactly once: the latch stays set until the transport is
/// back in step with the expectation.
#[derive(Debug, Clone, Default)]
pub struct DiscontinuityDetector {
    expected_next_frame: Frames,
    latched: bool,
}

impl DiscontinuityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame the next cycle is expected to start at
    pub fn expected_next_frame(&self) -> Frames {
        self.expected_next_frame
    }

    /// Whether a discontinuity has been reported and not yet restored
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Classify a cycle starting at `frame`
    pub fn classify(&mut self, frame: Frames) -> ContinuityEvent {
        if frame != self.expected_next_frame {
            if !self.latched {
                self.latched = true;
                return ContinuityEvent::Discontinuous;
            }
        } else if self.latched {
            self.latched = false;
            return ContinuityEvent::ContinuityRestored;
        }
        ContinuityEvent::Continuous
    }

    /// Update the expectation after the cycle has been processed.
    ///
    /// A stopped transport does not advance.
    pub fn advance(&mut self, frame: Frames, cycle_length: u32, state: TransportState) {
        self.expected_next_frame = match state {
            TransportState::Rolling => frame + Frames::from(cycle_length),
            TransportState::Stopped => frame,
        };
    }

    /// Classify and advance in one step
    pub fn observe(
        &mut self,
        frame: Frames,
        cycle_length: u32,
        state: TransportState,
    ) -> ContinuityEvent {
        let event = self.classify(frame);
        self.advance(frame, cycle_length, state);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_rolling_is_continuous() {
        let mut detector = DiscontinuityDetector::new();
        for i in 0..10 {
            let event = detector.observe(i * 256, 256, TransportState::Rolling);
            assert_eq!(event, ContinuityEvent::Continuous);
        }
        assert_eq!(detector.expected_next_frame(), 2560);
    }

    #[test]
    fn test_stopped_does_not_advance() {
        let mut detector = DiscontinuityDetector::new();
        detector.observe(0, 256, TransportState::Stopped);
        assert_eq!(detector.expected_next_frame(), 0);
        assert_eq!(
            detector.observe(0, 256, TransportState::Stopped),
            ContinuityEvent::Continuous
        );
    }

    #[test]
    fn test_jump_then_restore() {
        let mut detector = DiscontinuityDetector::new();
        detector.observe(0, 128, TransportState::Rolling);

        assert_eq!(
            detector.observe(10_000, 128, TransportState::Rolling),
            ContinuityEvent::Discontinuous
        );
        assert!(detector.is_latched());
        assert_eq!(
            detector.observe(10_128, 128, TransportState::Rolling),
            ContinuityEvent::ContinuityRestored
        );
        assert!(!detector.is_latched());
    }

    #[test]
    fn test_persistent_mismatch_reported_once() {
        let mut detector = DiscontinuityDetector::new();
        assert_eq!(detector.classify(500), ContinuityEvent::Discontinuous);
        // Expectation never updated, so every cycle mismatches
        for _ in 0..5 {
            assert_eq!(detector.classify(500), ContinuityEvent::Continuous);
        }
    }
}
