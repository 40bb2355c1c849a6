use crate::position::Frames;
use serde::{Deserialize, Serialize};

/// Half-open frame interval `[start_frame, end_frame)` of the block in which
/// a beat was first reported.
///
/// The position is only sampled at block starts, so the beat itself happened
/// at most one window width before `start_frame`: see [`BeatWindow::beat_span`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeatWindow {
    pub start_frame: Frames,
    pub end_frame: Frames,
}

impl BeatWindow {
    /// Window of `width` frames starting at `start_frame`
    pub fn new(start_frame: Frames, width: u32) -> Self {
        Self {
            start_frame,
            end_frame: start_frame + Frames::from(width),
        }
    }

    pub fn width(&self) -> Frames {
        self.end_frame - self.start_frame
    }

    /// Frames `(earliest, latest]` the beat can have landed on
    pub fn beat_span(&self) -> (f64, f64) {
        let start = self.start_frame as f64;
        (start - self.width() as f64, start)
    }

    /// Centre of [`BeatWindow::beat_span`]
    pub fn beat_estimate(&self) -> f64 {
        self.start_frame as f64 - self.width() as f64 / 2.0
    }

    pub fn contains(&self, frame: Frames) -> bool {
        frame >= self.start_frame && frame < self.end_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        let window = BeatWindow::new(24_000, 512);
        assert_eq!(window.end_frame, 24_512);
        assert_eq!(window.width(), 512);
        assert_eq!(window.beat_span(), (23_488.0, 24_000.0));
        assert_eq!(window.beat_estimate(), 23_744.0);
        assert!(window.contains(24_000));
        assert!(window.contains(24_511));
        assert!(!window.contains(24_512));
    }

    #[test]
    fn test_seed_window_estimate_may_precede_zero() {
        let seed = BeatWindow::new(0, 1024);
        assert_eq!(seed.beat_span(), (-1024.0, 0.0));
        assert_eq!(seed.beat_estimate(), -512.0);
    }
}
