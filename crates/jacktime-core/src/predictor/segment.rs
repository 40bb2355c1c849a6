//! Tempo segments and their frames-per-beat bounds

use serde::{Deserialize, Serialize};

/// Index of a segment in the engine's segment arena
pub type SegmentId = usize;

/// Result of applying one observation to a bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narrowing {
    Unchanged,
    Narrowed,
    /// The observation asked for an edge beyond the opposite edge. The bound
    /// collapsed onto the opposite edge instead of inverting.
    Conflict,
}

/// Closed interval `[low, high]` known to contain the true frames-per-beat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FpbBound {
    pub low: f64,
    pub high: f64,
}

impl FpbBound {
    /// `estimate ± slack`, never below zero
    pub fn around(estimate: f64, slack: u32) -> Self {
        let slack = f64::from(slack);
        Self {
            low: (estimate - slack).max(0.0),
            high: estimate + slack,
        }
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// Midpoint of the bound
    pub fn average(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn contains(&self, fpb: f64) -> bool {
        fpb >= self.low && fpb <= self.high
    }

    /// Tighten the bound against an observation spanning `beats` beats whose
    /// total length is known to lie within `[earliest, latest]` frames.
    ///
    /// Edges move in whole frames-per-beat units: `low` rises until
    /// `low * beats >= earliest`, `high` falls until `high * beats <= latest`.
    pub fn narrow(&mut self, beats: i64, earliest: f64, latest: f64) -> Narrowing {
        if beats <= 0 {
            return Narrowing::Unchanged;
        }
        let n = beats as f64;
        let mut outcome = Narrowing::Unchanged;

        if self.low * n < earliest {
            let mut raised = self.low + (earliest / n - self.low).ceil().max(1.0);
            if raised * n < earliest {
                raised += 1.0;
            }
            if raised > self.high {
                self.low = self.high;
                outcome = Narrowing::Conflict;
            } else {
                self.low = raised;
                outcome = Narrowing::Narrowed;
            }
        }

        if self.high * n > latest {
            let mut lowered = self.high - (self.high - latest / n).ceil().max(1.0);
            if lowered * n > latest {
                lowered -= 1.0;
            }
            if lowered < self.low {
                self.high = self.low;
                outcome = Narrowing::Conflict;
            } else {
                self.high = lowered;
                if outcome == Narrowing::Unchanged {
                    outcome = Narrowing::Narrowed;
                }
            }
        }

        outcome
    }
}

/// Reference point a segment extrapolates from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub beat: i64,
    pub frame: f64,
}

/// Run of beats `[start_beat, end_beat)` sharing one fpb bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoSegment {
    pub id: SegmentId,
    pub start_beat: i64,
    /// `None` while the segment extends to infinity
    pub end_beat: Option<i64>,
    pub bound: FpbBound,
    /// Tempo reported when the segment was opened
    pub bpm: f64,
    /// Earliest beat recorded inside this segment
    pub anchor_beat: Option<i64>,
    /// Extrapolation origin used until the segment has a recorded beat
    pub origin: AnchorPoint,
}

impl TempoSegment {
    pub fn contains(&self, beat: i64) -> bool {
        beat >= self.start_beat && self.end_beat.map_or(true, |end| beat < end)
    }

    pub fn is_open(&self) -> bool {
        self.end_beat.is_none()
    }
}
