//! Beat frame prediction
//!
//! The transport only reports its position once per process cycle, so the
//! exact frame of a beat is never observed directly: the block in which the
//! reported beat number first advanced only tells us the beat landed during
//! the block before it. [`BeatPredictor`] keeps every such window and uses
//! pairs of them to bound the true frames-per-beat of the current tempo. The
//! bound narrows as more beats are observed, and predictions extrapolate
//! linearly from the segment's first recorded beat using the bound's average.
//!
//! The seed window of beat 1 is read the same way as an observed one, so its
//! beat estimate sits half a block before frame 0.
//!
//! Tempo changes split the beat line into [`TempoSegment`]s, each with its own
//! bound. Segments are stored in an append-only arena and always partition the
//! beats `>= 1`.

mod segment;
mod window;

pub use segment::{AnchorPoint, FpbBound, Narrowing, SegmentId, TempoSegment};
pub use window::BeatWindow;

use crate::error::{Result, SyncError};
use crate::position::{frames_per_beat, Frames, TransportSnapshot};
use serde::{Deserialize, Serialize};

/// Furthest past the last stored beat a new record may land. Keeps the beat
/// arena from growing without bound on a corrupt beat number.
pub const MAX_BEAT_GAP: i64 = 1 << 16;

/// How [`BeatPredictor::adjust_bounds`] revisits old observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementMode {
    /// Each record narrows the bound once and is then marked checked
    #[default]
    SinglePass,
    /// Every record of the active segment is re-applied on each call
    MultiPass,
}

/// One observed (or seeded) beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatRecord {
    pub window: BeatWindow,
    pub segment: SegmentId,
    /// Refinement finalized; only used in single-pass mode
    pub checked: bool,
}

/// Summary of one bound refinement pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustOutcome {
    /// Records applied to the bound
    pub examined: usize,
    /// Records that tightened at least one edge
    pub narrowed: usize,
    /// Records that contradicted the bound
    pub conflicts: usize,
}

/// Beat frame prediction engine state
#[derive(Debug, Clone)]
pub struct BeatPredictor {
    current_segment: SegmentId,
    max_buffer_size: u32,
    refinement: RefinementMode,
    /// Indexed by `beat_number - 1`
    beats: Vec<Option<BeatRecord>>,
    segments: Vec<TempoSegment>,
    /// Recorded beats not yet applied in single-pass mode
    pending: Vec<i64>,
}

impl BeatPredictor {
    /// Seed the engine from the first transport snapshot.
    ///
    /// Beat 1 is assumed to fall within the first block of the timeline, and
    /// segment 0 starts with the reported tempo plus or minus one block.
    pub fn initialize(
        snapshot: &TransportSnapshot,
        block_length: u32,
        refinement: RefinementMode,
    ) -> Result<Self> {
        if block_length == 0 {
            return Err(SyncError::InvalidBlockLength(block_length));
        }
        let bpm = snapshot.tempo_bpm();
        let fpb = frames_per_beat(snapshot.frame_rate, bpm)?;
        let seed = BeatWindow::new(0, block_length);

        let segment = TempoSegment {
            id: 0,
            start_beat: 1,
            end_beat: None,
            bound: FpbBound::around(fpb, block_length),
            bpm,
            anchor_beat: Some(1),
            origin: AnchorPoint {
                beat: 1,
                frame: seed.beat_estimate(),
            },
        };

        Ok(Self {
            current_segment: 0,
            max_buffer_size: block_length,
            refinement,
            beats: vec![Some(BeatRecord {
                window: seed,
                segment: 0,
                checked: false,
            })],
            segments: vec![segment],
            pending: Vec::new(),
        })
    }

    pub fn current_segment_id(&self) -> SegmentId {
        self.current_segment
    }

    pub fn current_segment(&self) -> &TempoSegment {
        &self.segments[self.current_segment]
    }

    pub fn segment(&self, id: SegmentId) -> Option<&TempoSegment> {
        self.segments.get(id)
    }

    /// All segments in creation order
    pub fn segments(&self) -> &[TempoSegment] {
        &self.segments
    }

    pub fn max_buffer_size(&self) -> u32 {
        self.max_buffer_size
    }

    pub fn refinement(&self) -> RefinementMode {
        self.refinement
    }

    pub fn record(&self, beat_number: i64) -> Option<&BeatRecord> {
        let index = usize::try_from(beat_number.checked_sub(1)?).ok()?;
        self.beats.get(index)?.as_ref()
    }

    /// Number of beats with a record
    pub fn recorded_beats(&self) -> usize {
        self.beats.iter().filter(|r| r.is_some()).count()
    }

    /// Segment whose beat range contains `beat_number`
    pub fn segment_for_beat(&self, beat_number: i64) -> Option<SegmentId> {
        self.segments
            .iter()
            .position(|segment| segment.contains(beat_number))
    }

    /// Record the block in which the reported beat advanced and refine the
    /// active segment's bound.
    ///
    /// A second observation of the same beat overwrites the first. Beats more
    /// than [`MAX_BEAT_GAP`] past the stored ones fail with
    /// [`SyncError::BeatOutOfRange`] and are not stored.
    pub fn record_beat(
        &mut self,
        snapshot: &TransportSnapshot,
        cycle_length: u32,
    ) -> Result<AdjustOutcome> {
        let beat_number = snapshot.beat_number();
        let Ok(index) = usize::try_from(beat_number - 1) else {
            return Ok(AdjustOutcome::default());
        };
        if beat_number - self.beats.len() as i64 > MAX_BEAT_GAP {
            return Err(SyncError::BeatOutOfRange {
                beat: beat_number,
                max_gap: MAX_BEAT_GAP,
            });
        }
        let width = if cycle_length == 0 {
            self.max_buffer_size
        } else {
            cycle_length
        };

        // The active segment follows the playhead across segment boundaries
        if !self.segments[self.current_segment].contains(beat_number) {
            if let Some(id) = self.segment_for_beat(beat_number) {
                self.current_segment = id;
            }
        }
        let segment_id = self.current_segment;

        if self.beats.len() <= index {
            self.beats.resize(index + 1, None);
        }
        self.beats[index] = Some(BeatRecord {
            window: BeatWindow::new(snapshot.frame, width),
            segment: segment_id,
            checked: false,
        });

        let segment = &mut self.segments[segment_id];
        if segment.anchor_beat.map_or(true, |anchor| beat_number < anchor) {
            segment.anchor_beat = Some(beat_number);
        }
        if self.refinement == RefinementMode::SinglePass && !self.pending.contains(&beat_number) {
            self.pending.push(beat_number);
        }

        Ok(self.adjust_bounds())
    }

    /// Tighten the active segment's fpb bound with its recorded beats.
    ///
    /// Each record is compared against the segment's anchor beat: if beat `a`
    /// landed in `(a0, a1]` and beat `b` in `(b0, b1]` (their
    /// [`BeatWindow::beat_span`]s), then `(b - a) * fpb` lies within
    /// `[b0 - a1, b1 - a0]`.
    pub fn adjust_bounds(&mut self) -> AdjustOutcome {
        let segment_id = self.current_segment;
        let mut outcome = AdjustOutcome::default();

        let Some(anchor_beat) = self.segments[segment_id].anchor_beat else {
            return outcome;
        };
        let Some((anchor_earliest, anchor_latest)) =
            self.record(anchor_beat).map(|r| r.window.beat_span())
        else {
            return outcome;
        };

        let candidates: Vec<i64> = match self.refinement {
            RefinementMode::SinglePass => {
                let (ours, others): (Vec<i64>, Vec<i64>) =
                    self.pending.iter().copied().partition(|&beat| {
                        self.record(beat)
                            .map_or(false, |record| record.segment == segment_id)
                    });
                self.pending = others;
                ours
            }
            RefinementMode::MultiPass => {
                let segment = &self.segments[segment_id];
                let last = segment
                    .end_beat
                    .unwrap_or(self.beats.len() as i64 + 1)
                    .min(self.beats.len() as i64 + 1);
                (segment.start_beat..last)
                    .filter(|&beat| {
                        self.record(beat)
                            .map_or(false, |record| record.segment == segment_id)
                    })
                    .collect()
            }
        };

        for beat in candidates {
            let Some(record) = self.record(beat).copied() else {
                continue;
            };
            if self.refinement == RefinementMode::SinglePass && record.checked {
                continue;
            }

            let n = beat - anchor_beat;
            if n > 0 {
                let (beat_earliest, beat_latest) = record.window.beat_span();
                let earliest = beat_earliest - anchor_latest;
                let latest = beat_latest - anchor_earliest;

                outcome.examined += 1;
                match self.segments[segment_id].bound.narrow(n, earliest, latest) {
                    Narrowing::Unchanged => {}
                    Narrowing::Narrowed => outcome.narrowed += 1,
                    Narrowing::Conflict => outcome.conflicts += 1,
                }
            }

            if self.refinement == RefinementMode::SinglePass {
                if let Some(Some(stored)) = self.beats.get_mut((beat - 1) as usize) {
                    stored.checked = true;
                }
            }
        }

        outcome
    }

    /// Close the active segment after the reported beat and open a new one at
    /// the reported tempo.
    ///
    /// The new segment extrapolates from the reported beat until it records a
    /// beat of its own.
    pub fn record_tempo_change(&mut self, snapshot: &TransportSnapshot) -> Result<SegmentId> {
        let bpm = snapshot.tempo_bpm();
        let fpb = frames_per_beat(snapshot.frame_rate, bpm)?;
        let current_beat = snapshot.beat_number();
        let next_beat = current_beat + 1;
        let bound = FpbBound::around(fpb, self.max_buffer_size);
        let origin = self.anchor_for_beat(snapshot, fpb)?;

        if let Some(id) = self.segment_for_beat(current_beat) {
            let active = &self.segments[self.current_segment];
            if !(active.start_beat == next_beat && active.anchor_beat.is_none()) {
                self.current_segment = id;
            }
        }

        // A segment that has not seen a beat yet only holds the previous tempo
        // guess, so it is re-seeded instead of split.
        let active = &mut self.segments[self.current_segment];
        if active.start_beat >= next_beat && active.anchor_beat.is_none() {
            active.bound = bound;
            active.bpm = bpm;
            active.origin = origin;
            return Ok(active.id);
        }

        // Already closed right after the current beat: the change applies to
        // the following segment, whose own observations outrank the new tempo.
        if active.end_beat == Some(next_beat) {
            if let Some(id) = self.segment_for_beat(next_beat) {
                self.current_segment = id;
                let following = &mut self.segments[id];
                if following.anchor_beat.is_none() {
                    following.bound = bound;
                    following.bpm = bpm;
                    following.origin = origin;
                }
                return Ok(id);
            }
        }

        let active = &mut self.segments[self.current_segment];
        let end_beat = active.end_beat;
        active.end_beat = Some(next_beat);

        let id = self.segments.len();
        self.segments.push(TempoSegment {
            id,
            start_beat: next_beat,
            end_beat,
            bound,
            bpm,
            anchor_beat: None,
            origin,
        });
        self.current_segment = id;
        Ok(id)
    }

    /// Predicted frame of `beat_number`.
    ///
    /// Returns `Ok(None)` for beat numbers below 1.
    pub fn predict_beat_frame(&self, beat_number: i64) -> Result<Option<Frames>> {
        if beat_number <= 0 {
            return Ok(None);
        }
        let segment_id = match self.record(beat_number) {
            Some(record) => record.segment,
            None => self
                .segment_for_beat(beat_number)
                .ok_or(SyncError::UnknownBeatQuery(beat_number))?,
        };
        let segment = &self.segments[segment_id];
        let origin = self.segment_origin(segment);

        let frame =
            segment.bound.average() * (beat_number - origin.beat) as f64 + origin.frame;
        Ok(Some(frame.max(0.0).floor() as Frames))
    }

    /// Point the active segment at the one containing the post-jump position
    pub fn reposition(&mut self, snapshot: &TransportSnapshot) -> SegmentId {
        if let Some(id) = self.segment_for_beat(snapshot.beat_number()) {
            self.current_segment = id;
        }
        self.current_segment
    }

    /// Block length used for windows and bounds created from now on
    pub fn set_block_length(&mut self, block_length: u32) -> Result<()> {
        if block_length == 0 {
            return Err(SyncError::InvalidBlockLength(block_length));
        }
        self.max_buffer_size = block_length;
        Ok(())
    }

    fn segment_origin(&self, segment: &TempoSegment) -> AnchorPoint {
        segment
            .anchor_beat
            .and_then(|beat| {
                self.record(beat).map(|record| AnchorPoint {
                    beat,
                    frame: record.window.beat_estimate(),
                })
            })
            .unwrap_or(segment.origin)
    }

    /// Extrapolation point for the snapshot's beat: its own record if
    /// observed, then the tick offset reported with it, then the model of the
    /// segment covering it
    fn anchor_for_beat(&self, snapshot: &TransportSnapshot, fpb: f64) -> Result<AnchorPoint> {
        let beat_number = snapshot.beat_number();
        if let Some(record) = self.record(beat_number) {
            return Ok(AnchorPoint {
                beat: beat_number,
                frame: record.window.beat_estimate(),
            });
        }
        if let Ok(bbt) = snapshot.bbt() {
            return Ok(AnchorPoint {
                beat: beat_number,
                frame: snapshot.frame as f64 - bbt.beat_fraction() * fpb,
            });
        }
        let frame = self
            .predict_beat_frame(beat_number)?
            .ok_or(SyncError::UnknownBeatQuery(beat_number))?;
        Ok(AnchorPoint {
            beat: beat_number,
            frame: frame as f64,
        })
    }
}
