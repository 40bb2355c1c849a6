//! Per-cycle client pipeline
//!
//! [`TimebaseClient`] is what a process callback drives: once per block it
//! classifies the transport position, feeds the prediction engine and returns a
//! [`CycleReport`]. It never blocks and never logs, so it is safe to call from
//! a real-time thread; reports are meant to be forwarded to another thread.

use crate::discontinuity::{ContinuityEvent, DiscontinuityDetector};
use crate::error::{Result, SyncError};
use crate::position::{Cycle, Frames, TransportSnapshot};
use crate::predictor::{AdjustOutcome, BeatPredictor, FpbBound, RefinementMode, SegmentId};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Capacity of the control command queue
const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Commands applied at the start of the next cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    SetBlockLength(u32),
}

/// Sender side for commands coming from non-real-time callbacks
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: Sender<ControlCommand>,
}

impl ControlHandle {
    /// Queue a block length change. Returns `false` for a zero length, a full
    /// queue or a client that is gone.
    pub fn set_block_length(&self, block_length: u32) -> bool {
        if block_length == 0 {
            return false;
        }
        match self
            .sender
            .try_send(ControlCommand::SetBlockLength(block_length))
        {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Predicted frame of an upcoming beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatPrediction {
    pub beat: i64,
    pub frame: Frames,
}

/// What happened during one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub frame: Frames,
    pub event: ContinuityEvent,
    pub beat_number: i64,
    /// BBT was missing and defaults were substituted
    pub meter_defaulted: bool,
    /// Beat recorded this cycle
    pub recorded_beat: Option<i64>,
    pub adjust: AdjustOutcome,
    /// Segment opened by a tempo change this cycle
    pub new_segment: Option<SegmentId>,
    pub segment: SegmentId,
    pub bound: FpbBound,
    pub next_beat: Option<BeatPrediction>,
}

/// Detector and engine wired together
pub struct TimebaseClient {
    detector: DiscontinuityDetector,
    engine: BeatPredictor,
    last_beat: i64,
    last_bpm: f64,
    /// A cycle has carried BBT data
    bbt_seen: bool,
    /// BBT went missing after `bbt_seen`; the next valid cycle resynchronizes
    bbt_lost: bool,
    commands: Receiver<ControlCommand>,
}

impl TimebaseClient {
    /// Create the client from the transport position observed at startup
    pub fn new(
        first: &TransportSnapshot,
        block_length: u32,
        refinement: RefinementMode,
    ) -> Result<(Self, ControlHandle)> {
        let engine = BeatPredictor::initialize(first, block_length, refinement)?;
        let (sender, commands) = bounded(COMMAND_QUEUE_CAPACITY);
        let client = Self {
            detector: DiscontinuityDetector::new(),
            engine,
            last_beat: first.beat_number(),
            last_bpm: first.tempo_bpm(),
            bbt_seen: first.bbt().is_ok(),
            bbt_lost: false,
            commands,
        };
        Ok((client, ControlHandle { sender }))
    }

    pub fn engine(&self) -> &BeatPredictor {
        &self.engine
    }

    pub fn detector(&self) -> &DiscontinuityDetector {
        &self.detector
    }

    pub fn predict_beat_frame(&self, beat_number: i64) -> Result<Option<Frames>> {
        self.engine.predict_beat_frame(beat_number)
    }

    /// Apply a block length change immediately
    pub fn set_block_length(&mut self, block_length: u32) -> Result<()> {
        self.engine.set_block_length(block_length)
    }

    /// Run one cycle.
    ///
    /// A beat number lower than the previous cycle's without a reported
    /// discontinuity fails with [`SyncError::NonMonotonicBeatRegression`]; the
    /// beat is not recorded, and the next cycle compares against it.
    ///
    /// Before any BBT data arrives, beats are derived from the frame with the
    /// default meter. Once BBT has been seen, a cycle without it holds the
    /// last valid beat and tempo and leaves the engine alone. The first cycle
    /// with BBT after either resynchronizes like a jump instead of recording a
    /// beat.
    pub fn process(&mut self, cycle: &Cycle) -> Result<CycleReport> {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                ControlCommand::SetBlockLength(length) => {
                    // Zero lengths are refused by the handle; keep the old one
                    let _ = self.engine.set_block_length(length);
                }
            }
        }

        let snapshot = &cycle.snapshot;
        let event = self.detector.classify(snapshot.frame);
        self.detector
            .advance(snapshot.frame, cycle.cycle_length, cycle.state);

        let meter_defaulted = snapshot.bbt().is_err();
        let mut recorded_beat = None;
        let mut adjust = AdjustOutcome::default();
        let mut new_segment = None;

        if meter_defaulted && self.bbt_seen {
            self.bbt_lost = true;
        } else {
            let bbt = snapshot.bbt_or_default();
            let beat_number = bbt.beat_number();
            let bpm = bbt.beats_per_minute;
            // Frame-derived defaults say nothing about where real BBT resumes
            let first_bbt = !meter_defaulted && !self.bbt_seen;
            let resync = event == ContinuityEvent::Discontinuous || self.bbt_lost || first_bbt;
            self.bbt_seen |= !meter_defaulted;
            self.bbt_lost = false;

            let previous_beat = std::mem::replace(&mut self.last_beat, beat_number);
            let previous_bpm = std::mem::replace(&mut self.last_bpm, bpm);

            if resync {
                new_segment = self.resync(snapshot, bpm)?;
            } else {
                if beat_number < previous_beat {
                    return Err(SyncError::NonMonotonicBeatRegression {
                        previous: previous_beat,
                        reported: beat_number,
                    });
                }
                if beat_number > previous_beat {
                    adjust = self.engine.record_beat(snapshot, cycle.cycle_length)?;
                    recorded_beat = Some(beat_number);
                }
                if bpm != previous_bpm {
                    new_segment = Some(self.engine.record_tempo_change(snapshot)?);
                }
            }
        }

        let beat_number = self.last_beat;
        let next_beat = self
            .engine
            .predict_beat_frame(beat_number + 1)?
            .map(|frame| BeatPrediction {
                beat: beat_number + 1,
                frame,
            });
        let segment = self.engine.current_segment();

        Ok(CycleReport {
            frame: snapshot.frame,
            event,
            beat_number,
            meter_defaulted,
            recorded_beat,
            adjust,
            new_segment,
            segment: segment.id,
            bound: segment.bound,
            next_beat,
        })
    }

    /// Follow the playhead to a position reached without a beat-by-beat
    /// observation. A tempo that differs from the segment found there opens a
    /// new segment after the current beat.
    fn resync(&mut self, snapshot: &TransportSnapshot, bpm: f64) -> Result<Option<SegmentId>> {
        self.engine.reposition(snapshot);
        if bpm != self.engine.current_segment().bpm {
            return Ok(Some(self.engine.record_tempo_change(snapshot)?));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{Meter, TransportState};
    use crate::simulation::SimulatedTransport;
    use crate::timebase::TimebaseMaster;

    fn setup() -> (SimulatedTransport, TimebaseClient, ControlHandle) {
        let master = TimebaseMaster::new(48_000, Meter::default(), 120.0).unwrap();
        let mut transport = SimulatedTransport::new(master, 512).unwrap();
        let first = transport.master().position(0);
        let (client, handle) =
            TimebaseClient::new(&first, 512, RefinementMode::SinglePass).unwrap();
        transport.start();
        (transport, client, handle)
    }

    #[test]
    fn test_records_each_beat_once() {
        let (mut transport, mut client, _handle) = setup();
        let mut recorded = Vec::new();
        while transport.frame() < 24_000 * 4 {
            let report = client.process(&transport.next_cycle()).unwrap();
            assert_eq!(report.event, ContinuityEvent::Continuous);
            recorded.extend(report.recorded_beat);
        }
        assert_eq!(recorded, vec![2, 3, 4]);
    }

    #[test]
    fn test_block_length_applied_at_cycle_start() {
        let (mut transport, mut client, handle) = setup();
        client.process(&transport.next_cycle()).unwrap();
        assert!(handle.set_block_length(1024));
        assert_eq!(client.engine().max_buffer_size(), 512);

        client.process(&transport.next_cycle()).unwrap();
        assert_eq!(client.engine().max_buffer_size(), 1024);
    }

    #[test]
    fn test_regression_without_jump_is_an_error() {
        let (_, mut client, _handle) = setup();
        let master = TimebaseMaster::new(48_000, Meter::default(), 120.0).unwrap();
        let rolling = |snapshot| Cycle {
            snapshot,
            cycle_length: 512,
            state: TransportState::Rolling,
        };
        client.process(&rolling(master.position(0))).unwrap();

        // Frame progression stays intact while the reported beat jumps around
        let mut ahead = master.position(512);
        ahead.beat = 3;
        let report = client.process(&rolling(ahead)).unwrap();
        assert_eq!(report.recorded_beat, Some(3));

        let result = client.process(&rolling(master.position(1024)));
        assert_eq!(
            result.unwrap_err(),
            SyncError::NonMonotonicBeatRegression {
                previous: 3,
                reported: 1
            }
        );
        assert_eq!(client.engine().recorded_beats(), 2);
    }

    #[test]
    fn test_handle_refuses_zero_block_length() {
        let (mut transport, mut client, handle) = setup();
        assert!(!handle.set_block_length(0));
        let report = client.process(&transport.next_cycle()).unwrap();
        assert_eq!(report.event, ContinuityEvent::Continuous);
        assert_eq!(client.engine().max_buffer_size(), 512);
    }

    #[test]
    fn test_first_bbt_after_defaults_resyncs() {
        let first = TransportSnapshot::frame_only(0, 48_000);
        let (mut client, _handle) =
            TimebaseClient::new(&first, 512, RefinementMode::SinglePass).unwrap();
        let rolling = |snapshot| Cycle {
            snapshot,
            cycle_length: 512,
            state: TransportState::Rolling,
        };
        let mut frame = 0;
        while frame < 24_000 * 3 {
            client
                .process(&rolling(TransportSnapshot::frame_only(frame, 48_000)))
                .unwrap();
            frame += 512;
        }

        // Real BBT says the transport is much earlier, at 60 BPM
        let master = TimebaseMaster::new(48_000, Meter::default(), 60.0).unwrap();
        let report = client.process(&rolling(master.position(frame))).unwrap();
        assert!(!report.meter_defaulted);
        assert_eq!(report.beat_number, 2);
        assert_eq!(report.recorded_beat, None);
        let id = report.new_segment.unwrap();
        assert_eq!(client.engine().segment(id).unwrap().bpm, 60.0);

        frame += 512;
        while client.engine().record(4).is_none() {
            client.process(&rolling(master.position(frame))).unwrap();
            frame += 512;
        }
        assert_eq!(client.engine().record(4).unwrap().segment, id);
    }
}
