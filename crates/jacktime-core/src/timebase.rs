//! Timebase master: publishes bar/beat/tick positions for frame indices
//!
//! The master owns a piecewise-constant tempo map. Each tempo change appends an
//! anchor at the frame where it takes effect, so beats that have already been
//! published keep their frames.

use crate::error::{Result, SyncError};
use crate::position::{frames_per_beat, Frames, Meter, PositionBits, TransportSnapshot};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoAnchor {
    frame: Frames,
    /// Beats elapsed since frame 0 at `frame`
    beats: f64,
    bpm: f64,
}

/// Tempo map and meter used to answer position queries
#[derive(Debug, Clone)]
pub struct TimebaseMaster {
    frame_rate: u32,
    meter: Meter,
    anchors: Vec<TempoAnchor>,
}

impl TimebaseMaster {
    pub fn new(frame_rate: u32, meter: Meter, bpm: f64) -> Result<Self> {
        frames_per_beat(frame_rate, bpm)?;
        if meter.beats_per_bar == 0 {
            return Err(SyncError::MissingMeterInfo);
        }
        Ok(Self {
            frame_rate,
            meter,
            anchors: vec![TempoAnchor {
                frame: 0,
                beats: 0.0,
                bpm,
            }],
        })
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn meter(&self) -> Meter {
        self.meter
    }

    /// Tempo in effect at `frame`
    pub fn tempo_at(&self, frame: Frames) -> f64 {
        self.anchor_at(frame).bpm
    }

    /// Change tempo from `frame` onwards.
    ///
    /// Anchors after `frame` are discarded: the timeline from there on is
    /// rewritten at the new tempo.
    pub fn set_tempo(&mut self, frame: Frames, bpm: f64) -> Result<()> {
        frames_per_beat(self.frame_rate, bpm)?;
        let beats = self.beats_at(frame);
        self.anchors.retain(|anchor| anchor.frame < frame);
        self.anchors.push(TempoAnchor { frame, beats, bpm });
        info!("Timebase: tempo {:.2} BPM from frame {}", bpm, frame);
        Ok(())
    }

    /// Full BBT position at `frame`
    pub fn position(&self, frame: Frames) -> TransportSnapshot {
        let anchor = self.anchor_at(frame);
        let abs_beat = self.beats_at(frame);
        let whole = abs_beat.floor();
        let bpb = f64::from(self.meter.beats_per_bar);

        TransportSnapshot {
            frame,
            frame_rate: self.frame_rate,
            bar: (whole / bpb).floor() as i32 + 1,
            beat: (whole % bpb) as i32 + 1,
            tick: (abs_beat - whole) * self.meter.ticks_per_beat,
            beats_per_bar: self.meter.beats_per_bar as f32,
            beat_type: self.meter.beat_type as f32,
            ticks_per_beat: self.meter.ticks_per_beat,
            beats_per_minute: anchor.bpm,
            valid: PositionBits::BBT,
        }
    }

    /// First frame at which `beat_number` is the reported beat
    pub fn beat_frame(&self, beat_number: i64) -> Option<Frames> {
        if beat_number < 1 {
            return None;
        }
        let target = (beat_number - 1) as f64;
        let anchor = self
            .anchors
            .iter()
            .rev()
            .find(|anchor| anchor.beats <= target)?;
        let fpb = Self::frames_per_beat(self.frame_rate, anchor.bpm);
        Some(anchor.frame + ((target - anchor.beats) * fpb).ceil() as Frames)
    }

    fn anchor_at(&self, frame: Frames) -> TempoAnchor {
        self.anchors
            .iter()
            .rev()
            .find(|anchor| anchor.frame <= frame)
            .copied()
            .unwrap_or(self.anchors[0])
    }

    fn beats_at(&self, frame: Frames) -> f64 {
        let anchor = self.anchor_at(frame);
        let elapsed = frame.saturating_sub(anchor.frame) as f64;
        anchor.beats + elapsed / Self::frames_per_beat(self.frame_rate, anchor.bpm)
    }

    // Dividing by frames-per-beat keeps whole-beat frames exact whenever the
    // beat length is an integral number of frames.
    fn frames_per_beat(frame_rate: u32, bpm: f64) -> f64 {
        f64::from(frame_rate) * 60.0 / bpm
    }
}
