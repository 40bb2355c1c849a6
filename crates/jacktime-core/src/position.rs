//! Transport position snapshots
//!
//! The transport oracle hands the client one [`TransportSnapshot`] per process
//! cycle. Snapshots are plain values: the engine copies what it needs and never
//! keeps a reference into the oracle's storage.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Frame index on the audio clock
pub type Frames = u64;

/// Default meter numerator when the transport carries no BBT data
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;
/// Default meter denominator
pub const DEFAULT_BEAT_TYPE: u32 = 4;
/// Default tempo
pub const DEFAULT_BPM: f64 = 120.0;
/// Default tick granularity
pub const DEFAULT_TICKS_PER_BEAT: f64 = 1920.0;

/// Bitmask describing which optional fields of a snapshot are meaningful.
///
/// Bit values follow the JACK `jack_position_bits_t` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PositionBits(pub u32);

impl PositionBits {
    /// No optional fields
    pub const NONE: Self = Self(0);
    /// Bar, beat, tick and meter fields are valid
    pub const BBT: Self = Self(0x10);
    /// Timecode fields are valid
    pub const TIMECODE: Self = Self(0x20);
    /// BBT frame offset is valid
    pub const BBT_FRAME_OFFSET: Self = Self(0x40);

    /// Check whether all bits of `other` are set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PositionBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Whether the transport is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Stopped,
    Rolling,
}

/// Time signature and tick resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub beats_per_bar: u32,
    pub beat_type: u32,
    pub ticks_per_beat: f64,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            beat_type: DEFAULT_BEAT_TYPE,
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
        }
    }
}

/// Validated bar/beat/tick position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbt {
    /// Bar, 1-based
    pub bar: u32,
    /// Beat within the bar, 1-based
    pub beat: u32,
    /// Tick within the beat
    pub tick: f64,
    pub meter: Meter,
    pub beats_per_minute: f64,
}

impl Bbt {
    /// Global beat number: `(bar - 1) * beats_per_bar + beat`
    pub fn beat_number(&self) -> i64 {
        (i64::from(self.bar) - 1) * i64::from(self.meter.beats_per_bar) + i64::from(self.beat)
    }

    /// Portion of the current beat already elapsed, in `[0, 1]`
    pub fn beat_fraction(&self) -> f64 {
        let fraction = self.tick / self.meter.ticks_per_beat;
        if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Derive a position from a frame index assuming the default meter and
    /// tempo have been in effect since frame 0.
    pub fn from_frame_with_defaults(frame: Frames, frame_rate: u32) -> Self {
        let meter = Meter::default();
        if frame_rate == 0 {
            return Self {
                bar: 1,
                beat: 1,
                tick: 0.0,
                meter,
                beats_per_minute: DEFAULT_BPM,
            };
        }

        let seconds = frame as f64 / f64::from(frame_rate);
        let abs_beat = seconds * DEFAULT_BPM / 60.0;
        let whole_beats = abs_beat.floor() as u64;
        let bpb = u64::from(meter.beats_per_bar);

        Self {
            bar: (whole_beats / bpb) as u32 + 1,
            beat: (whole_beats % bpb) as u32 + 1,
            tick: (abs_beat - abs_beat.floor()) * meter.ticks_per_beat,
            meter,
            beats_per_minute: DEFAULT_BPM,
        }
    }
}

/// One transport query, as reported at the start of a process cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportSnapshot {
    pub frame: Frames,
    pub frame_rate: u32,
    pub bar: i32,
    pub beat: i32,
    pub tick: f64,
    pub beats_per_bar: f32,
    pub beat_type: f32,
    pub ticks_per_beat: f64,
    pub beats_per_minute: f64,
    pub valid: PositionBits,
}

impl TransportSnapshot {
    /// Snapshot carrying only a frame position, with no BBT data
    pub fn frame_only(frame: Frames, frame_rate: u32) -> Self {
        Self {
            frame,
            frame_rate,
            bar: 0,
            beat: 0,
            tick: 0.0,
            beats_per_bar: 0.0,
            beat_type: 0.0,
            ticks_per_beat: 0.0,
            beats_per_minute: 0.0,
            valid: PositionBits::NONE,
        }
    }

    /// Validated BBT fields.
    ///
    /// Fails with [`SyncError::MissingMeterInfo`] when the BBT bit is unset or
    /// the fields cannot describe a real position.
    pub fn bbt(&self) -> Result<Bbt> {
        if !self.valid.contains(PositionBits::BBT)
            || self.bar < 1
            || self.beat < 1
            || self.beats_per_bar < 1.0
            || !self.beats_per_minute.is_finite()
            || self.beats_per_minute <= 0.0
        {
            return Err(SyncError::MissingMeterInfo);
        }

        let ticks_per_beat = if self.ticks_per_beat > 0.0 {
            self.ticks_per_beat
        } else {
            DEFAULT_TICKS_PER_BEAT
        };
        let beat_type = if self.beat_type >= 1.0 {
            self.beat_type as u32
        } else {
            DEFAULT_BEAT_TYPE
        };

        Ok(Bbt {
            bar: self.bar as u32,
            beat: self.beat as u32,
            tick: self.tick,
            meter: Meter {
                beats_per_bar: self.beats_per_bar as u32,
                beat_type,
                ticks_per_beat,
            },
            beats_per_minute: self.beats_per_minute,
        })
    }

    /// BBT fields, substituting the default 4/4 at 120 BPM when absent
    pub fn bbt_or_default(&self) -> Bbt {
        self.bbt()
            .unwrap_or_else(|_| Bbt::from_frame_with_defaults(self.frame, self.frame_rate))
    }

    /// Global beat number of this position
    pub fn beat_number(&self) -> i64 {
        self.bbt_or_default().beat_number()
    }

    /// Tempo reported by this snapshot, or the default tempo
    pub fn tempo_bpm(&self) -> f64 {
        self.bbt_or_default().beats_per_minute
    }
}

/// One process cycle as delivered by the harness
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cycle {
    pub snapshot: TransportSnapshot,
    pub cycle_length: u32,
    pub state: TransportState,
}

/// Frames spanned by one beat at `bpm`
pub fn frames_per_beat(frame_rate: u32, bpm: f64) -> Result<f64> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(SyncError::InvalidTempo(bpm));
    }
    Ok(f64::from(frame_rate) / (bpm / 60.0))
}
