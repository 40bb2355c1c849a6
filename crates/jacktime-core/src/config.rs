//! Process configuration
//!
//! Everything the binary needs is carried in one [`JacktimeConfig`] value;
//! there is no process-wide mutable state.

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::position::{
    Frames, Meter, DEFAULT_BEATS_PER_BAR, DEFAULT_BEAT_TYPE, DEFAULT_BPM, DEFAULT_TICKS_PER_BEAT,
};
use crate::predictor::RefinementMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which side of the transport this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Publish transport positions
    Master,
    /// Follow the transport and predict beat frames
    #[default]
    Client,
}

impl Role {
    pub fn default_client_name(self) -> &'static str {
        match self {
            Role::Master => "jacktime_master",
            Role::Client => "jacktime_client",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Role::Master),
            "client" => Ok(Role::Client),
            other => Err(ConfigError::InvalidParameter(format!(
                "unknown role '{other}', expected 'master' or 'client'"
            ))),
        }
    }
}

/// Where transport positions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process transport paced by a timer
    #[default]
    Simulated,
    /// JACK sound server transport
    Jack,
}

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub refinement: RefinementMode,
}

/// Scripted action applied by the simulated transport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransportEvent {
    /// Change tempo once the playhead reaches `at_frame`
    Tempo { at_frame: Frames, bpm: f64 },
    /// Jump to `to_frame` once the playhead reaches `at_frame`
    Locate { at_frame: Frames, to_frame: Frames },
    /// Change the block length once the playhead reaches `at_frame`
    BlockLength { at_frame: Frames, frames: u32 },
}

impl TransportEvent {
    pub fn at_frame(&self) -> Frames {
        match *self {
            TransportEvent::Tempo { at_frame, .. }
            | TransportEvent::Locate { at_frame, .. }
            | TransportEvent::BlockLength { at_frame, .. } => at_frame,
        }
    }
}

/// Simulated transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub frame_rate: u32,
    pub block_length: u32,
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub beat_type: u32,
    pub ticks_per_beat: f64,
    /// Seconds of transport time to run; 0 runs until shutdown
    pub duration_secs: f64,
    pub script: Vec<TransportEvent>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            frame_rate: 48_000,
            block_length: 512,
            bpm: DEFAULT_BPM,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            beat_type: DEFAULT_BEAT_TYPE,
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            duration_secs: 0.0,
            script: Vec::new(),
        }
    }
}

impl TransportConfig {
    pub fn meter(&self) -> Meter {
        Meter {
            beats_per_bar: self.beats_per_bar,
            beat_type: self.beat_type,
            ticks_per_beat: self.ticks_per_beat,
        }
    }

    /// Run length in frames, `None` for unbounded
    pub fn duration_frames(&self) -> Option<Frames> {
        (self.duration_secs > 0.0)
            .then(|| (self.duration_secs * f64::from(self.frame_rate)) as Frames)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JacktimeConfig {
    pub role: Role,
    /// Client name registered with the sound server; defaults per role
    pub client_name: Option<String>,
    pub backend: BackendKind,
    pub engine: EngineConfig,
    pub transport: TransportConfig,
    pub log: LogConfig,
}

impl JacktimeConfig {
    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let transport = &self.transport;
        if transport.frame_rate == 0 {
            return Err(ConfigError::InvalidParameter(
                "transport.frame_rate must be positive".to_string(),
            ));
        }
        if transport.block_length == 0 {
            return Err(ConfigError::InvalidParameter(
                "transport.block_length must be positive".to_string(),
            ));
        }
        if transport.beats_per_bar == 0 || transport.beat_type == 0 {
            return Err(ConfigError::InvalidParameter(
                "transport meter must be positive".to_string(),
            ));
        }
        let tempos = std::iter::once(transport.bpm).chain(transport.script.iter().filter_map(
            |event| match event {
                TransportEvent::Tempo { bpm, .. } => Some(*bpm),
                _ => None,
            },
        ));
        for bpm in tempos {
            if !(bpm > 0.0 && bpm <= 1000.0) {
                return Err(ConfigError::InvalidParameter(format!(
                    "tempo must be within (0, 1000] BPM, got {bpm}"
                )));
            }
        }
        Ok(())
    }

    pub fn client_name(&self) -> String {
        self.client_name
            .clone()
            .unwrap_or_else(|| self.role.default_client_name().to_string())
    }
}
