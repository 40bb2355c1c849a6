//! Error types for the synchronization engine
use thiserror::Error;

/// Faults raised by the prediction engine and the per-cycle pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The snapshot carried no valid bar/beat/tick data
    #[error("transport position has no valid BBT information")]
    MissingMeterInfo,

    /// No tempo segment covers the queried beat
    #[error("no tempo segment covers beat {0}")]
    UnknownBeatQuery(i64),

    /// The reported beat went backwards without a transport discontinuity
    #[error("beat number regressed from {previous} to {reported} without a discontinuity")]
    NonMonotonicBeatRegression {
        /// Last beat number seen by the pipeline
        previous: i64,
        /// Beat number reported this cycle
        reported: i64,
    },

    /// Beat number too far past the last recorded beat to be stored
    #[error("beat {beat} lies more than {max_gap} beats past the last recorded beat")]
    BeatOutOfRange {
        /// Beat number reported this cycle
        beat: i64,
        /// Largest accepted distance past the recorded beats
        max_gap: i64,
    },

    /// Block length of zero frames
    #[error("invalid block length: {0}")]
    InvalidBlockLength(u32),

    /// Tempo that cannot produce a finite frames-per-beat value
    #[error("invalid tempo: {0} BPM")]
    InvalidTempo(f64),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML deserialization error
    #[error("TOML parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Value out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
