//! Jacktime Core - Beat Frame Prediction for Shared Transports
//!
//! This crate contains everything needed to follow a shared musical transport
//! and predict the exact frame at which upcoming beats land:
//! - Transport position snapshots and BBT defaults
//! - Edge-triggered discontinuity detection
//! - The beat frame prediction engine with per-tempo segments
//! - A timebase master and a simulated transport
//! - The per-cycle client pipeline
//! - Configuration and logging settings
//!
//! ## Quick Start
//!
//! ```rust
//! use jacktime_core::{Meter, RefinementMode, SimulatedTransport, TimebaseClient, TimebaseMaster};
//!
//! let master = TimebaseMaster::new(48_000, Meter::default(), 120.0).unwrap();
//! let mut transport = SimulatedTransport::new(master, 512).unwrap();
//! let first = transport.master().position(0);
//! let (mut client, _control) =
//!     TimebaseClient::new(&first, 512, RefinementMode::SinglePass).unwrap();
//!
//! transport.start();
//! for _ in 0..200 {
//!     client.process(&transport.next_cycle()).unwrap();
//! }
//! let frame = client.predict_beat_frame(8).unwrap();
//! assert!(frame.is_some());
//! ```

#![allow(missing_docs)]

/// Client pipeline
pub mod client;
/// Process configuration
pub mod config;
/// Discontinuity detection
pub mod discontinuity;
/// Error types
pub mod error;
/// Logging settings
pub mod logging;
/// Transport position types
pub mod position;
/// Beat frame prediction engine
pub mod predictor;
/// Simulated transport
pub mod simulation;
/// Timebase master
pub mod timebase;

// Re-exports
pub use client::{BeatPrediction, ControlCommand, ControlHandle, CycleReport, TimebaseClient};
pub use config::{BackendKind, EngineConfig, JacktimeConfig, Role, TransportConfig, TransportEvent};
pub use discontinuity::{ContinuityEvent, DiscontinuityDetector};
pub use error::{ConfigError, Result, SyncError};
pub use logging::LogConfig;
pub use position::{Bbt, Cycle, Frames, Meter, PositionBits, TransportSnapshot, TransportState};
pub use predictor::{
    AdjustOutcome, BeatPredictor, BeatRecord, BeatWindow, FpbBound, RefinementMode, SegmentId,
    TempoSegment, MAX_BEAT_GAP,
};
pub use simulation::SimulatedTransport;
pub use timebase::TimebaseMaster;
