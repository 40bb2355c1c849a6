//! jacktime - follow a shared musical transport and predict beat frames
//!
//! Runs either as a timebase master publishing positions or as a client that
//! tracks the transport and estimates when upcoming beats will land.

#![warn(missing_docs)]

mod cli;
mod logging_setup;
mod runtime;

use anyhow::{Context, Result};
use jacktime_core::JacktimeConfig;
use tracing::info;

fn main() -> Result<()> {
    let options = match cli::parse_args(std::env::args_os()) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("error: {message}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };
    if options.show_help {
        print!("{}", cli::USAGE);
        return Ok(());
    }

    let mut config = match &options.config_path {
        Some(path) => JacktimeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => JacktimeConfig::default(),
    };
    options.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let _log_guard = logging_setup::init(&config)?;

    let summary = runtime::run(&config)?;

    info!(
        "Processed {} cycles: {} beats, {} jumps, {} tempo segments, {} conflicts, {} faults",
        summary.cycles,
        summary.beats_recorded,
        summary.discontinuities,
        summary.tempo_segments,
        summary.conflicts,
        summary.faults
    );
    if let Some(error) = summary.worst_prediction_error {
        info!("Worst beat prediction error: {} frames", error);
    }
    if summary.dropped > 0 {
        tracing::warn!("{} reports dropped by a full queue", summary.dropped);
    }

    Ok(())
}
