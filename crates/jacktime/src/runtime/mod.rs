//! Transport backends and the report thread

pub mod reporter;
pub mod simulated;

#[cfg(feature = "jack")]
pub mod jack_backend;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender};
use jacktime_core::{BackendKind, JacktimeConfig};
use reporter::{ReportSummary, Reporter};
use std::io::{BufRead, IsTerminal};
use std::thread;
use tracing::{error, info};

/// Stop when the operator presses Enter or closes the terminal
fn watch_stdin(shutdown: Sender<()>) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Ok(());
    }
    eprintln!("Press Enter to stop");
    thread::Builder::new()
        .name("jacktime-stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            let _ = stdin.lock().read_line(&mut line);
            let _ = shutdown.try_send(());
        })?;
    Ok(())
}

/// Run the configured backend to completion
pub fn run(config: &JacktimeConfig) -> Result<ReportSummary> {
    let (shutdown_tx, shutdown_rx) = bounded(1);
    watch_stdin(shutdown_tx.clone()).context("Failed to watch stdin")?;

    let (reporter, reports) = Reporter::spawn().context("Failed to spawn reporter thread")?;

    info!(
        "Starting {:?} as {:?} ('{}')",
        config.backend,
        config.role,
        config.client_name()
    );

    let outcome = match config.backend {
        BackendKind::Simulated => simulated::run(config, &shutdown_rx, &reports),
        #[cfg(feature = "jack")]
        BackendKind::Jack => jack_backend::run(config, shutdown_tx, &shutdown_rx, &reports),
        #[cfg(not(feature = "jack"))]
        BackendKind::Jack => Err(anyhow::anyhow!(
            "jacktime was built without JACK support (enable the 'jack' feature)"
        )),
    };

    drop(reports);
    let summary = reporter.finish();
    if let Err(e) = &outcome {
        error!("Backend failed: {:#}", e);
    }
    outcome.map(|()| summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacktime_core::Role;

    #[test]
    fn test_simulated_run_returns_summary() {
        let mut config = JacktimeConfig {
            role: Role::Client,
            ..Default::default()
        };
        config.transport.duration_secs = 0.02;
        let summary = run(&config).unwrap();
        // 960 frames in blocks of 512
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.faults, 0);
    }

    #[cfg(not(feature = "jack"))]
    #[test]
    fn test_jack_backend_unavailable() {
        let config = JacktimeConfig {
            backend: BackendKind::Jack,
            ..Default::default()
        };
        assert!(run(&config).is_err());
    }
}
