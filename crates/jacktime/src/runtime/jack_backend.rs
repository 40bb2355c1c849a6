//! JACK transport follower
//!
//! Registers a client with the running JACK server and drives a
//! [`TimebaseClient`] from its process callback. Only the follower role is
//! available here; publishing positions to JACK is left to a real timebase
//! master.

use super::reporter::{ReportMessage, ReportSender};
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use jacktime_core::{
    ControlHandle, Cycle, JacktimeConfig, PositionBits, Role, TimebaseClient, TransportSnapshot,
    TransportState,
};
use tracing::{info, warn};

fn snapshot_from(pos: &jack::TransportPosition, fallback_rate: u32) -> TransportSnapshot {
    let frame_rate = pos.frame_rate().unwrap_or(fallback_rate);
    let mut snapshot = TransportSnapshot::frame_only(u64::from(pos.frame()), frame_rate);
    if let Some(bbt) = pos.bbt() {
        snapshot.bar = bbt.bar as i32;
        snapshot.beat = bbt.beat as i32;
        snapshot.tick = bbt.tick as f64;
        snapshot.beats_per_bar = bbt.sig_num;
        snapshot.beat_type = bbt.sig_denom;
        snapshot.ticks_per_beat = bbt.ticks_per_beat;
        snapshot.beats_per_minute = bbt.bpm;
        snapshot.valid = PositionBits::BBT;
    }
    snapshot
}

fn state_from(state: jack::TransportState) -> TransportState {
    match state {
        jack::TransportState::Rolling => TransportState::Rolling,
        _ => TransportState::Stopped,
    }
}

struct FollowerProcess {
    client: TimebaseClient,
    control: ControlHandle,
    reports: ReportSender,
    frame_rate: u32,
}

impl jack::ProcessHandler for FollowerProcess {
    fn process(&mut self, client: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        let query = match client.transport().query() {
            Ok(query) => query,
            Err(_) => return jack::Control::Continue,
        };
        let cycle = Cycle {
            snapshot: snapshot_from(&query.pos, self.frame_rate),
            cycle_length: ps.n_frames(),
            state: state_from(query.state),
        };
        let message = match self.client.process(&cycle) {
            Ok(report) => ReportMessage::Cycle(report),
            Err(error) => ReportMessage::Fault {
                frame: cycle.snapshot.frame,
                error,
            },
        };
        self.reports.send(message);
        jack::Control::Continue
    }

    fn buffer_size(&mut self, _: &jack::Client, size: jack::Frames) -> jack::Control {
        // Not a real-time callback; the engine picks it up next cycle
        if !self.control.set_block_length(size) {
            warn!("Buffer size change to {} was not queued", size);
        }
        jack::Control::Continue
    }
}

struct ServerNotifications {
    shutdown: Sender<()>,
}

impl jack::NotificationHandler for ServerNotifications {
    unsafe fn shutdown(&mut self, _: jack::ClientStatus, reason: &str) {
        warn!("JACK server shut down: {}", reason);
        let _ = self.shutdown.try_send(());
    }
}

/// Follow the JACK transport until `shutdown` fires or the server goes away
pub fn run(
    config: &JacktimeConfig,
    shutdown_tx: Sender<()>,
    shutdown: &Receiver<()>,
    reports: &ReportSender,
) -> Result<()> {
    if config.role == Role::Master {
        bail!("The JACK backend only supports the client role");
    }

    let name = config.client_name();
    let (client, status) = jack::Client::new(&name, jack::ClientOptions::NO_START_SERVER)
        .map_err(|e| anyhow!("Failed to connect to JACK as '{}': {:?}", name, e))?;
    info!(
        "Connected to JACK as '{}' ({:?}), {} Hz, {} frames per block",
        client.name(),
        status,
        client.sample_rate(),
        client.buffer_size()
    );

    let frame_rate = client.sample_rate() as u32;
    let first = client
        .transport()
        .query()
        .map_err(|e| anyhow!("Failed to query JACK transport: {:?}", e))?;
    let (timebase_client, control) = TimebaseClient::new(
        &snapshot_from(&first.pos, frame_rate),
        client.buffer_size(),
        config.engine.refinement,
    )
    .context("Failed to initialize beat prediction")?;

    let process = FollowerProcess {
        client: timebase_client,
        control,
        reports: reports.clone(),
        frame_rate,
    };
    let notifications = ServerNotifications {
        shutdown: shutdown_tx,
    };
    let active = client
        .activate_async(notifications, process)
        .map_err(|e| anyhow!("Failed to activate JACK client: {:?}", e))?;

    let _ = shutdown.recv();
    info!("Deactivating JACK client");
    active
        .deactivate()
        .map_err(|e| anyhow!("Failed to deactivate JACK client: {:?}", e))?;
    Ok(())
}
