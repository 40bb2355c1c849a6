//! Timer-paced in-process transport
//!
//! A [`SimulatedTransport`] is advanced one block per tick of a crossbeam
//! ticker whose period matches the block duration. Scripted tempo changes,
//! relocations and block length changes are applied when the playhead reaches
//! them.

use super::reporter::{ReportMessage, ReportSender};
use anyhow::{Context, Result};
use crossbeam_channel::{select, tick, Receiver};
use jacktime_core::{
    ControlHandle, Frames, JacktimeConfig, Role, SimulatedTransport, TimebaseClient,
    TimebaseMaster, TransportEvent,
};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

enum Follower {
    /// Publish positions only
    Master,
    Client {
        client: Box<TimebaseClient>,
        control: ControlHandle,
    },
}

/// Simulated transport plus whatever consumes its cycles
pub struct SimulationDriver {
    transport: SimulatedTransport,
    script: VecDeque<TransportEvent>,
    follower: Follower,
    rolled: Frames,
    limit: Option<Frames>,
}

impl SimulationDriver {
    /// Build the transport, its scripted events and the follower for `config.role`
    pub fn new(config: &JacktimeConfig) -> Result<Self> {
        let settings = &config.transport;
        let master = TimebaseMaster::new(settings.frame_rate, settings.meter(), settings.bpm)
            .context("Invalid transport tempo")?;
        let mut transport = SimulatedTransport::new(master, settings.block_length)
            .context("Invalid block length")?;

        let follower = match config.role {
            Role::Master => Follower::Master,
            Role::Client => {
                let first = transport.master().position(transport.frame());
                let (client, control) = TimebaseClient::new(
                    &first,
                    settings.block_length,
                    config.engine.refinement,
                )
                .context("Failed to initialize beat prediction")?;
                Follower::Client {
                    client: Box::new(client),
                    control,
                }
            }
        };

        let mut script = settings.script.clone();
        script.sort_by_key(TransportEvent::at_frame);

        transport.start();
        Ok(Self {
            transport,
            script: script.into(),
            follower,
            rolled: 0,
            limit: settings.duration_frames(),
        })
    }

    /// Transport being played
    pub fn transport(&self) -> &SimulatedTransport {
        &self.transport
    }

    /// Following client, `None` when running as master
    pub fn client(&self) -> Option<&TimebaseClient> {
        match &self.follower {
            Follower::Master => None,
            Follower::Client { client, .. } => Some(&**client),
        }
    }

    /// Configured run length has been played
    pub fn finished(&self) -> bool {
        self.limit.is_some_and(|limit| self.rolled >= limit)
    }

    /// Duration of the next block
    pub fn block_period(&self) -> Duration {
        let frame_rate = f64::from(self.transport.master().frame_rate());
        Duration::from_secs_f64(f64::from(self.transport.block_length()) / frame_rate)
    }

    /// Advance one block and produce its report
    pub fn step(&mut self) -> ReportMessage {
        self.apply_due_events();

        let cycle = self.transport.next_cycle();
        self.rolled += Frames::from(cycle.cycle_length);

        match &mut self.follower {
            Follower::Master => ReportMessage::Published(cycle.snapshot),
            Follower::Client { client, .. } => match client.process(&cycle) {
                Ok(report) => ReportMessage::Cycle(report),
                Err(error) => ReportMessage::Fault {
                    frame: cycle.snapshot.frame,
                    error,
                },
            },
        }
    }

    fn apply_due_events(&mut self) {
        while let Some(event) = self.script.front().copied() {
            if event.at_frame() > self.transport.frame() {
                break;
            }
            self.script.pop_front();
            match event {
                TransportEvent::Tempo { bpm, .. } => {
                    if let Err(e) = self.transport.set_tempo(bpm) {
                        warn!("Ignoring scripted tempo {}: {}", bpm, e);
                    }
                }
                TransportEvent::Locate { to_frame, .. } => self.transport.locate(to_frame),
                TransportEvent::BlockLength { frames, .. } => {
                    if let Err(e) = self.transport.set_block_length(frames) {
                        warn!("Ignoring scripted block length: {}", e);
                        continue;
                    }
                    if let Follower::Client { control, .. } = &self.follower {
                        if !control.set_block_length(frames) {
                            warn!("Block length change to {} was not queued", frames);
                        }
                    }
                }
            }
        }
    }
}

/// Run until the configured duration elapses or `shutdown` fires
pub fn run(config: &JacktimeConfig, shutdown: &Receiver<()>, reports: &ReportSender) -> Result<()> {
    let mut driver = SimulationDriver::new(config)?;
    let mut period = driver.block_period();
    let mut ticker = tick(period);

    info!(
        "Simulated transport rolling: {} Hz, {} frames per block, {:.2} BPM",
        config.transport.frame_rate, config.transport.block_length, config.transport.bpm
    );

    while !driver.finished() {
        select! {
            recv(shutdown) -> _ => {
                info!("Shutdown requested");
                break;
            }
            recv(ticker) -> _ => {
                reports.send(driver.step());
                let next = driver.block_period();
                if next != period {
                    debug!("Block period now {:?}", next);
                    period = next;
                    ticker = tick(period);
                }
            }
        }
    }

    info!(
        "Simulated transport stopped at frame {}",
        driver.transport().frame()
    );
    Ok(())
}
