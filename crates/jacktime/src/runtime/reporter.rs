//! Off-thread consumer of cycle reports
//!
//! The process side only ever calls [`ReportSender::send`], which never blocks.
//! When the queue is full the message is dropped and counted.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use jacktime_core::{ContinuityEvent, CycleReport, Frames, SyncError, TransportSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const REPORT_QUEUE_CAPACITY: usize = 1024;

/// Messages produced once per process cycle
#[derive(Debug, Clone)]
pub enum ReportMessage {
    /// Outcome of a client cycle
    Cycle(CycleReport),
    /// Client cycle that returned an error
    Fault {
        /// Frame at the start of the failed cycle
        frame: Frames,
        /// Error returned by the cycle
        error: SyncError,
    },
    /// Position published by a master
    Published(TransportSnapshot),
}

/// Totals gathered by the reporter thread
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportSummary {
    /// Cycles processed, client or master
    pub cycles: u64,
    /// Beats recorded by the engine
    pub beats_recorded: u64,
    /// Jumps reported by the detector
    pub discontinuities: u64,
    /// Segments opened by tempo changes
    pub tempo_segments: u64,
    /// Observations that contradicted a bound
    pub conflicts: u64,
    /// Cycles that failed
    pub faults: u64,
    /// Messages lost to a full queue
    pub dropped: u64,
    /// Largest gap between a beat's predicted and observed frame
    pub worst_prediction_error: Option<Frames>,
}

/// Non-blocking sending side, safe to use from a process callback
#[derive(Debug, Clone)]
pub struct ReportSender {
    sender: Sender<ReportMessage>,
    dropped: Arc<AtomicU64>,
}

impl ReportSender {
    /// Queue `message`, counting it as dropped if the queue is full
    pub fn send(&self, message: ReportMessage) {
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Handle to the reporter thread
pub struct Reporter {
    handle: JoinHandle<ReportSummary>,
    dropped: Arc<AtomicU64>,
}

impl Reporter {
    /// Spawn the reporter thread
    pub fn spawn() -> std::io::Result<(Self, ReportSender)> {
        let (sender, receiver) = bounded(REPORT_QUEUE_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let handle = thread::Builder::new()
            .name("jacktime-reporter".to_string())
            .spawn(move || consume(receiver))?;
        Ok((
            Self {
                handle,
                dropped: Arc::clone(&dropped),
            },
            ReportSender { sender, dropped },
        ))
    }

    /// Wait for every sender to be dropped and return the totals
    pub fn finish(self) -> ReportSummary {
        let mut summary = match self.handle.join() {
            Ok(summary) => summary,
            Err(_) => {
                error!("Reporter thread panicked");
                ReportSummary::default()
            }
        };
        summary.dropped = self.dropped.load(Ordering::Relaxed);
        summary
    }
}

fn consume(receiver: Receiver<ReportMessage>) -> ReportSummary {
    let mut tracker = ReportTracker::default();
    for message in receiver {
        tracker.handle(&message);
    }
    tracker.summary
}

#[derive(Debug, Default)]
struct ReportTracker {
    summary: ReportSummary,
    /// Prediction made in an earlier cycle for the next beat
    pending_prediction: Option<(i64, Frames)>,
    last_published_bar: Option<i32>,
    meter_defaulted: bool,
}

impl ReportTracker {
    fn handle(&mut self, message: &ReportMessage) {
        match message {
            ReportMessage::Cycle(report) => self.cycle(report),
            ReportMessage::Fault { frame, error } => {
                self.summary.faults += 1;
                self.pending_prediction = None;
                error!("Cycle at frame {} failed: {}", frame, error);
            }
            ReportMessage::Published(snapshot) => {
                self.summary.cycles += 1;
                if self.last_published_bar != Some(snapshot.bar) {
                    self.last_published_bar = Some(snapshot.bar);
                    info!(
                        "Bar {} at frame {} ({:.2} BPM, {}/{})",
                        snapshot.bar,
                        snapshot.frame,
                        snapshot.beats_per_minute,
                        snapshot.beats_per_bar,
                        snapshot.beat_type
                    );
                }
            }
        }
    }

    fn cycle(&mut self, report: &CycleReport) {
        self.summary.cycles += 1;

        if report.meter_defaulted != self.meter_defaulted {
            self.meter_defaulted = report.meter_defaulted;
            if report.meter_defaulted {
                debug!("Transport carries no BBT data, assuming 4/4 at 120 BPM");
            } else {
                debug!("Transport BBT data available again");
            }
        }

        match report.event {
            ContinuityEvent::Discontinuous => {
                self.summary.discontinuities += 1;
                self.pending_prediction = None;
                info!(
                    "Transport jumped to frame {} (beat {})",
                    report.frame, report.beat_number
                );
            }
            ContinuityEvent::ContinuityRestored => {
                info!("Continuity restored at frame {}", report.frame);
            }
            ContinuityEvent::Continuous => {}
        }

        if let Some(beat) = report.recorded_beat {
            self.summary.beats_recorded += 1;
            match self.pending_prediction {
                Some((predicted_beat, predicted_frame)) if predicted_beat == beat => {
                    let error = predicted_frame.abs_diff(report.frame);
                    let worst = self.summary.worst_prediction_error.unwrap_or(0);
                    self.summary.worst_prediction_error = Some(worst.max(error));
                    debug!(
                        "Beat {} observed at frame {}, predicted {} (error {}), fpb [{:.1}, {:.1}]",
                        beat,
                        report.frame,
                        predicted_frame,
                        error,
                        report.bound.low,
                        report.bound.high
                    );
                }
                _ => debug!(
                    "Beat {} observed at frame {}, fpb [{:.1}, {:.1}]",
                    beat, report.frame, report.bound.low, report.bound.high
                ),
            }
            if report.adjust.conflicts > 0 {
                self.summary.conflicts += report.adjust.conflicts as u64;
                warn!(
                    "Beat {} contradicted segment {} bounds {} time(s)",
                    beat, report.segment, report.adjust.conflicts
                );
            }
        }

        if let Some(segment) = report.new_segment {
            self.summary.tempo_segments += 1;
            info!(
                "Tempo change at beat {}: opened segment {}",
                report.beat_number, segment
            );
        }

        self.pending_prediction = report.next_beat.map(|next| (next.beat, next.frame));
    }
}
