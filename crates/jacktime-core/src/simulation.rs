//! In-process transport driven by a [`TimebaseMaster`]
//!
//! Stands in for a sound server's transport: every call to
//! [`SimulatedTransport::next_cycle`] yields the position at the start of one
//! process block and then advances by the block length while rolling.

use crate::error::{Result, SyncError};
use crate::position::{Cycle, Frames, TransportState};
use crate::timebase::TimebaseMaster;

#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    master: TimebaseMaster,
    frame: Frames,
    block_length: u32,
    state: TransportState,
}

impl SimulatedTransport {
    /// Stopped transport at frame 0
    pub fn new(master: TimebaseMaster, block_length: u32) -> Result<Self> {
        if block_length == 0 {
            return Err(SyncError::InvalidBlockLength(block_length));
        }
        Ok(Self {
            master,
            frame: 0,
            block_length,
            state: TransportState::Stopped,
        })
    }

    pub fn master(&self) -> &TimebaseMaster {
        &self.master
    }

    pub fn frame(&self) -> Frames {
        self.frame
    }

    pub fn block_length(&self) -> u32 {
        self.block_length
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = TransportState::Rolling;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Jump to `frame`; takes effect at the next cycle
    pub fn locate(&mut self, frame: Frames) {
        self.frame = frame;
    }

    /// Change tempo from the next cycle onwards
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        self.master.set_tempo(self.frame, bpm)
    }

    pub fn set_block_length(&mut self, block_length: u32) -> Result<()> {
        if block_length == 0 {
            return Err(SyncError::InvalidBlockLength(block_length));
        }
        self.block_length = block_length;
        Ok(())
    }

    /// Position at the start of the next block
    pub fn next_cycle(&mut self) -> Cycle {
        let cycle = Cycle {
            snapshot: self.master.position(self.frame),
            cycle_length: self.block_length,
            state: self.state,
        };
        if self.state == TransportState::Rolling {
            self.frame += Frames::from(self.block_length);
        }
        cycle
    }
}
