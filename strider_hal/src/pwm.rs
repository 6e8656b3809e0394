//! PWM backend seam.
//!
//! The servo driver computes pulse widths; a backend puts them on wires.
//! The simulation backend records what would have been written so the whole
//! actuation path can run and be inspected without hardware.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use strider_common::consts::NUM_SERVOS;

use crate::error::HalError;

/// Something that can drive the twelve servo channels.
pub trait PwmBackend: Send {
    /// Bring the device out of sleep.
    fn wake(&mut self) -> Result<(), HalError>;
    /// Put the device to sleep; outputs stop.
    fn sleep(&mut self) -> Result<(), HalError>;
    /// Write one channel.
    fn write_channel(&mut self, channel: usize, value: u16) -> Result<(), HalError>;
    /// Write all twelve channels in one batched transaction.
    fn write_all(&mut self, values: &[u16; NUM_SERVOS]) -> Result<(), HalError>;
}

/// Observable state of the simulation backend.
#[derive(Debug, Default)]
pub struct SimPwmState {
    /// Device awake flag.
    pub awake: bool,
    /// Last value written per channel.
    pub channels: [u16; NUM_SERVOS],
    /// Number of batched writes.
    pub batch_writes: u64,
    /// Number of single-channel writes.
    pub single_writes: u64,
}

/// Simulation PWM backend. Cheap, infallible, fully observable.
#[derive(Clone, Default)]
pub struct SimPwm {
    state: Arc<Mutex<SimPwmState>>,
}

impl SimPwm {
    /// Create a sleeping simulation device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the recorded state, for assertions.
    pub fn state(&self) -> Arc<Mutex<SimPwmState>> {
        Arc::clone(&self.state)
    }
}

impl PwmBackend for SimPwm {
    fn wake(&mut self) -> Result<(), HalError> {
        self.state.lock().awake = true;
        trace!("sim pwm: wake");
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), HalError> {
        self.state.lock().awake = false;
        trace!("sim pwm: sleep");
        Ok(())
    }

    fn write_channel(&mut self, channel: usize, value: u16) -> Result<(), HalError> {
        if channel >= NUM_SERVOS {
            return Err(HalError::InvalidChannel(channel));
        }
        let mut state = self.state.lock();
        state.channels[channel] = value;
        state.single_writes += 1;
        Ok(())
    }

    fn write_all(&mut self, values: &[u16; NUM_SERVOS]) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.channels = *values;
        state.batch_writes += 1;
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
