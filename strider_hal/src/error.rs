//! HAL error taxonomy.
//!
//! I/O failures are transient by policy: the caller logs them and retries on
//! its next tick without touching its own state.

use thiserror::Error;

/// Errors raised by actuator and sensor drivers.
#[derive(Debug, Error)]
pub enum HalError {
    /// A bus transaction failed.
    #[error("i2c transaction failed: {0}")]
    Io(String),

    /// Device probe or init sequence failed.
    #[error("device {0} did not initialize")]
    InitFailed(&'static str),

    /// Channel index outside the device's range.
    #[error("invalid channel {0}")]
    InvalidChannel(usize),

    /// Raw PWM value outside the accepted range.
    #[error("pwm value {0} outside 0..=4096")]
    InvalidPwm(u16),
}

impl HalError {
    /// Wrap an embedded-hal error, preserving its debug rendering.
    pub fn from_i2c<E: core::fmt::Debug>(err: E) -> Self {
        Self::Io(format!("{err:?}"))
    }
}
