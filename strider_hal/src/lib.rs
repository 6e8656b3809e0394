//! Strider Hardware Abstraction Layer
//!
//! The actuator and sensor half of the controller. The servo driver smooths
//! joint targets and maps them to PWM pulses through per-channel
//! calibration; the PWM backend seam separates that logic from the PCA9685
//! register protocol so everything above it runs unchanged against the
//! simulation backend. Sensor readers poll their drivers at per-sensor
//! rates and publish typed messages on the event bus.
//!
//! Vendor register maps stay at the very bottom ([`pca9685`]); the rest of
//! the workspace only sees traits.

pub mod error;
pub mod i2c;
pub mod pca9685;
pub mod pwm;
pub mod sensors;
pub mod servo;

pub use error::HalError;
pub use pwm::{PwmBackend, SimPwm};
pub use servo::ServoController;
