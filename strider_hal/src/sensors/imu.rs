//! IMU attitude source.
//!
//! The simulation integrates a slow wandering attitude with measurement
//! noise, which is enough to exercise the levelling bias in the motion
//! engine and the telemetry path end to end.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strider_common::msg::ImuMsg;
use strider_common::topic::{Payload, TopicMessage};

use crate::error::HalError;
use crate::sensors::Sensor;

/// Simulated IMU: smooth sinusoidal attitude plus per-sample noise.
pub struct SimImu {
    period: Duration,
    t: f32,
    rng: StdRng,
}

impl SimImu {
    /// Create a simulated IMU polling at the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            t: 0.0,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Sensor for SimImu {
    fn name(&self) -> &'static str {
        "imu"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn init(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Payload>, HalError> {
        self.t += self.period.as_secs_f32();
        let noise = |rng: &mut StdRng| rng.gen_range(-0.05..0.05);

        let msg = ImuMsg {
            yaw: 10.0 * (0.05 * self.t).sin() + noise(&mut self.rng),
            pitch: 2.0 * (0.23 * self.t).sin() + noise(&mut self.rng),
            roll: 1.5 * (0.31 * self.t).cos() + noise(&mut self.rng),
        };
        Ok(Some(msg.into_payload()))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
