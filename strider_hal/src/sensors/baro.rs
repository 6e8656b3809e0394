//! Barometer / environment source.
//!
//! The simulation wanders around sea-level pressure; altitude uses the
//! standard barometric formula so the three fields stay consistent.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strider_common::msg::EnvironmentMsg;
use strider_common::topic::{Payload, TopicMessage};

use crate::error::HalError;
use crate::sensors::Sensor;

/// Standard sea-level pressure [hPa].
const SEA_LEVEL_HPA: f32 = 1013.25;

/// Simulated barometer.
pub struct SimBarometer {
    period: Duration,
    pressure: f32,
    rng: StdRng,
}

impl SimBarometer {
    /// Create a simulated barometer polling at the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            pressure: SEA_LEVEL_HPA,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Sensor for SimBarometer {
    fn name(&self) -> &'static str {
        "baro"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn init(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Payload>, HalError> {
        // Random walk, pulled back toward sea level.
        self.pressure += self.rng.gen_range(-0.05..0.05);
        self.pressure += (SEA_LEVEL_HPA - self.pressure) * 0.01;

        let altitude = 44330.0 * (1.0 - (self.pressure / SEA_LEVEL_HPA).powf(0.1903));
        let msg = EnvironmentMsg {
            pressure: self.pressure,
            temperature: 24.0 + self.rng.gen_range(-0.2..0.2),
            altitude,
        };
        Ok(Some(msg.into_payload()))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_stays_near_sea_level() {
        let mut baro = SimBarometer::new(Duration::from_millis(500));
        baro.init().expect("init");
        for _ in 0..1000 {
            let payload = baro.poll().expect("poll").expect("sample");
            let msg = EnvironmentMsg::from_payload(&payload).expect("environment payload");
            assert!((SEA_LEVEL_HPA - 20.0..=SEA_LEVEL_HPA + 20.0).contains(&msg.pressure));
            assert!(msg.altitude.abs() < 200.0);
            assert!(msg.temperature.is_finite());
        }
    }
}
