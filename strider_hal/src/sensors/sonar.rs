//! Forward sonar range source.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strider_common::msg::SonarMsg;
use strider_common::topic::{Payload, TopicMessage};

use crate::error::HalError;
use crate::sensors::Sensor;

/// Maximum range reported by the simulated transducer [cm].
const MAX_DISTANCE_CM: f32 = 200.0;

/// Simulated sonar: an obstacle drifting back and forth in front of the
/// robot.
pub struct SimSonar {
    period: Duration,
    t: f32,
    rng: StdRng,
}

impl SimSonar {
    /// Create a simulated sonar polling at the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            t: 0.0,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Sensor for SimSonar {
    fn name(&self) -> &'static str {
        "sonar"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn init(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Payload>, HalError> {
        self.t += self.period.as_secs_f32();
        let distance =
            (110.0 + 80.0 * (0.2 * self.t).sin() + self.rng.gen_range(-2.0..2.0))
                .clamp(2.0, MAX_DISTANCE_CM);
        Ok(Some(SonarMsg { distance_cm: distance }.into_payload()))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
