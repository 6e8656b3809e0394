//! Periodic sensor readers.
//!
//! Each sensor polls on its own thread at its own rate and publishes a
//! typed message on the event bus with `publish_async` semantics: if the
//! bus is congested the sample is dropped, never blocking the reader. A
//! failed read is logged and retried on the next tick.
//!
//! The concrete drivers here are simulations; hardware drivers implement
//! the same [`Sensor`] trait on top of the shared I²C bus and the vendor
//! register protocol stays inside them.

pub mod baro;
pub mod imu;
pub mod sonar;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, warn};

use strider_bus::EventBus;
use strider_common::timing::Ticker;
use strider_common::topic::Payload;

use crate::error::HalError;

/// A pollable sensor.
pub trait Sensor: Send {
    /// Short name, used for thread naming and logs.
    fn name(&self) -> &'static str;

    /// Poll period.
    fn period(&self) -> Duration;

    /// One-time init (probe, configure). Called on the reader thread.
    fn init(&mut self) -> Result<(), HalError>;

    /// Read one sample. `Ok(None)` means no fresh data this cycle.
    fn poll(&mut self) -> Result<Option<Payload>, HalError>;
}

/// Spawn the reader thread for one sensor.
///
/// Init failure disables the sensor for this boot (logged, thread exits);
/// the rest of the robot keeps running without it.
pub fn spawn_reader(
    bus: EventBus,
    mut sensor: Box<dyn Sensor>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("sensor-{}", sensor.name()))
        .spawn(move || {
            if let Err(err) = sensor.init() {
                error!("sensor {} disabled: {err}", sensor.name());
                return;
            }
            info!(
                "sensor {} polling every {:?}",
                sensor.name(),
                sensor.period()
            );

            let mut ticker = Ticker::new(sensor.period());
            while running.load(Ordering::Relaxed) {
                ticker.wait();
                match sensor.poll() {
                    Ok(Some(payload)) => {
                        bus.publish_async_payload(payload);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!("sensor {} read failed: {err}; retrying", sensor.name());
                    }
                }
            }
        })
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use strider_common::msg::ImuMsg;
    use strider_common::topic::TopicMessage;

    struct FlakySensor {
        polls: u32,
    }

    impl Sensor for FlakySensor {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn period(&self) -> Duration {
            Duration::from_millis(1)
        }
        fn init(&mut self) -> Result<(), HalError> {
            Ok(())
        }
        fn poll(&mut self) -> Result<Option<Payload>, HalError> {
            self.polls += 1;
            if self.polls % 2 == 0 {
                Err(HalError::Io("transient".to_string()))
            } else {
                Ok(Some(
                    ImuMsg {
                        yaw: self.polls as f32,
                        pitch: 0.0,
                        roll: 0.0,
                    }
                    .into_payload(),
                ))
            }
        }
    }

    #[test]
    fn reader_publishes_and_survives_transient_errors() {
        let bus = EventBus::new().expect("bus");
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_reader(
            bus.clone(),
            Box::new(FlakySensor { polls: 0 }),
            Arc::clone(&running),
        )
        .expect("spawn");

        std::thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::Relaxed);
        handle.join().expect("join");

        // Samples flowed despite every other poll failing.
        let latest = bus.peek_msg::<ImuMsg>().expect("imu sample");
        assert!(latest.yaw >= 1.0);
    }

    struct DeadSensor;

    impl Sensor for DeadSensor {
        fn name(&self) -> &'static str {
            "dead"
        }
        fn period(&self) -> Duration {
            Duration::from_millis(1)
        }
        fn init(&mut self) -> Result<(), HalError> {
            Err(HalError::InitFailed("dead"))
        }
        fn poll(&mut self) -> Result<Option<Payload>, HalError> {
            Ok(None)
        }
    }

    #[test]
    fn failed_init_disables_the_sensor_quietly() {
        let bus = EventBus::new().expect("bus");
        let running = Arc::new(AtomicBool::new(true));
        let handle =
            spawn_reader(bus.clone(), Box::new(DeadSensor), Arc::clone(&running)).expect("spawn");
        handle.join().expect("join");
        assert!(bus.peek_msg::<ImuMsg>().is_none());
        running.store(false, Ordering::Relaxed);
    }
}
