//! Composition root.
//!
//! Everything is constructed here and passed down as explicit dependencies:
//! the event bus, the servo driver on its PWM backend, the motion engine,
//! the sensor readers and the network adapters. No globals, no singletons;
//! a test can assemble the same graph with simulation parts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

use strider_bus::{DeliveryMode, EventBus};
use strider_common::config::StriderConfig;
use strider_common::consts::NUM_SERVOS;
use strider_common::msg::ServoAnglesMsg;
use strider_hal::pwm::{PwmBackend, SimPwm};
use strider_hal::sensors::baro::SimBarometer;
use strider_hal::sensors::imu::SimImu;
use strider_hal::sensors::sonar::SimSonar;
use strider_hal::sensors::spawn_reader;
use strider_hal::{HalError, ServoController};
use strider_motion::{JointSink, MotionEngine};

use crate::rt;
use crate::supervisor::Supervisor;

/// Adapts the servo driver to the motion engine's actuator seam.
struct ServoSink(Arc<ServoController>);

impl JointSink for ServoSink {
    fn set_angles(&self, angles: [f32; NUM_SERVOS]) {
        self.0.set_angles(angles);
    }
    fn activate(&self) {
        self.0.activate();
    }
    fn deactivate(&self) {
        self.0.deactivate();
    }
}

/// Resolve a PWM backend by driver name. Mirrors the pluggable-driver
/// registry: simulation is always available, hardware drivers register
/// under their own names as they are brought up.
fn create_pwm_backend(name: &str) -> Result<Box<dyn PwmBackend>, HalError> {
    match name {
        "simulation" => Ok(Box::new(SimPwm::new())),
        other => Err(HalError::InitFailed(match other {
            "pca9685" => "pca9685 backend requires the platform i2c device",
            _ => "unknown pwm driver",
        })),
    }
}

/// The assembled controller.
pub struct App {
    config: StriderConfig,
    simulate: bool,
}

impl App {
    pub fn new(config: StriderConfig, simulate: bool) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        Ok(Self { config, simulate })
    }

    /// Bring everything up, run until a shutdown signal, drain and join.
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let running = Arc::new(AtomicBool::new(true));
        let bus = EventBus::new()?;

        // ── Actuation ───────────────────────────────────────────────
        let driver_name = if self.simulate {
            info!("simulation mode enabled");
            "simulation"
        } else {
            // Hardware PWM comes up under its own driver name once the
            // platform i2c device is wired; default to simulation.
            "simulation"
        };
        let backend = create_pwm_backend(driver_name)?;
        let servo = Arc::new(ServoController::new(backend, self.config.servos.clone()));

        // Clients may drive servo angles directly (calibration UI).
        let servo_for_sub = Arc::clone(&servo);
        let _servo_sub = bus.subscribe::<ServoAnglesMsg>(0, DeliveryMode::Latest, move |msg| {
            servo_for_sub.set_angles(msg.angles);
        });

        // ── Motion ──────────────────────────────────────────────────
        let sink: Arc<dyn JointSink> = Arc::new(ServoSink(Arc::clone(&servo)));
        let mut engine = MotionEngine::new(bus.clone(), sink, self.config.motion.clone());

        let mut supervisor = Supervisor::new();

        let motion_running = Arc::clone(&running);
        let motion = std::thread::Builder::new()
            .name("strider-motion".to_string())
            .spawn(move || {
                if let Err(err) = rt::setup(rt::MOTION_CPU_CORE, rt::MOTION_RT_PRIORITY) {
                    error!("{err}");
                    return;
                }
                engine.run(&motion_running);
            })?;
        supervisor.register("motion", motion);

        let servo_running = Arc::clone(&running);
        let servo_thread = Arc::clone(&servo);
        let servo_handle = std::thread::Builder::new()
            .name("strider-servo".to_string())
            .spawn(move || servo_thread.run(&servo_running))?;
        supervisor.register("servo", servo_handle);

        // ── Sensors ─────────────────────────────────────────────────
        let sensors = &self.config.sensors;
        if sensors.imu_enabled {
            let imu = SimImu::new(Duration::from_millis(sensors.imu_period_ms));
            supervisor.register(
                "sensor-imu",
                spawn_reader(bus.clone(), Box::new(imu), Arc::clone(&running))?,
            );
        }
        if sensors.sonar_enabled {
            let sonar = SimSonar::new(Duration::from_millis(sensors.sonar_period_ms));
            supervisor.register(
                "sensor-sonar",
                spawn_reader(bus.clone(), Box::new(sonar), Arc::clone(&running))?,
            );
        }
        if sensors.baro_enabled {
            let baro = SimBarometer::new(Duration::from_millis(sensors.baro_period_ms));
            supervisor.register(
                "sensor-baro",
                spawn_reader(bus.clone(), Box::new(baro), Arc::clone(&running))?,
            );
        }

        // ── Shutdown signal ─────────────────────────────────────────
        let ctrl_running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            ctrl_running.store(false, Ordering::SeqCst);
        })?;

        // ── Network ─────────────────────────────────────────────────
        let ws_addr: SocketAddr = self.config.comm.ws_addr.parse()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        #[cfg(feature = "ble")]
        {
            let ble_bus = bus.clone();
            let ble_name = self.config.comm.ble_name.clone();
            runtime.spawn(async move {
                if let Err(err) = strider_comm::ble::bluez::serve(ble_bus, ble_name).await {
                    warn!("ble adapter failed: {err}");
                }
            });
        }

        let net_bus = bus.clone();
        runtime.block_on(async {
            let ws = strider_comm::ws::serve(net_bus, ws_addr);
            tokio::pin!(ws);
            tokio::select! {
                _ = supervisor.watch(Arc::clone(&running)) => {}
                result = &mut ws => {
                    if let Err(err) = result {
                        error!("websocket adapter failed: {err}");
                    }
                    running.store(false, Ordering::SeqCst);
                }
            }
        });

        // ── Drain ───────────────────────────────────────────────────
        running.store(false, Ordering::SeqCst);
        if !bus.flush(Duration::from_secs(1)) {
            warn!("bus did not drain within a second");
        }
        bus.close();
        servo.deactivate();
        supervisor.join_all();
        drop(runtime);
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
