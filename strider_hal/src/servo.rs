//! Servo driver: angle smoothing, calibration mapping, batched PWM writes.
//!
//! Targets arrive from the motion engine (or directly from a client); each
//! driver tick LERPs the live angles toward them, maps through per-channel
//! calibration and writes the whole bank in one transaction when anything
//! changed or the keep-alive interval elapsed. Direct PWM overrides bypass
//! smoothing until the next angle command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use strider_common::config::{ConfigError, ServoChannel, ServoConfig};
use strider_common::consts::{NUM_SERVOS, PWM_MAX, PWM_MIN, PWM_RAW_MAX};
use strider_common::timing::Ticker;

use crate::error::HalError;
use crate::pwm::PwmBackend;

/// Driver control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// PWM chip asleep; ticks are no-ops.
    Deactivated,
    /// Raw PWM override active; smoothing suspended.
    Pwm,
    /// Normal operation: smoothed angle tracking.
    Angle,
}

struct DriverState {
    control: ControlState,
    angles: [f32; NUM_SERVOS],
    targets: [f32; NUM_SERVOS],
    last_pwm: [u16; NUM_SERVOS],
    last_write: Option<Instant>,
}

/// Rest pose the driver seeds its angles with, matching the motion
/// engine's folded stance.
const SEED_ANGLES: [f32; NUM_SERVOS] = [
    0.0, 90.0, -145.0, 0.0, 90.0, -145.0, 0.0, 90.0, -145.0, 0.0, 90.0, -145.0,
];

/// The servo driver. Interior mutability throughout: the motion thread
/// stores targets while the driver thread ticks.
pub struct ServoController {
    backend: Mutex<Box<dyn PwmBackend>>,
    calibration: RwLock<ServoConfig>,
    state: Mutex<DriverState>,
}

impl ServoController {
    /// Create a deactivated driver over the given backend.
    ///
    /// Invalid calibration falls back to the compiled defaults, per the
    /// configuration policy.
    pub fn new(backend: Box<dyn PwmBackend>, calibration: ServoConfig) -> Self {
        let calibration = match calibration.validate() {
            Ok(()) => calibration,
            Err(err) => {
                warn!("servo calibration invalid ({err}); using defaults");
                ServoConfig::default()
            }
        };
        Self {
            backend: Mutex::new(backend),
            calibration: RwLock::new(calibration),
            state: Mutex::new(DriverState {
                control: ControlState::Deactivated,
                angles: SEED_ANGLES,
                targets: SEED_ANGLES,
                last_pwm: [0; NUM_SERVOS],
                last_write: None,
            }),
        }
    }

    /// Current control state.
    pub fn control_state(&self) -> ControlState {
        self.state.lock().control
    }

    /// Store a full target vector [deg]. Re-arms angle tracking after a
    /// raw PWM override.
    pub fn set_angles(&self, angles: [f32; NUM_SERVOS]) {
        let mut state = self.state.lock();
        state.targets = angles;
        if state.control == ControlState::Pwm {
            state.control = ControlState::Angle;
        }
    }

    /// Direct PWM override on one channel (or all twelve with `None`).
    /// Puts the driver into PWM mode; smoothing stays off until
    /// [`ServoController::set_angles`] is called again.
    pub fn set_pwm(&self, channel: Option<usize>, value: u16) -> Result<(), HalError> {
        if value > PWM_RAW_MAX {
            return Err(HalError::InvalidPwm(value));
        }
        if let Some(ch) = channel {
            if ch >= NUM_SERVOS {
                return Err(HalError::InvalidChannel(ch));
            }
        }

        let mut state = self.state.lock();
        state.control = ControlState::Pwm;
        let mut backend = self.backend.lock();
        match channel {
            Some(ch) => backend.write_channel(ch, value),
            None => backend.write_all(&[value; NUM_SERVOS]),
        }
    }

    /// Wake the PWM chip and resume angle tracking. The smoothing seed is
    /// reset to the current targets so the wake-up does not sweep through
    /// stale intermediate angles.
    pub fn activate(&self) {
        let mut state = self.state.lock();
        if state.control != ControlState::Deactivated {
            return;
        }
        state.angles = state.targets;
        state.control = ControlState::Angle;
        if let Err(err) = self.backend.lock().wake() {
            warn!("pwm wake failed: {err}");
        }
        info!("servo driver active");
    }

    /// Put the PWM chip to sleep. Targets are kept; ticks become no-ops.
    pub fn deactivate(&self) {
        let mut state = self.state.lock();
        if state.control == ControlState::Deactivated {
            return;
        }
        state.control = ControlState::Deactivated;
        if let Err(err) = self.backend.lock().sleep() {
            warn!("pwm sleep failed: {err}");
        }
        info!("servo driver asleep");
    }

    /// Replace the calibration snapshot. Single writer; readers (the tick)
    /// pick the new table up on their next cycle.
    pub fn update_calibration(&self, calibration: ServoConfig) -> Result<(), ConfigError> {
        calibration.validate()?;
        *self.calibration.write() = calibration;
        Ok(())
    }

    /// Map one smoothed angle through a channel calibration. Always lands
    /// inside the safe pulse range.
    pub fn compute_pwm(channel: &ServoChannel, angle: f32) -> u16 {
        let corrected = channel.direction as f32 * angle + channel.center_angle_deg;
        let pwm = (corrected * channel.conversion + channel.center_pwm as f32).round();
        (pwm as i32).clamp(PWM_MIN as i32, PWM_MAX as i32) as u16
    }

    /// One driver cycle: smooth, map, write if anything changed or the
    /// keep-alive interval elapsed. A failed write is logged and retried
    /// next tick; no driver state is lost.
    pub fn tick(&self) {
        let mut state = self.state.lock();
        if state.control != ControlState::Angle {
            return;
        }

        let calibration = self.calibration.read();
        let smoothing = calibration.smoothing;
        let keepalive = Duration::from_millis(calibration.keepalive_ms);

        let mut pwms = [0u16; NUM_SERVOS];
        let mut changed = false;
        for i in 0..NUM_SERVOS {
            let target = state.targets[i];
            state.angles[i] += (target - state.angles[i]) * smoothing;
            pwms[i] = Self::compute_pwm(&calibration.channels[i], state.angles[i]);
            changed |= pwms[i] != state.last_pwm[i];
        }
        drop(calibration);

        let stale = state
            .last_write
            .map(|at| at.elapsed() >= keepalive)
            .unwrap_or(true);
        if !changed && !stale {
            return;
        }

        match self.backend.lock().write_all(&pwms) {
            Ok(()) => {
                state.last_pwm = pwms;
                state.last_write = Some(Instant::now());
            }
            Err(err) => warn!("pwm write failed: {err}; retrying next tick"),
        }
    }

    /// Run the driver tick loop until `running` clears.
    pub fn run(&self, running: &AtomicBool) {
        let period = {
            let calibration = self.calibration.read();
            Duration::from_millis(calibration.tick_period_ms)
        };
        let mut ticker = Ticker::new(period);
        info!("servo driver ticking every {period:?}");
        while running.load(Ordering::Relaxed) {
            ticker.wait();
            self.tick();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pwm::SimPwm;

    fn controller() -> (ServoController, crate::pwm::SimPwm) {
        let pwm = SimPwm::new();
        let controller =
            ServoController::new(Box::new(pwm.clone()), ServoConfig::default());
        (controller, pwm)
    }

    #[test]
    fn compute_pwm_is_clamped_and_monotone() {
        let channel = ServoChannel {
            center_pwm: 306,
            direction: 1,
            center_angle_deg: 0.0,
            conversion: 2.2,
            label: "test".to_string(),
        };

        let mut last = 0u16;
        for step in 0..200 {
            let angle = -200.0 + step as f32 * 2.0;
            let pwm = ServoController::compute_pwm(&channel, angle);
            assert!((PWM_MIN..=PWM_MAX).contains(&pwm));
            assert!(pwm >= last, "pwm not monotone at angle {angle}");
            last = pwm;
        }

        // Center angle maps onto the center pulse.
        assert_eq!(ServoController::compute_pwm(&channel, 0.0), 306);
    }

    #[test]
    fn inverted_channel_is_monotone_against_the_direction() {
        let channel = ServoChannel {
            center_pwm: 306,
            direction: -1,
            center_angle_deg: 0.0,
            conversion: 2.2,
            label: "test".to_string(),
        };
        let low = ServoController::compute_pwm(&channel, 50.0);
        let high = ServoController::compute_pwm(&channel, -50.0);
        assert!(high > low);
    }

    #[test]
    fn tick_is_inert_until_activated() {
        let (controller, pwm) = controller();
        controller.tick();
        assert_eq!(pwm.state().lock().batch_writes, 0);

        controller.activate();
        controller.tick();
        let pwm_state = pwm.state();
        let state = pwm_state.lock();
        assert!(state.awake);
        assert_eq!(state.batch_writes, 1);
        assert!(state.channels.iter().all(|p| (PWM_MIN..=PWM_MAX).contains(p)));
    }

    #[test]
    fn smoothing_converges_on_the_target() {
        let (controller, pwm) = controller();
        controller.activate();
        controller.set_angles([10.0; NUM_SERVOS]);
        for _ in 0..200 {
            controller.tick();
        }

        let expected: Vec<u16> = {
            let calibration = ServoConfig::default();
            calibration
                .channels
                .iter()
                .map(|ch| ServoController::compute_pwm(ch, 10.0))
                .collect()
        };
        let pwm_state = pwm.state();
        let state = pwm_state.lock();
        for (got, want) in state.channels.iter().zip(expected.iter()) {
            assert!((*got as i32 - *want as i32).abs() <= 1, "{got} vs {want}");
        }
    }

    #[test]
    fn unchanged_angles_skip_writes_until_keepalive() {
        let (controller, pwm) = controller();
        controller.activate();
        // Converge fully.
        for _ in 0..300 {
            controller.tick();
        }
        let after_converge = pwm.state().lock().batch_writes;

        // A handful of immediate extra ticks changes nothing and the
        // keep-alive (500 ms) has not elapsed.
        for _ in 0..5 {
            controller.tick();
        }
        assert_eq!(pwm.state().lock().batch_writes, after_converge);
    }

    #[test]
    fn pwm_override_suspends_smoothing_until_next_angles() {
        let (controller, pwm) = controller();
        controller.activate();

        controller.set_pwm(None, 350).expect("override");
        assert_eq!(controller.control_state(), ControlState::Pwm);
        assert_eq!(pwm.state().lock().channels, [350; NUM_SERVOS]);

        // Ticks leave the override in place.
        let writes = pwm.state().lock().batch_writes;
        controller.tick();
        assert_eq!(pwm.state().lock().batch_writes, writes);

        // A fresh angle command re-arms tracking.
        controller.set_angles([0.0; NUM_SERVOS]);
        assert_eq!(controller.control_state(), ControlState::Angle);
        controller.tick();
        assert!(pwm.state().lock().batch_writes > writes);
    }

    #[test]
    fn pwm_override_validates_inputs() {
        let (controller, _pwm) = controller();
        assert!(matches!(
            controller.set_pwm(None, 5000),
            Err(HalError::InvalidPwm(5000))
        ));
        assert!(matches!(
            controller.set_pwm(Some(12), 300),
            Err(HalError::InvalidChannel(12))
        ));
    }

    #[test]
    fn deactivate_sleeps_the_backend_and_stops_writes() {
        let (controller, pwm) = controller();
        controller.activate();
        controller.tick();
        controller.deactivate();
        assert!(!pwm.state().lock().awake);

        let writes = pwm.state().lock().batch_writes;
        controller.tick();
        assert_eq!(pwm.state().lock().batch_writes, writes);
    }

    #[test]
    fn invalid_calibration_falls_back_to_defaults() {
        let mut bad = ServoConfig::default();
        bad.channels.pop();
        let controller = ServoController::new(Box::new(SimPwm::new()), bad);
        let calibration = controller.calibration.read();
        assert_eq!(calibration.channels.len(), NUM_SERVOS);
    }
}
