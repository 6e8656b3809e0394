//! The fixed-tick motion engine.
//!
//! Each tick: snapshot the latest sensor and operator messages off the bus
//! (peek/take, never blocking), advance the gait, solve the inverse
//! kinematics, apply the per-joint direction signs and hand the vector to
//! the servo sink. Telemetry goes back out with `publish_async` only; a
//! full queue costs one lossy sample, never a blocked tick.
//!
//! The engine owns its body state, planner and solver exclusively; no other
//! thread touches them. It never aborts: a degraded tick (deactivated mode,
//! NaN joint) falls through to a no-op write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use strider_bus::EventBus;
use strider_common::config::MotionConfig;
use strider_common::consts::NUM_SERVOS;
use strider_common::msg::{
    CommandMsg, ImuMsg, MotionAnglesMsg, MotionInputMsg, MotionModeMsg, MotionPositionMsg,
    WalkGaitMsg,
};
use strider_common::timing::{self, TickStats, Ticker};
use strider_common::topic::Topic;

use crate::gait::{GaitPlanner, MotionMode, TiltBias, WalkGait};
use crate::kinematics::{BodyState, Kinematics};

/// Per-joint direction signs applied between the solver output and the
/// servo targets, leg-major order.
pub const DIR: [f32; NUM_SERVOS] = [
    1.0, -1.0, -1.0, -1.0, -1.0, -1.0, 1.0, -1.0, -1.0, -1.0, -1.0, -1.0,
];

/// Joint angles below this delta [deg] are treated as unchanged.
const ANGLE_EPS: f32 = 0.1;

/// Where the twelve signed joint angles go each tick. Implemented by the
/// servo driver; test doubles record the vectors instead.
pub trait JointSink: Send + Sync {
    /// Store a full target vector [deg].
    fn set_angles(&self, angles: [f32; NUM_SERVOS]);
    /// Wake the actuators.
    fn activate(&self);
    /// Put the actuators to sleep.
    fn deactivate(&self);
}

/// The motion engine. Owns the gait planner, the IK solver and the body
/// state; runs at a fixed tick on its own thread.
pub struct MotionEngine {
    bus: EventBus,
    sink: Arc<dyn JointSink>,
    cfg: MotionConfig,
    kin: Kinematics,
    planner: GaitPlanner,
    body: BodyState,
    angles: [f32; NUM_SERVOS],
    raw: [f32; NUM_SERVOS],
    last_input: MotionInputMsg,
    last_telemetry_us: u64,
    stats: TickStats,
}

impl MotionEngine {
    /// Build an engine in the Deactivated state, standing at minimum body
    /// height on the variant's default feet.
    pub fn new(bus: EventBus, sink: Arc<dyn JointSink>, cfg: MotionConfig) -> Self {
        let kin = Kinematics::new(cfg.variant);
        let default_feet = kin.default_feet_positions();
        let planner = GaitPlanner::new(cfg.clone(), default_feet);
        let body = BodyState::neutral(cfg.min_body_height, default_feet);

        Self {
            bus,
            sink,
            cfg,
            kin,
            planner,
            body,
            angles: [0.0; NUM_SERVOS],
            raw: [0.0; NUM_SERVOS],
            last_input: MotionInputMsg::default(),
            last_telemetry_us: 0,
            stats: TickStats::new(),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> MotionMode {
        self.planner.mode()
    }

    /// Cycle statistics for supervision.
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// One engine cycle with externally supplied dt [s].
    pub fn tick(&mut self, dt: f32) {
        self.drain_inputs();

        if !self.planner.step(&mut self.body, dt) {
            // Deactivated: nothing to solve, nothing to write.
            return;
        }

        self.kin.solve(&self.body, &mut self.raw);
        if self.update_angles() {
            self.sink.set_angles(self.angles);
        }
        self.publish_telemetry();
    }

    /// Run the tick loop until `running` clears. Periodic with drift-free
    /// pacing; dt is the measured elapsed time, clamped.
    pub fn run(&mut self, running: &AtomicBool) {
        let period = Duration::from_millis(self.cfg.tick_period_ms);
        let budget_us = period.as_micros() as u64;
        let mut ticker = Ticker::new(period);
        info!(
            "motion engine running at {:.0} Hz ({:?})",
            1000.0 / self.cfg.tick_period_ms as f64,
            self.kin.variant()
        );

        while running.load(Ordering::Relaxed) {
            let dt = ticker.wait();
            let start = timing::now_micros();
            self.tick(dt);
            self.stats.record(timing::now_micros() - start, budget_us);
        }
        info!(
            "motion engine stopped after {} cycles ({} overruns, max {}us)",
            self.stats.cycle_count, self.stats.overruns, self.stats.max_cycle_us
        );
    }

    // ── Input handling ──────────────────────────────────────────────

    fn drain_inputs(&mut self) {
        if let Some(imu) = self.bus.peek_msg::<ImuMsg>() {
            self.planner.set_tilt_bias(TiltBias {
                roll: imu.roll * self.cfg.imu_bias_gain,
                pitch: imu.pitch * self.cfg.imu_bias_gain,
            });
        }

        if let Some(mode_msg) = self.bus.take_msg::<MotionModeMsg>() {
            self.apply_mode(mode_msg.mode);
        }

        if let Some(gait_msg) = self.bus.take_msg::<WalkGaitMsg>() {
            match WalkGait::from_code(gait_msg.gait) {
                Some(gait) => self.planner.set_walk_gait(gait),
                None => debug!("ignoring unknown walk gait code {}", gait_msg.gait),
            }
        }

        if let Some(input) = self.bus.take_msg::<MotionInputMsg>() {
            self.last_input = input;
            self.planner.handle_command(&input);
        }

        // Legacy two-axis command: forward on y, turn-in-place on x.
        if let Some(cmd) = self.bus.take_msg::<CommandMsg>() {
            let input = MotionInputMsg {
                lx: cmd.x,
                ly: cmd.y,
                ..self.last_input
            };
            self.last_input = input;
            self.planner.handle_command(&input);
        }

        if let Some(pos) = self.bus.take_msg::<MotionPositionMsg>() {
            self.body.roll = pos.roll;
            self.body.pitch = pos.pitch;
            self.body.yaw = pos.yaw;
            self.body.xm = pos.xm;
            self.body.ym = pos
                .ym
                .clamp(self.cfg.min_body_height, self.cfg.max_body_height);
            self.body.zm = pos.zm;
        }
    }

    fn apply_mode(&mut self, code: u8) {
        let Some(mode) = MotionMode::from_code(code) else {
            warn!("ignoring unknown motion mode code {code}");
            return;
        };
        let was = self.planner.mode();
        if !self.planner.set_mode(mode) {
            return;
        }
        // Servo power follows the Deactivated edge in both directions.
        if mode == MotionMode::Deactivated {
            self.sink.deactivate();
        } else if was == MotionMode::Deactivated {
            self.sink.activate();
        }
    }

    // ── Output handling ─────────────────────────────────────────────

    /// Fold the solver output into the signed angle vector. A NaN joint
    /// keeps its previous angle; the rest of the vector still updates.
    fn update_angles(&mut self) -> bool {
        let mut changed = false;
        for i in 0..NUM_SERVOS {
            let next = self.raw[i] * DIR[i];
            if !next.is_finite() {
                continue;
            }
            if (next - self.angles[i]).abs() > ANGLE_EPS {
                self.angles[i] = next;
                changed = true;
            }
        }
        changed
    }

    fn publish_telemetry(&mut self) {
        let now = timing::now_micros();
        let interval_us = (1_000_000.0 / self.cfg.telemetry_hz) as u64;
        if now.saturating_sub(self.last_telemetry_us) < interval_us {
            return;
        }
        self.last_telemetry_us = now;

        if self.bus.has_subscribers(Topic::MotionAngles) {
            self.bus.publish_async(MotionAnglesMsg {
                angles: self.angles,
            });
        }
        if self.bus.has_subscribers(Topic::MotionPosition) {
            self.bus.publish_async(MotionPositionMsg {
                roll: self.body.roll,
                pitch: self.body.pitch,
                yaw: self.body.yaw,
                xm: self.body.xm,
                ym: self.body.ym,
                zm: self.body.zm,
            });
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        vectors: Mutex<Vec<[f32; NUM_SERVOS]>>,
        active: Mutex<Vec<bool>>,
    }

    impl JointSink for RecordingSink {
        fn set_angles(&self, angles: [f32; NUM_SERVOS]) {
            self.vectors.lock().expect("lock").push(angles);
        }
        fn activate(&self) {
            self.active.lock().expect("lock").push(true);
        }
        fn deactivate(&self) {
            self.active.lock().expect("lock").push(false);
        }
    }

    fn engine() -> (MotionEngine, Arc<RecordingSink>, EventBus) {
        let bus = EventBus::new().expect("bus");
        let sink = Arc::new(RecordingSink::default());
        let engine = MotionEngine::new(bus.clone(), sink.clone(), MotionConfig::default());
        (engine, sink, bus)
    }

    #[test]
    fn deactivated_engine_writes_nothing() {
        let (mut engine, sink, _bus) = engine();
        for _ in 0..10 {
            engine.tick(0.02);
        }
        assert!(sink.vectors.lock().expect("lock").is_empty());
    }

    #[test]
    fn mode_edge_toggles_servo_power() {
        let (mut engine, sink, bus) = engine();

        bus.publish(MotionModeMsg {
            mode: MotionMode::Stand.code(),
        });
        engine.tick(0.02);
        assert_eq!(engine.mode(), MotionMode::Stand);
        assert_eq!(sink.active.lock().expect("lock").as_slice(), &[true]);

        bus.publish(MotionModeMsg { mode: 0 });
        engine.tick(0.02);
        assert_eq!(engine.mode(), MotionMode::Deactivated);
        assert_eq!(sink.active.lock().expect("lock").as_slice(), &[true, false]);
    }

    #[test]
    fn unknown_mode_code_keeps_previous_state() {
        let (mut engine, _sink, bus) = engine();
        bus.publish(MotionModeMsg { mode: 2 });
        engine.tick(0.02);
        assert_eq!(engine.mode(), MotionMode::Stand);

        bus.publish(MotionModeMsg { mode: 42 });
        engine.tick(0.02);
        assert_eq!(engine.mode(), MotionMode::Stand);
    }

    #[test]
    fn stand_mode_produces_joint_vectors() {
        let (mut engine, sink, bus) = engine();
        bus.publish(MotionModeMsg { mode: 2 });
        for _ in 0..5 {
            engine.tick(0.02);
        }
        let vectors = sink.vectors.lock().expect("lock");
        assert!(!vectors.is_empty());
        assert!(vectors[0].iter().all(|a| a.is_finite()));
    }

    #[test]
    fn nan_position_keeps_previous_angles() {
        let (mut engine, sink, bus) = engine();
        bus.publish(MotionModeMsg { mode: 2 });
        for _ in 0..5 {
            engine.tick(0.02);
        }
        let good = *sink
            .vectors
            .lock()
            .expect("lock")
            .last()
            .expect("at least one vector");

        // Poison the pose; the solver propagates NaN, the engine filters it.
        bus.publish(MotionPositionMsg {
            roll: f32::NAN,
            ..Default::default()
        });
        for _ in 0..5 {
            engine.tick(0.02);
        }
        let after = sink.vectors.lock().expect("lock");
        let last = after.last().expect("vector");
        for (a, b) in last.iter().zip(good.iter()) {
            assert!(a.is_finite());
            // The poisoned ticks never moved any joint away from the last
            // good solution by more than the change threshold.
            assert!((a - b).abs() <= ANGLE_EPS + 1e-3);
        }
    }

    #[test]
    fn walk_gait_selection_reaches_the_planner() {
        let (mut engine, _sink, bus) = engine();
        bus.publish(MotionModeMsg { mode: 3 });
        bus.publish(WalkGaitMsg { gait: 1 });
        engine.tick(0.02);
        assert_eq!(engine.planner.walk().gait(), WalkGait::Crawl);

        bus.publish(WalkGaitMsg { gait: 0 });
        engine.tick(0.02);
        assert_eq!(engine.planner.walk().gait(), WalkGait::Trot);
    }

    #[test]
    fn legacy_command_maps_to_stick_axes() {
        let (mut engine, _sink, bus) = engine();
        bus.publish(MotionModeMsg { mode: 3 });
        bus.publish(CommandMsg { x: 0.0, y: 1.0 });
        for _ in 0..100 {
            engine.tick(0.02);
        }
        // Forward drive on the legacy y axis advances the gait phase.
        assert!(engine.planner.walk().phase_time() >= 0.0);
        assert!(engine.planner.walk().step_length() > 0.01);
    }
}
