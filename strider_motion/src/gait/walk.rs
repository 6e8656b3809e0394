//! Continuous-phase walking gait.
//!
//! One evaluator serves both gait variants. A global phase in [0,1) is
//! offset per leg; the duty fraction (`stand_offset`) splits each leg cycle
//! into a stance segment (linear drag with a shallow cosine penetration)
//! and a swing segment (degree-11 Bezier arc). Both curves are applied
//! twice per foot: once for translation, once for rotation about the body
//! center, with the rotational delta down-weighted.
//!
//! Trot runs diagonal pairs at duty 0.6; crawl staggers all four legs at
//! duty 0.85 and additionally shifts the body toward the centroid of the
//! remaining stance feet just before a leg lifts, which is what keeps the
//! slow gait statically stable.

use std::f32::consts::{FRAC_PI_2, PI};

use strider_common::config::MotionConfig;
use strider_common::consts::NUM_LEGS;
use strider_common::msg::MotionInputMsg;

use super::{TiltBias, WalkGait, lerp};
use crate::kinematics::BodyState;

/// Binomial coefficients C(11, k).
const BINOMIAL: [f32; 12] = [
    1.0, 11.0, 55.0, 165.0, 330.0, 462.0, 462.0, 330.0, 165.0, 55.0, 11.0, 1.0,
];

/// Bezier control values along the step direction, in units of step length.
const BEZIER_STEPS: [f32; 12] = [
    -1.0, -1.4, -1.5, -1.5, -1.5, 0.0, 0.0, 0.0, 1.5, 1.5, 1.4, 1.0,
];

/// Bezier control values for foot lift, in units of step height.
const BEZIER_HEIGHTS: [f32; 12] = [
    0.0, 0.0, 0.9, 0.9, 0.9, 0.9, 0.9, 1.1, 1.1, 1.1, 0.0, 0.0,
];

/// The parameters the curve evaluator consumes each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitParams {
    pub step_height: f32,
    pub step_x: f32,
    pub step_z: f32,
    pub step_angle: f32,
    pub step_velocity: f32,
    pub step_depth: f32,
}

impl GaitParams {
    fn initial(cfg: &MotionConfig) -> Self {
        Self {
            step_height: cfg.default_step_height,
            step_x: 0.0,
            step_z: 0.0,
            step_angle: 0.0,
            step_velocity: 0.5,
            step_depth: cfg.default_step_depth,
        }
    }
}

/// Body shift bookkeeping for the crawl gait.
#[derive(Debug, Clone, Copy, Default)]
struct ShiftState {
    start_x: f32,
    start_z: f32,
    target_x: f32,
    target_z: f32,
    start_time: f32,
    current_leg: Option<usize>,
}

/// Stance/swing census for one instant of the crawl cycle.
struct LegCensus {
    stance: [usize; NUM_LEGS],
    stance_count: usize,
    swing_count: usize,
    next_swing: Option<usize>,
    time_to_lift: f32,
}

/// The walking state: live and target gait parameters plus phase tracking.
pub struct WalkState {
    gait: WalkGait,
    phase_time: f32,
    phase_offset: [f32; NUM_LEGS],
    stand_offset: f32,
    step_length: f32,
    speed_factor: f32,
    params: GaitParams,
    target: GaitParams,
    target_ym: f32,
    target_pitch: f32,
    shift: ShiftState,
    default_feet: [[f32; 4]; NUM_LEGS],
}

impl WalkState {
    /// Create a walk state in the trot variant.
    pub fn new(cfg: &MotionConfig, default_feet: [[f32; 4]; NUM_LEGS]) -> Self {
        let mut state = Self {
            gait: WalkGait::Trot,
            phase_time: 0.0,
            phase_offset: [0.0; NUM_LEGS],
            stand_offset: 0.6,
            step_length: 0.0,
            speed_factor: 2.0,
            params: GaitParams::initial(cfg),
            target: GaitParams::initial(cfg),
            target_ym: cfg.min_body_height,
            target_pitch: 0.0,
            shift: ShiftState::default(),
            default_feet,
        };
        state.set_trot();
        state
    }

    /// Select the trot variant: diagonal pairs, duty 0.6.
    pub fn set_trot(&mut self) {
        self.gait = WalkGait::Trot;
        self.speed_factor = 2.0;
        self.stand_offset = 0.6;
        let offsets = [0.0f32, 0.5, 0.5, 0.0];
        for (slot, offset) in self.phase_offset.iter_mut().zip(offsets) {
            *slot = offset.abs() % 1.0;
        }
    }

    /// Select the crawl variant: staggered quarters through a fixed leg
    /// order, duty 0.85.
    pub fn set_crawl(&mut self) {
        self.gait = WalkGait::Crawl;
        self.speed_factor = 0.5;
        self.stand_offset = 0.85;
        let base = [0.0f32, 0.25, 0.5, 0.75];
        let order = [3usize, 0, 2, 1];
        for (i, leg) in order.into_iter().enumerate() {
            self.phase_offset[leg] = base[i];
        }
    }

    /// Active gait variant.
    #[inline]
    pub const fn gait(&self) -> WalkGait {
        self.gait
    }

    /// Global gait phase in [0, 1).
    #[inline]
    pub const fn phase_time(&self) -> f32 {
        self.phase_time
    }

    /// Signed step length derived from the live step vector.
    #[inline]
    pub const fn step_length(&self) -> f32 {
        self.step_length
    }

    /// Per-leg phase offsets.
    #[inline]
    pub const fn phase_offsets(&self) -> [f32; NUM_LEGS] {
        self.phase_offset
    }

    /// Stance fraction of the cycle.
    #[inline]
    pub const fn duty(&self) -> f32 {
        self.stand_offset
    }

    /// Map operator input onto the target gait parameters.
    pub fn handle_command(&mut self, cmd: &MotionInputMsg, cfg: &MotionConfig) {
        self.target_ym = (cfg.min_body_height + cmd.h * cfg.body_height_range())
            .clamp(cfg.min_body_height, cfg.max_body_height);
        self.target_pitch = cmd.ry * cfg.max_pitch_deg;
        self.target.step_height = cmd.s1 * cfg.max_step_height;
        self.target.step_x = cmd.ly * cfg.max_step_length;
        self.target.step_z = -cmd.lx * cfg.max_step_length;
        self.target.step_velocity = cmd.s;
        self.target.step_angle = cmd.rx;
        self.target.step_depth = cfg.default_step_depth;
    }

    /// Advance one tick: smooth parameters toward targets, advance phase,
    /// shift the body (crawl) and compose all four feet.
    pub fn step(&mut self, body: &mut BodyState, dt: f32, cfg: &MotionConfig, tilt: TiltBias) {
        let s = cfg.gait_smoothing;
        body.ym = lerp(body.ym, self.target_ym, s);
        body.pitch = lerp(body.pitch, self.target_pitch - tilt.pitch, s);
        body.roll = lerp(body.roll, -tilt.roll, s);

        self.params.step_height = self.target.step_height;
        self.params.step_velocity = self.target.step_velocity;
        self.params.step_x = lerp(self.params.step_x, self.target.step_x, s);
        self.params.step_z = lerp(self.params.step_z, self.target.step_z, s);
        self.params.step_angle = lerp(self.params.step_angle, self.target.step_angle, s);
        self.params.step_depth = lerp(self.params.step_depth, self.target.step_depth, s);

        self.step_length = self.params.step_x.hypot(self.params.step_z);
        if self.params.step_x < 0.0 {
            self.step_length = -self.step_length;
        }

        self.update_phase(dt, cfg.deadband);
        self.update_body_position(body, cfg.deadband);
        for leg in 0..NUM_LEGS {
            self.update_foot(body, leg, cfg.rotation_weight);
        }
    }

    fn moving(&self, deadband: f32) -> bool {
        self.params.step_x.abs() >= deadband
            || self.params.step_z.abs() >= deadband
            || self.params.step_angle.abs() >= deadband
    }

    fn update_phase(&mut self, dt: f32, deadband: f32) {
        if !self.moving(deadband) {
            self.phase_time = 0.0;
            return;
        }
        self.phase_time =
            (self.phase_time + dt * self.params.step_velocity * self.speed_factor) % 1.0;
    }

    fn census(&self) -> LegCensus {
        let mut census = LegCensus {
            stance: [0; NUM_LEGS],
            stance_count: 0,
            swing_count: 0,
            next_swing: None,
            time_to_lift: f32::INFINITY,
        };

        for leg in 0..NUM_LEGS {
            let phase = (self.phase_time + self.phase_offset[leg]) % 1.0;
            if phase <= self.stand_offset {
                census.stance[census.stance_count] = leg;
                census.stance_count += 1;
                let time_to_swing = self.stand_offset - phase;
                if time_to_swing < census.time_to_lift {
                    census.time_to_lift = time_to_swing;
                    census.next_swing = Some(leg);
                }
            } else {
                census.swing_count += 1;
            }
        }
        census
    }

    fn stance_centroid(&self, census: &LegCensus) -> (f32, f32) {
        let mut sx = 0.0;
        let mut sz = 0.0;
        let mut count = 0;
        for &leg in &census.stance[..census.stance_count] {
            if Some(leg) != census.next_swing {
                sx += self.default_feet[leg][0];
                sz += self.default_feet[leg][2];
                count += 1;
            }
        }
        if count == 0 {
            (0.0, 0.0)
        } else {
            (sx / count as f32, sz / count as f32)
        }
    }

    /// Crawl-only: while every foot is planted and one is about to lift,
    /// glide the body onto the centroid of the feet that will remain.
    fn update_body_position(&mut self, body: &mut BodyState, deadband: f32) {
        if self.gait != WalkGait::Crawl || !self.moving(deadband) {
            return;
        }

        let census = self.census();
        let Some(next_swing) = census.next_swing else {
            return;
        };
        if census.stance_count < 3 || census.swing_count != 0 {
            return;
        }

        if self.shift.current_leg != Some(next_swing) {
            self.shift.current_leg = Some(next_swing);
            self.shift.start_x = body.xm;
            self.shift.start_z = body.zm;
            let (tx, tz) = self.stance_centroid(&census);
            self.shift.target_x = tx;
            self.shift.target_z = tz;
            self.shift.start_time = census.time_to_lift;
        }

        let total = self.shift.start_time;
        let progress = if total > 0.0 {
            1.0 - census.time_to_lift / total
        } else {
            1.0
        };
        let smooth = smoothstep01(progress.clamp(0.0, 1.0));
        body.xm = lerp(self.shift.start_x, self.shift.target_x, smooth);
        body.zm = lerp(self.shift.start_z, self.shift.target_z, smooth);
    }

    fn update_foot(&mut self, body: &mut BodyState, leg: usize, rotation_weight: f32) {
        body.feet[leg] = self.default_feet[leg];
        let leg_phase = (self.phase_time + self.phase_offset[leg]) % 1.0;
        if leg_phase <= self.stand_offset {
            let phase = leg_phase / self.stand_offset;
            self.apply_curves(body, leg, phase, false, rotation_weight);
        } else {
            let phase = (leg_phase - self.stand_offset) / (1.0 - self.stand_offset);
            self.apply_curves(body, leg, phase, true, rotation_weight);
        }
    }

    fn apply_curves(
        &self,
        body: &mut BodyState,
        leg: usize,
        phase: f32,
        swing: bool,
        rotation_weight: f32,
    ) {
        type Curve = fn(f32, f32, f32, f32, &mut [f32; 3]);
        let (curve, arg): (Curve, f32) = if swing {
            (bezier_curve, self.params.step_height)
        } else {
            (stance_curve, self.params.step_depth)
        };

        let mut delta_pos = [0.0; 3];
        let mut delta_rot = [0.0; 3];

        let length = self.step_length * 0.5;
        let angle = self.params.step_z.atan2(self.step_length);
        curve(length, angle, arg, phase, &mut delta_pos);

        let length = self.params.step_angle * 2.0;
        let angle = yaw_arc(&self.default_feet[leg], &body.feet[leg]);
        curve(length, angle, arg, phase, &mut delta_rot);

        let w = rotation_weight;
        body.feet[leg][0] += delta_pos[0] + delta_rot[0] * w;
        if self.step_length != 0.0 || self.params.step_angle != 0.0 {
            body.feet[leg][1] += delta_pos[1] + delta_rot[1] * w;
        }
        body.feet[leg][2] += delta_pos[2] + delta_rot[2] * w;
    }
}

/// Cubic smoothstep on [0, 1].
fn smoothstep01(t: f32) -> f32 {
    let x = t.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}

/// Stance (ground contact) curve: linear drag against the travel direction
/// with a shallow cosine penetration.
fn stance_curve(length: f32, angle: f32, depth: f32, phase: f32, point: &mut [f32; 3]) {
    let step = length * (1.0 - 2.0 * phase);
    point[0] += step * angle.cos();
    point[2] += step * angle.sin();
    if length != 0.0 {
        point[1] = -depth * ((PI * (point[0] + point[2])) / (2.0 * length)).cos();
    }
}

/// Swing curve: degree-11 Bezier through the control tables, evaluated in
/// polar form so one parameter set serves translation and rotation.
fn bezier_curve(length: f32, angle: f32, height: f32, phase: f32, point: &mut [f32; 3]) {
    let x_polar = angle.cos();
    let z_polar = angle.sin();

    let t = phase.clamp(1e-4, 1.0 - 1e-4);
    let one_minus = 1.0 - t;
    let mut t_pow = 1.0f32;
    let mut inv_pow = one_minus.powi(11);

    for i in 0..BINOMIAL.len() {
        let b = BINOMIAL[i] * t_pow * inv_pow;
        point[0] += b * BEZIER_STEPS[i] * length * x_polar;
        point[1] += b * BEZIER_HEIGHTS[i] * height;
        point[2] += b * BEZIER_STEPS[i] * length * z_polar;

        t_pow *= t;
        inv_pow /= one_minus;
    }
}

/// Direction of the rotational component for one foot: perpendicular to the
/// foot's bearing from the body center, widened by its current offset.
fn yaw_arc(default_foot: &[f32; 4], current_foot: &[f32; 4]) -> f32 {
    let foot_mag = default_foot[0].hypot(default_foot[2]);
    let foot_dir = default_foot[2].atan2(default_foot[0]);
    let dx = current_foot[0] - default_foot[0];
    let dz = current_foot[2] - default_foot[2];
    let offset_mag = dx.hypot(dz);
    let offset_mod = offset_mag.atan2(foot_mag);

    FRAC_PI_2 + foot_dir + offset_mod
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use strider_common::config::MotionConfig;

    const DT: f32 = 0.02;

    fn cfg() -> MotionConfig {
        MotionConfig::default()
    }

    fn feet() -> [[f32; 4]; NUM_LEGS] {
        [
            [1.0, -1.0, 0.7, 1.0],
            [1.0, -1.0, -0.7, 1.0],
            [-1.0, -1.0, 0.7, 1.0],
            [-1.0, -1.0, -0.7, 1.0],
        ]
    }

    fn forward_command(ly: f32) -> MotionInputMsg {
        MotionInputMsg {
            ly,
            s: 0.5,
            s1: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn trot_and_crawl_parameter_sets() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());

        assert_eq!(walk.gait(), WalkGait::Trot);
        assert_eq!(walk.phase_offsets(), [0.0, 0.5, 0.5, 0.0]);
        assert!((walk.duty() - 0.6).abs() < f32::EPSILON);

        walk.set_crawl();
        assert_eq!(walk.gait(), WalkGait::Crawl);
        assert_eq!(walk.phase_offsets(), [0.25, 0.75, 0.5, 0.0]);
        assert!((walk.duty() - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn phase_holds_at_zero_without_input() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        let mut body = BodyState::neutral(config.min_body_height, feet());

        walk.handle_command(&forward_command(0.0), &config);
        for _ in 0..500 {
            walk.step(&mut body, DT, &config, TiltBias::default());
            assert_eq!(walk.phase_time(), 0.0);
        }
    }

    #[test]
    fn phase_advances_and_wraps_when_moving() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        let mut body = BodyState::neutral(config.min_body_height, feet());

        walk.handle_command(&forward_command(1.0), &config);
        let mut seen_nonzero = false;
        for _ in 0..500 {
            walk.step(&mut body, DT, &config, TiltBias::default());
            let p = walk.phase_time();
            assert!((0.0..1.0).contains(&p));
            seen_nonzero |= p > 0.0;
        }
        assert!(seen_nonzero);
    }

    #[test]
    fn stationary_feet_stay_on_their_defaults() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        let mut body = BodyState::neutral(config.min_body_height, feet());

        walk.handle_command(&forward_command(0.0), &config);
        for _ in 0..200 {
            walk.step(&mut body, DT, &config, TiltBias::default());
        }
        for (foot, default) in body.feet.iter().zip(feet().iter()) {
            for (a, b) in foot.iter().zip(default.iter()) {
                assert!((a - b).abs() < 1e-3, "{:?} vs {:?}", body.feet, feet());
            }
        }
    }

    #[test]
    fn forward_walk_sweeps_feet_along_x() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        let mut body = BodyState::neutral(config.min_body_height, feet());

        walk.handle_command(&forward_command(1.0), &config);
        let (mut min_x, mut max_x) = (f32::INFINITY, f32::NEG_INFINITY);
        let mut max_y = f32::NEG_INFINITY;
        for _ in 0..400 {
            walk.step(&mut body, DT, &config, TiltBias::default());
            min_x = min_x.min(body.feet[0][0]);
            max_x = max_x.max(body.feet[0][0]);
            max_y = max_y.max(body.feet[0][1]);
        }
        // Stance sweep alone spans the full step length.
        assert!(
            max_x - min_x > 0.5 * config.max_step_length,
            "x range {} too small",
            max_x - min_x
        );
        // Swings lift the foot above the stance plane.
        assert!(max_y > feet()[0][1] + 0.05, "no foot lift seen: {max_y}");
    }

    #[test]
    fn crawl_never_swings_two_legs_at_once() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        walk.set_crawl();

        let offsets = walk.phase_offsets();
        let duty = walk.duty();
        for i in 0..1000 {
            let phase = i as f32 / 1000.0;
            let swinging = offsets
                .iter()
                .filter(|offset| (phase + **offset) % 1.0 > duty)
                .count();
            assert!(swinging <= 1, "phase {phase}: {swinging} legs in swing");
        }
    }

    #[test]
    fn crawl_shifts_body_toward_stance_centroid() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        walk.set_crawl();
        let mut body = BodyState::neutral(config.min_body_height, feet());

        walk.handle_command(&forward_command(1.0), &config);
        let mut max_shift = 0.0f32;
        for _ in 0..2000 {
            walk.step(&mut body, DT, &config, TiltBias::default());
            max_shift = max_shift.max(body.xm.abs().max(body.zm.abs()));
        }
        assert!(max_shift > 0.01, "body never shifted: {max_shift}");
    }

    #[test]
    fn trot_does_not_shift_the_body() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        let mut body = BodyState::neutral(config.min_body_height, feet());

        walk.handle_command(&forward_command(1.0), &config);
        for _ in 0..500 {
            walk.step(&mut body, DT, &config, TiltBias::default());
            assert_eq!(body.xm, 0.0);
            assert_eq!(body.zm, 0.0);
        }
    }

    #[test]
    fn step_z_opposes_lateral_stick() {
        let config = cfg();
        let mut walk = WalkState::new(&config, feet());
        walk.handle_command(
            &MotionInputMsg {
                lx: 1.0,
                s: 0.5,
                ..Default::default()
            },
            &config,
        );
        assert!((walk.target.step_z + config.max_step_length).abs() < 1e-6);
    }

    #[test]
    fn stance_curve_sweeps_linearly() {
        let mut start = [0.0; 3];
        stance_curve(0.3, 0.0, 0.002, 0.0, &mut start);
        assert!((start[0] - 0.3).abs() < 1e-6);

        let mut mid = [0.0; 3];
        stance_curve(0.3, 0.0, 0.002, 0.5, &mut mid);
        assert!(mid[0].abs() < 1e-6);

        let mut end = [0.0; 3];
        stance_curve(0.3, 0.0, 0.002, 1.0, &mut end);
        assert!((end[0] + 0.3).abs() < 1e-6);

        // Penetration is bounded by the configured depth.
        assert!(mid[1] <= 0.0 && mid[1] >= -0.002 - 1e-6);
    }

    #[test]
    fn bezier_curve_spans_the_step_and_lifts_midway() {
        let mut start = [0.0; 3];
        bezier_curve(0.3, 0.0, 0.4, 0.0, &mut start);
        assert!((start[0] + 0.3).abs() < 0.01, "start {start:?}");

        let mut end = [0.0; 3];
        bezier_curve(0.3, 0.0, 0.4, 1.0, &mut end);
        assert!((end[0] - 0.3).abs() < 0.01, "end {end:?}");

        let mut mid = [0.0; 3];
        bezier_curve(0.3, 0.0, 0.4, 0.5, &mut mid);
        assert!(mid[0].abs() < 0.05, "mid {mid:?}");
        assert!(mid[1] > 0.3, "no lift at midpoint: {mid:?}");
    }

    #[test]
    fn bezier_is_symmetric_in_the_polar_angle() {
        // angle = pi/2 moves the step into the z axis.
        let mut z_step = [0.0; 3];
        bezier_curve(0.3, FRAC_PI_2, 0.4, 0.25, &mut z_step);
        let mut x_step = [0.0; 3];
        bezier_curve(0.3, 0.0, 0.4, 0.25, &mut x_step);
        assert!((z_step[2] - x_step[0]).abs() < 1e-4);
        assert!(z_step[0].abs() < 1e-4);
    }
}
