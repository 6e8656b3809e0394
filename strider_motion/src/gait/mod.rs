//! Gait state machine.
//!
//! One tagged dispatcher over four states: Deactivated (servos asleep),
//! Rest (body lowered onto folded legs), Stand (body pose tracks the
//! sticks over a fixed stance) and Walk (continuous-phase gait with trot
//! and crawl variants). Bad mode codes keep the previous state.

mod walk;

pub use walk::WalkState;

use strider_common::config::MotionConfig;
use strider_common::consts::NUM_LEGS;
use strider_common::msg::MotionInputMsg;
use tracing::debug;

use crate::kinematics::BodyState;

/// Nominal body height used for the rest pose [body units].
const DEFAULT_BODY_HEIGHT: f32 = 0.5;

/// Motion modes as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MotionMode {
    /// Servos asleep; the engine idles.
    Deactivated = 0,
    /// Body lowered, legs folded under the frame.
    Rest = 1,
    /// Hold stance; body pose tracks the sticks.
    Stand = 2,
    /// Walking gait; variant selected by [`WalkGait`].
    Walk = 3,
}

impl MotionMode {
    /// Wire code of this mode.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code. Unknown codes return `None` and the caller keeps
    /// its previous state.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Deactivated),
            1 => Some(Self::Rest),
            2 => Some(Self::Stand),
            3 => Some(Self::Walk),
            _ => None,
        }
    }
}

/// Walking gait variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalkGait {
    /// Two-phase diagonal gait.
    Trot = 0,
    /// Four-phase statically stable gait.
    Crawl = 1,
}

impl WalkGait {
    /// Parse a wire code. Unknown codes return `None`.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Trot),
            1 => Some(Self::Crawl),
            _ => None,
        }
    }
}

/// Linear interpolation.
#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// IMU-derived tilt bias [deg], already scaled by the configured gain.
/// Subtracted from the body orientation targets as a crude levelling term.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TiltBias {
    pub roll: f32,
    pub pitch: f32,
}

// ─── Stand ──────────────────────────────────────────────────────────

/// Stand state: fixed stance, smoothed body pose from the sticks.
#[derive(Debug, Clone)]
pub struct StandState {
    target_yaw: f32,
    target_pitch: f32,
    target_xm: f32,
    target_zm: f32,
    target_ym: f32,
}

impl StandState {
    fn new(cfg: &MotionConfig) -> Self {
        Self {
            target_yaw: 0.0,
            target_pitch: 0.0,
            target_xm: 0.0,
            target_zm: 0.0,
            target_ym: cfg.min_body_height,
        }
    }

    fn handle_command(&mut self, cmd: &MotionInputMsg, cfg: &MotionConfig) {
        self.target_yaw = cmd.rx * cfg.stand_tilt_deg;
        self.target_pitch = cmd.ry * cfg.stand_tilt_deg;
        self.target_xm = cmd.ly * cfg.stand_shift;
        self.target_zm = cmd.lx * cfg.stand_shift;
        self.target_ym = (cfg.min_body_height + cmd.h * cfg.body_height_range())
            .clamp(cfg.min_body_height, cfg.max_body_height);
    }

    fn step(
        &self,
        body: &mut BodyState,
        default_feet: &[[f32; 4]; NUM_LEGS],
        cfg: &MotionConfig,
        tilt: TiltBias,
    ) {
        let s = cfg.gait_smoothing;
        body.roll = lerp(body.roll, -tilt.roll, s);
        body.pitch = lerp(body.pitch, self.target_pitch - tilt.pitch, s);
        body.yaw = lerp(body.yaw, self.target_yaw, s);
        body.xm = lerp(body.xm, self.target_xm, s);
        body.zm = lerp(body.zm, self.target_zm, s);
        body.ym = lerp(body.ym, self.target_ym, s);
        body.set_feet(default_feet);
    }
}

// ─── Planner ────────────────────────────────────────────────────────

/// The per-tick gait dispatcher owned by the motion engine.
pub struct GaitPlanner {
    cfg: MotionConfig,
    mode: MotionMode,
    walk: WalkState,
    stand: StandState,
    default_feet: [[f32; 4]; NUM_LEGS],
    tilt: TiltBias,
}

impl GaitPlanner {
    /// Create a planner in the Deactivated state.
    pub fn new(cfg: MotionConfig, default_feet: [[f32; 4]; NUM_LEGS]) -> Self {
        let walk = WalkState::new(&cfg, default_feet);
        let stand = StandState::new(&cfg);
        Self {
            cfg,
            mode: MotionMode::Deactivated,
            walk,
            stand,
            default_feet,
            tilt: TiltBias::default(),
        }
    }

    /// Current mode.
    #[inline]
    pub const fn mode(&self) -> MotionMode {
        self.mode
    }

    /// Active walk state (phase inspection, gait variant).
    #[inline]
    pub const fn walk(&self) -> &WalkState {
        &self.walk
    }

    /// Switch modes. Returns true when the mode actually changed.
    pub fn set_mode(&mut self, mode: MotionMode) -> bool {
        if mode == self.mode {
            return false;
        }
        debug!("gait planner: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        true
    }

    /// Select the walking gait variant.
    pub fn set_walk_gait(&mut self, gait: WalkGait) {
        match gait {
            WalkGait::Trot => self.walk.set_trot(),
            WalkGait::Crawl => self.walk.set_crawl(),
        }
    }

    /// Route operator input to the active state's target mapping.
    pub fn handle_command(&mut self, cmd: &MotionInputMsg) {
        self.stand.handle_command(cmd, &self.cfg);
        self.walk.handle_command(cmd, &self.cfg);
    }

    /// Update the levelling bias applied to orientation targets.
    pub fn set_tilt_bias(&mut self, tilt: TiltBias) {
        self.tilt = tilt;
    }

    /// Advance one tick. Returns false when the planner is deactivated and
    /// the body state was left untouched.
    pub fn step(&mut self, body: &mut BodyState, dt: f32) -> bool {
        match self.mode {
            MotionMode::Deactivated => false,
            MotionMode::Rest => {
                body.roll = 0.0;
                body.pitch = 0.0;
                body.yaw = 0.0;
                body.xm = 0.0;
                body.zm = 0.0;
                body.ym = DEFAULT_BODY_HEIGHT / 2.0;
                body.set_feet(&self.default_feet);
                true
            }
            MotionMode::Stand => {
                self.stand
                    .step(body, &self.default_feet, &self.cfg, self.tilt);
                true
            }
            MotionMode::Walk => {
                self.walk.step(body, dt, &self.cfg, self.tilt);
                true
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
