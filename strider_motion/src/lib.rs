//! Strider Motion
//!
//! The real-time motion pipeline: at a fixed tick the engine advances the
//! active gait, composes a body pose plus four foot positions, solves the
//! closed-form inverse kinematics down to twelve joint angles and hands the
//! vector to the servo driver, publishing throttled telemetry on the way.
//!
//! - [`kinematics`] - pure IK solver with per-variant leg dimension tables
//! - [`gait`] - tagged-variant gait state machine (rest, stand, trot, crawl)
//! - [`engine`] - the 50 Hz cycle runner gluing gait, IK, sensors and servos

pub mod engine;
pub mod gait;
pub mod kinematics;

pub use engine::{JointSink, MotionEngine};
pub use gait::{GaitPlanner, MotionMode, WalkGait};
pub use kinematics::{BodyState, Kinematics, LegDims};
