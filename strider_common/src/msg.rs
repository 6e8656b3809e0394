//! Typed messages carried on the event bus and the wire.
//!
//! Every message is a small `Copy` struct. On the wire each message is a
//! flat array of numbers (or a bare integer for mode-style messages), so the
//! serde representation is pinned with `#[serde(from/into)]` conversions to
//! fixed-size arrays rather than named-field maps.

use serde::{Deserialize, Serialize};

use crate::consts::NUM_SERVOS;

/// Operator stick input: two axes per stick plus height, speed and
/// step-height sliders. All fields are normalized to roughly [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 7]", into = "[f32; 7]")]
pub struct MotionInputMsg {
    pub lx: f32,
    pub ly: f32,
    pub rx: f32,
    pub ry: f32,
    pub h: f32,
    pub s: f32,
    pub s1: f32,
}

impl From<[f32; 7]> for MotionInputMsg {
    fn from(a: [f32; 7]) -> Self {
        Self {
            lx: a[0],
            ly: a[1],
            rx: a[2],
            ry: a[3],
            h: a[4],
            s: a[5],
            s1: a[6],
        }
    }
}

impl From<MotionInputMsg> for [f32; 7] {
    fn from(m: MotionInputMsg) -> Self {
        [m.lx, m.ly, m.rx, m.ry, m.h, m.s, m.s1]
    }
}

/// Requested motion mode as a raw wire code.
///
/// Unknown codes are carried through untouched; the motion engine ignores
/// them and keeps its previous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MotionModeMsg {
    pub mode: u8,
}

/// Walk gait selection as a raw wire code (0 = trot, 1 = crawl).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalkGaitMsg {
    pub gait: u8,
}

/// Commanded body pose: roll/pitch/yaw [deg] and translation [body units].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 6]", into = "[f32; 6]")]
pub struct MotionPositionMsg {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub xm: f32,
    pub ym: f32,
    pub zm: f32,
}

impl From<[f32; 6]> for MotionPositionMsg {
    fn from(a: [f32; 6]) -> Self {
        Self {
            roll: a[0],
            pitch: a[1],
            yaw: a[2],
            xm: a[3],
            ym: a[4],
            zm: a[5],
        }
    }
}

impl From<MotionPositionMsg> for [f32; 6] {
    fn from(m: MotionPositionMsg) -> Self {
        [m.roll, m.pitch, m.yaw, m.xm, m.ym, m.zm]
    }
}

/// Twelve joint angles [deg], leg-major order: four legs x {hip, upper,
/// lower}.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; NUM_SERVOS]", into = "[f32; NUM_SERVOS]")]
pub struct MotionAnglesMsg {
    pub angles: [f32; NUM_SERVOS],
}

impl From<[f32; NUM_SERVOS]> for MotionAnglesMsg {
    fn from(angles: [f32; NUM_SERVOS]) -> Self {
        Self { angles }
    }
}

impl From<MotionAnglesMsg> for [f32; NUM_SERVOS] {
    fn from(m: MotionAnglesMsg) -> Self {
        m.angles
    }
}

impl Default for MotionAnglesMsg {
    fn default() -> Self {
        Self {
            angles: [0.0; NUM_SERVOS],
        }
    }
}

/// Attitude estimate: yaw/pitch/roll [deg].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct ImuMsg {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl From<[f32; 3]> for ImuMsg {
    fn from(a: [f32; 3]) -> Self {
        Self {
            yaw: a[0],
            pitch: a[1],
            roll: a[2],
        }
    }
}

impl From<ImuMsg> for [f32; 3] {
    fn from(m: ImuMsg) -> Self {
        [m.yaw, m.pitch, m.roll]
    }
}

/// Direct servo angle override from a client [deg].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; NUM_SERVOS]", into = "[f32; NUM_SERVOS]")]
pub struct ServoAnglesMsg {
    pub angles: [f32; NUM_SERVOS],
}

impl From<[f32; NUM_SERVOS]> for ServoAnglesMsg {
    fn from(angles: [f32; NUM_SERVOS]) -> Self {
        Self { angles }
    }
}

impl From<ServoAnglesMsg> for [f32; NUM_SERVOS] {
    fn from(m: ServoAnglesMsg) -> Self {
        m.angles
    }
}

impl Default for ServoAnglesMsg {
    fn default() -> Self {
        Self {
            angles: [0.0; NUM_SERVOS],
        }
    }
}

/// Legacy two-axis drive command kept for old UIs. Maps onto the stick
/// axes of [`MotionInputMsg`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct CommandMsg {
    pub x: f32,
    pub y: f32,
}

impl From<[f32; 2]> for CommandMsg {
    fn from(a: [f32; 2]) -> Self {
        Self { x: a[0], y: a[1] }
    }
}

impl From<CommandMsg> for [f32; 2] {
    fn from(m: CommandMsg) -> Self {
        [m.x, m.y]
    }
}

/// Sonar range reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 1]", into = "[f32; 1]")]
pub struct SonarMsg {
    pub distance_cm: f32,
}

impl From<[f32; 1]> for SonarMsg {
    fn from(a: [f32; 1]) -> Self {
        Self { distance_cm: a[0] }
    }
}

impl From<SonarMsg> for [f32; 1] {
    fn from(m: SonarMsg) -> Self {
        [m.distance_cm]
    }
}

/// Barometer reading: pressure [hPa], temperature [degC], altitude [m].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct EnvironmentMsg {
    pub pressure: f32,
    pub temperature: f32,
    pub altitude: f32,
}

impl From<[f32; 3]> for EnvironmentMsg {
    fn from(a: [f32; 3]) -> Self {
        Self {
            pressure: a[0],
            temperature: a[1],
            altitude: a[2],
        }
    }
}

impl From<EnvironmentMsg> for [f32; 3] {
    fn from(m: EnvironmentMsg) -> Self {
        [m.pressure, m.temperature, m.altitude]
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
