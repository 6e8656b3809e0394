//! Configuration types and TOML loading.
//!
//! One settings blob per subsystem, read once at boot. A missing or invalid
//! file falls back to the compiled defaults and the defaults are written
//! back, so the robot always comes up and the operator can edit a complete
//! file afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{NUM_SERVOS, PWM_MAX, PWM_MIN};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for configuration.
///
/// Serializes to lowercase strings: "trace", "debug", "info", "warn", "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Robot geometry variant. Selects the leg dimension table used by the
/// kinematics solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotVariant {
    /// Full-size SpotMicro frame.
    SpotMicro,
    /// Compact frame with no hip offset links.
    SpotMicroMini,
    /// Yertle frame (equal upper/lower links, folded knee convention).
    Yertle,
}

// ─── Shared ─────────────────────────────────────────────────────────

/// Fields common to every process in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    pub log_level: LogLevel,
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: "strider".to_string(),
        }
    }
}

impl SharedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Motion ─────────────────────────────────────────────────────────

/// Motion engine and gait parameters.
///
/// The smoothing factors and command scaling live here rather than as
/// literals in the gait code so a build for a different frame only touches
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Robot geometry variant.
    pub variant: RobotVariant,
    /// Motion tick period [ms].
    pub tick_period_ms: u64,
    /// Telemetry publish rate [Hz] for angles/position events.
    pub telemetry_hz: f32,
    /// Lowest commanded body height [body units].
    pub min_body_height: f32,
    /// Highest commanded body height [body units].
    pub max_body_height: f32,
    /// Stick-to-pitch scaling [deg] in walk.
    pub max_pitch_deg: f32,
    /// Stick-to-step scaling [body units].
    pub max_step_length: f32,
    /// Slider-to-step-height scaling [body units].
    pub max_step_height: f32,
    /// Step height when no slider input has arrived.
    pub default_step_height: f32,
    /// Stance-curve penetration depth.
    pub default_step_depth: f32,
    /// LERP factor for gait parameter and body pose smoothing per tick.
    pub gait_smoothing: f32,
    /// LERP factor for joint angle smoothing per tick.
    pub angle_smoothing: f32,
    /// Weight of the rotational curve component on foot deltas.
    pub rotation_weight: f32,
    /// Fraction of measured IMU tilt fed back into the body pose target.
    pub imu_bias_gain: f32,
    /// Stick-to-tilt scaling [deg] in stand.
    pub stand_tilt_deg: f32,
    /// Stick-to-shift scaling [body units] in stand.
    pub stand_shift: f32,
    /// Inputs with magnitude below this hold the gait phase at zero.
    pub deadband: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            variant: RobotVariant::SpotMicro,
            tick_period_ms: 20,
            telemetry_hz: 20.0,
            min_body_height: 0.35,
            max_body_height: 1.0,
            max_pitch_deg: 15.0,
            max_step_length: 0.6,
            max_step_height: 0.6,
            default_step_height: 0.4,
            default_step_depth: 0.002,
            gait_smoothing: 0.1,
            angle_smoothing: 0.3,
            rotation_weight: 0.2,
            imu_bias_gain: 0.1,
            stand_tilt_deg: 16.0,
            stand_shift: 0.5,
            deadband: 0.01,
        }
    }
}

impl MotionConfig {
    /// Commanded body height span above the minimum.
    #[inline]
    pub fn body_height_range(&self) -> f32 {
        self.max_body_height - self.min_body_height
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.tick_period_ms) {
            return Err(ConfigError::ValidationError(format!(
                "tick_period_ms {} outside 1..=100",
                self.tick_period_ms
            )));
        }
        if self.min_body_height >= self.max_body_height {
            return Err(ConfigError::ValidationError(format!(
                "min_body_height {} must be below max_body_height {}",
                self.min_body_height, self.max_body_height
            )));
        }
        for (name, value) in [
            ("gait_smoothing", self.gait_smoothing),
            ("angle_smoothing", self.angle_smoothing),
        ] {
            if !(0.0..=1.0).contains(&value) || value == 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} {value} outside (0, 1]"
                )));
            }
        }
        if self.telemetry_hz <= 0.0 {
            return Err(ConfigError::ValidationError(
                "telemetry_hz must be positive".to_string(),
            ));
        }
        if self.max_step_length <= 0.0 || self.max_step_height <= 0.0 {
            return Err(ConfigError::ValidationError(
                "step scaling must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Servos ─────────────────────────────────────────────────────────

/// Per-channel servo calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoChannel {
    /// PWM tick value for the center position.
    pub center_pwm: u16,
    /// Rotation direction sign: -1 or +1.
    pub direction: i8,
    /// Mechanical center offset [deg].
    pub center_angle_deg: f32,
    /// Degrees-to-ticks conversion factor.
    pub conversion: f32,
    /// Human-readable channel label.
    pub label: String,
}

impl ServoChannel {
    fn new(center_pwm: u16, direction: i8, center_angle_deg: f32, conversion: f32, label: &str) -> Self {
        Self {
            center_pwm,
            direction,
            center_angle_deg,
            conversion,
            label: label.to_string(),
        }
    }
}

/// Servo driver settings: twelve channel calibrations plus smoothing and
/// keep-alive tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Smoothing factor applied per driver tick.
    pub smoothing: f32,
    /// Driver tick period [ms].
    pub tick_period_ms: u64,
    /// Rewrite all channels after this long without changes [ms].
    pub keepalive_ms: u64,
    /// Channel calibrations, leg-major order.
    pub channels: Vec<ServoChannel>,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.1,
            tick_period_ms: 20,
            keepalive_ms: 500,
            channels: vec![
                ServoChannel::new(306, -1, 0.0, 2.2, "fl_hip"),
                ServoChannel::new(306, 1, -45.0, 2.105_555_5, "fl_upper"),
                ServoChannel::new(306, 1, 90.0, 1.969_23, "fl_lower"),
                ServoChannel::new(306, -1, 0.0, 2.2, "fr_hip"),
                ServoChannel::new(306, -1, 45.0, 2.105_555_5, "fr_upper"),
                ServoChannel::new(306, -1, -90.0, 1.969_23, "fr_lower"),
                ServoChannel::new(306, 1, 0.0, 2.2, "bl_hip"),
                ServoChannel::new(306, 1, -45.0, 2.105_555_5, "bl_upper"),
                ServoChannel::new(306, 1, 90.0, 1.969_23, "bl_lower"),
                ServoChannel::new(306, 1, 0.0, 2.2, "br_hip"),
                ServoChannel::new(306, -1, 45.0, 2.105_555_5, "br_upper"),
                ServoChannel::new(306, -1, -90.0, 1.969_23, "br_lower"),
            ],
        }
    }
}

impl ServoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.len() != NUM_SERVOS {
            return Err(ConfigError::ValidationError(format!(
                "expected {NUM_SERVOS} servo channels, found {}",
                self.channels.len()
            )));
        }
        for (i, ch) in self.channels.iter().enumerate() {
            if ch.direction != 1 && ch.direction != -1 {
                return Err(ConfigError::ValidationError(format!(
                    "channel {i}: direction must be -1 or +1"
                )));
            }
            if !(PWM_MIN..=PWM_MAX).contains(&ch.center_pwm) {
                return Err(ConfigError::ValidationError(format!(
                    "channel {i}: center_pwm {} outside {PWM_MIN}..={PWM_MAX}",
                    ch.center_pwm
                )));
            }
            if ch.conversion <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "channel {i}: conversion must be positive"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.smoothing) || self.smoothing == 0.0 {
            return Err(ConfigError::ValidationError(
                "servo smoothing outside (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Comm ───────────────────────────────────────────────────────────

/// Network adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommConfig {
    /// WebSocket bind address.
    pub ws_addr: String,
    /// Advertised BLE device name.
    pub ble_name: String,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            ws_addr: "0.0.0.0:8080".to_string(),
            ble_name: "Strider".to_string(),
        }
    }
}

impl CommConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ws_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "ws_addr '{}' is not a socket address",
                self.ws_addr
            )));
        }
        Ok(())
    }
}

// ─── Sensors ────────────────────────────────────────────────────────

/// Sensor polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub imu_enabled: bool,
    /// IMU poll period [ms].
    pub imu_period_ms: u64,
    pub sonar_enabled: bool,
    /// Sonar poll period [ms].
    pub sonar_period_ms: u64,
    pub baro_enabled: bool,
    /// Barometer poll period [ms].
    pub baro_period_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            imu_enabled: true,
            imu_period_ms: 10,
            sonar_enabled: true,
            sonar_period_ms: 100,
            baro_enabled: true,
            baro_period_ms: 500,
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, period) in [
            ("imu_period_ms", self.imu_period_ms),
            ("sonar_period_ms", self.sonar_period_ms),
            ("baro_period_ms", self.baro_period_ms),
        ] {
            if period == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be nonzero"
                )));
            }
        }
        Ok(())
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Root configuration for the whole controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StriderConfig {
    pub shared: SharedConfig,
    pub motion: MotionConfig,
    pub servos: ServoConfig,
    pub comm: CommConfig,
    pub sensors: SensorConfig,
}

impl StriderConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.motion.validate()?;
        self.servos.validate()?;
        self.comm.validate()?;
        self.sensors.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, strictly.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound)?;
        Self::from_toml(&text)
    }

    /// Load from a file, falling back to compiled defaults when the file is
    /// missing or invalid. On fallback the defaults are written back so the
    /// operator ends up with a complete, editable file.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("config {}: {err}; using compiled defaults", path.display());
                let defaults = Self::default();
                defaults.write_back(path);
                defaults
            }
        }
    }

    /// Serialize to TOML and write to disk. A failed write is logged and
    /// otherwise ignored; boot continues on defaults either way.
    fn write_back(&self, path: &Path) {
        let text = match toml::to_string_pretty(self) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("could not serialize default config: {err}");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = std::fs::write(path, text) {
            tracing::warn!("could not write defaults to {}: {err}", path.display());
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
