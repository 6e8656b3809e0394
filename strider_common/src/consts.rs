//! Workspace-wide constants.

/// Number of legs.
pub const NUM_LEGS: usize = 4;

/// Number of servo channels (4 legs x {hip, upper, lower}).
pub const NUM_SERVOS: usize = 12;

/// Maximum concurrent adapter clients per adapter.
pub const MAX_CID: usize = 4;

/// Depth of the event bus FIFO.
pub const QUEUE_DEPTH: usize = 64;

/// Subscriber slots per topic.
pub const MAX_SUBS: usize = 8;

/// Maximum items buffered per subscriber in batch mode.
pub const BATCH_MAX: usize = 16;

/// Lowest PWM tick value ever written to a servo channel.
pub const PWM_MIN: u16 = 125;

/// Highest PWM tick value ever written to a servo channel.
pub const PWM_MAX: u16 = 600;

/// Upper bound accepted by the direct PWM override.
pub const PWM_RAW_MAX: u16 = 4096;

/// Smallest dt handed to the motion pipeline [s].
pub const DT_MIN: f32 = 0.001;

/// Largest dt handed to the motion pipeline [s]. Caps numerical blow-up
/// after a stall or debugger pause.
pub const DT_MAX: f32 = 0.1;
