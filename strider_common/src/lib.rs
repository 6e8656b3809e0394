//! Strider Common Library
//!
//! Shared building blocks for all Strider workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Workspace-wide constants (servo counts, bus sizing, PWM limits)
//! - [`topic`] - Compile-time topic registry and the sealed payload union
//! - [`msg`] - Typed messages carried on the bus and the wire
//! - [`wire`] - Frame codec shared by the WebSocket and BLE adapters
//! - [`timing`] - Monotonic clock, fixed-rate ticker, cycle statistics
//! - [`config`] - TOML configuration types with validation and defaults

pub mod config;
pub mod consts;
pub mod msg;
pub mod timing;
pub mod topic;
pub mod wire;
