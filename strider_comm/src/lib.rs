//! Strider Communication Adapters
//!
//! Two transports share one adapter core: WebSocket (axum) for the remote
//! UI and a BLE GATT service for the phone app. The core owns the
//! per-client topic subscription sets, decodes inbound frames onto the
//! event bus (excluding its own bus subscription, so a forwarded client
//! event is never echoed back through the same adapter) and fans bus
//! emissions out to every subscribed client from a single encode.

pub mod ble;
pub mod core;
pub mod error;
pub mod ws;

pub use core::{ClientId, CommCore, FrameSender};
pub use error::CommError;
