//! Strider Topic Event Bus
//!
//! The shared spine between the motion engine, the sensor readers and the
//! network adapters. One bounded FIFO feeds a dedicated worker thread which
//! fans items out to per-topic subscriber slots in slot order; each slot
//! carries its own delivery interval and mode (latest-wins or batching).
//!
//! Design points:
//!
//! - Publishing never calls subscriber code on the publisher's thread; the
//!   worker serializes all delivery, which is what gives the per-topic
//!   ordering guarantee.
//! - A publisher may exclude its own subscription handle so an adapter that
//!   forwards a client event never echoes it back to itself.
//! - Subscriber callbacks run outside the subscription-table critical
//!   section, and a panicking callback is logged and isolated.
//! - Handles are RAII: dropping a handle unsubscribes its slot.

mod bus;
mod queue;

pub use bus::{BusError, DeliveryMode, EventBus, Handle};
pub use queue::BoundedQueue;
