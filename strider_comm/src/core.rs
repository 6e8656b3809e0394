//! Transport-agnostic adapter core.
//!
//! Owns the per-client subscription bitmasks and the adapter's per-topic
//! bus handles. The bitmap lock is held only for bit twiddling; encoding
//! and sending happen outside it. Bus handles are allocated lazily when the
//! first client subscribes to a topic and released when the last one
//! leaves, so an idle adapter costs the bus nothing.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use strider_bus::{DeliveryMode, EventBus, Handle};
use strider_common::consts::MAX_CID;
use strider_common::topic::{Payload, Topic};
use strider_common::wire::{self, Frame};

use crate::error::CommError;

/// Adapter-local client identifier, `0..MAX_CID`.
pub type ClientId = usize;

/// Transport half of an adapter: queue one encoded frame toward one client.
///
/// Called from the bus worker thread; implementations must hand off to
/// their own I/O machinery instead of blocking. A failure affects only the
/// addressed client.
pub trait FrameSender: Send + Sync + 'static {
    fn send(&self, cid: ClientId, bytes: &[u8]) -> Result<(), CommError>;
}

struct SubTable {
    /// One bit per client, one mask per topic.
    masks: [u8; Topic::COUNT],
    /// Lazily held bus subscriptions, one per topic with any subscribers.
    handles: [Option<Handle>; Topic::COUNT],
}

struct CoreInner {
    bus: EventBus,
    sender: Box<dyn FrameSender>,
    label: &'static str,
    subs: Mutex<SubTable>,
}

impl CoreInner {
    /// Encode once, send to every client whose bit is set. The bitmap lock
    /// is released before the first send.
    fn emit(&self, topic: Topic, payload: &Payload) {
        let mask = self.subs.lock().masks[topic.index()];
        if mask == 0 {
            return;
        }

        let frame = Frame::Event {
            topic,
            payload: *payload,
        };
        let bytes = match wire::encode(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("{}: could not encode {topic:?} event: {err}", self.label);
                return;
            }
        };

        for cid in 0..MAX_CID {
            if mask & (1 << cid) != 0 {
                if let Err(err) = self.sender.send(cid, &bytes) {
                    warn!("{}: send to client {cid} failed: {err}", self.label);
                }
            }
        }
    }

    fn send_frame(&self, cid: ClientId, frame: &Frame) {
        match wire::encode(frame) {
            Ok(bytes) => {
                if let Err(err) = self.sender.send(cid, &bytes) {
                    warn!("{}: send to client {cid} failed: {err}", self.label);
                }
            }
            Err(err) => warn!("{}: could not encode frame: {err}", self.label),
        }
    }
}

/// The adapter core shared by the WebSocket and BLE transports.
pub struct CommCore {
    inner: Arc<CoreInner>,
}

impl CommCore {
    /// Create a core publishing into `bus` and sending through `sender`.
    /// `label` tags log lines with the owning transport.
    pub fn new(bus: EventBus, sender: Box<dyn FrameSender>, label: &'static str) -> Self {
        Self {
            inner: Arc::new(CoreInner {
                bus,
                sender,
                label,
                subs: Mutex::new(SubTable {
                    masks: [0; Topic::COUNT],
                    handles: std::array::from_fn(|_| None),
                }),
            }),
        }
    }

    /// Subscribe one client to one topic. Allocates the adapter's bus
    /// handle for the topic on first use.
    pub fn subscribe(&self, topic: Topic, cid: ClientId) {
        if cid >= MAX_CID {
            return;
        }
        let mut subs = self.inner.subs.lock();
        subs.masks[topic.index()] |= 1 << cid;
        if subs.handles[topic.index()].is_none() {
            subs.handles[topic.index()] = Some(self.bus_subscription(topic));
        }
    }

    /// Unsubscribe one client from one topic. Releases the bus handle when
    /// the last client leaves.
    pub fn unsubscribe(&self, topic: Topic, cid: ClientId) {
        if cid >= MAX_CID {
            return;
        }
        let mut subs = self.inner.subs.lock();
        subs.masks[topic.index()] &= !(1 << cid);
        if subs.masks[topic.index()] == 0 {
            subs.handles[topic.index()] = None;
        }
    }

    /// Clear every subscription of a disconnecting client and release any
    /// bus handle it was the last user of. Runs synchronously, so the bits
    /// are gone before the next bus dispatch.
    pub fn disconnect(&self, cid: ClientId) {
        if cid >= MAX_CID {
            return;
        }
        let mut subs = self.inner.subs.lock();
        for idx in 0..Topic::COUNT {
            subs.masks[idx] &= !(1 << cid);
            if subs.masks[idx] == 0 {
                subs.handles[idx] = None;
            }
        }
        debug!("{}: client {cid} disconnected", self.inner.label);
    }

    /// True when any client subscribes to the topic.
    pub fn has_subscribers(&self, topic: Topic) -> bool {
        self.inner.subs.lock().masks[topic.index()] != 0
    }

    /// Process one inbound frame from a client. Malformed frames are
    /// dropped with a log line; the connection continues.
    pub fn handle_frame(&self, cid: ClientId, bytes: &[u8]) {
        if cid >= MAX_CID {
            warn!("{}: frame from out-of-range client {cid}", self.inner.label);
            return;
        }

        let frame = match wire::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("{}: dropped frame from client {cid}: {err}", self.inner.label);
                return;
            }
        };

        match frame {
            Frame::Connect(topics) => {
                for topic in topics {
                    self.subscribe(topic, cid);
                }
            }
            Frame::Disconnect(topics) => {
                for topic in topics {
                    self.unsubscribe(topic, cid);
                }
            }
            Frame::Event { topic, payload } => {
                // Forward onto the bus, skipping this adapter's own
                // subscription so the event is not echoed back to any of
                // its clients.
                let subs = self.inner.subs.lock();
                match &subs.handles[topic.index()] {
                    Some(own) => {
                        self.inner.bus.publish_async_payload_excluding(payload, own);
                    }
                    None => {
                        self.inner.bus.publish_async_payload(payload);
                    }
                }
            }
            Frame::Ping => self.inner.send_frame(cid, &Frame::Pong),
            Frame::Pong => {}
        }
    }

    fn bus_subscription(&self, topic: Topic) -> Handle {
        let weak: Weak<CoreInner> = Arc::downgrade(&self.inner);
        self.inner
            .bus
            .subscribe_raw(topic, 0, DeliveryMode::Latest, move |items| {
                let Some(inner) = weak.upgrade() else { return };
                if let Some(payload) = items.last() {
                    inner.emit(topic, payload);
                }
            })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
