//! Event bus core: subscriber slots, shaping, worker dispatch.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

use strider_common::consts::{BATCH_MAX, MAX_SUBS, QUEUE_DEPTH};
use strider_common::topic::{Payload, Topic, TopicMessage};

use crate::queue::BoundedQueue;

/// How a rate-limited subscriber's pending messages are delivered when its
/// interval expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Keep only the newest pending message.
    Latest,
    /// Keep up to [`BATCH_MAX`] pending messages; once full the newest
    /// arrivals are dropped so the batch preserves the oldest history.
    Batch,
}

/// Bus construction errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// The dispatch worker thread could not be spawned.
    #[error("could not spawn bus worker: {0}")]
    WorkerSpawn(String),
}

type Callback = Box<dyn FnMut(&[Payload]) + Send>;

struct Slot {
    /// Callback cell, locked only by the worker during delivery.
    cb: Arc<Mutex<Callback>>,
    interval: Duration,
    last: Instant,
    mode: DeliveryMode,
    buf: heapless::Vec<Payload, BATCH_MAX>,
    /// Generation stamp distinguishing a reused slot index from the
    /// subscription a handle was issued for.
    generation: u64,
}

struct TopicState {
    slots: Mutex<[Option<Slot>; MAX_SUBS]>,
    latest: Mutex<Option<Payload>>,
    has_latest: AtomicBool,
    sub_count: AtomicUsize,
}

impl TopicState {
    fn new() -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| None)),
            latest: Mutex::new(None),
            has_latest: AtomicBool::new(false),
            sub_count: AtomicUsize::new(0),
        }
    }
}

struct Item {
    payload: Payload,
    /// Slot to skip during dispatch (publisher self-exclusion).
    exclude: Option<(usize, u64)>,
}

struct BusShared {
    queue: Arc<BoundedQueue<Item>>,
    topics: [TopicState; Topic::COUNT],
    next_gen: AtomicU64,
    enqueued: AtomicU64,
    processed: AtomicU64,
}

impl BusShared {
    /// Fan one item out to the subscribers of its topic, in slot order.
    ///
    /// Readiness and buffering are decided under the table lock; callbacks
    /// run after it is released.
    fn dispatch(&self, item: Item) {
        let topic = item.payload.topic();
        let state = &self.topics[topic.index()];
        let now = Instant::now();

        let mut ready: heapless::Vec<
            (Arc<Mutex<Callback>>, heapless::Vec<Payload, BATCH_MAX>),
            MAX_SUBS,
        > = heapless::Vec::new();

        {
            let mut slots = state.slots.lock();
            for (idx, entry) in slots.iter_mut().enumerate() {
                let Some(slot) = entry else { continue };
                if let Some((ex_idx, ex_gen)) = item.exclude {
                    if ex_idx == idx && ex_gen == slot.generation {
                        continue;
                    }
                }

                let elapsed = now.duration_since(slot.last);
                if !slot.interval.is_zero() && elapsed < slot.interval {
                    match slot.mode {
                        DeliveryMode::Batch => {
                            // Full buffer drops the newest message.
                            let _ = slot.buf.push(item.payload);
                        }
                        DeliveryMode::Latest => {
                            slot.buf.clear();
                            let _ = slot.buf.push(item.payload);
                        }
                    }
                    continue;
                }

                let mut out = core::mem::take(&mut slot.buf);
                if slot.mode == DeliveryMode::Latest {
                    // Only the newest message survives the window.
                    out.clear();
                }
                let _ = out.push(item.payload);
                slot.last = now;
                let _ = ready.push((Arc::clone(&slot.cb), out));
            }
        }

        for (cell, items) in ready {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut cb = cell.lock();
                (*cb)(&items);
            }));
            if outcome.is_err() {
                error!("subscriber callback on {topic:?} panicked; other subscribers unaffected");
            }
        }
    }

    fn store_latest(&self, payload: Payload) {
        let state = &self.topics[payload.topic().index()];
        *state.latest.lock() = Some(payload);
        state.has_latest.store(true, Ordering::Release);
    }
}

/// Handle to one bus subscription. RAII: dropping the handle unsubscribes.
///
/// An invalid handle (returned when every slot of a topic is taken) is
/// inert: it never receives messages and unsubscribing it is a no-op.
pub struct Handle {
    shared: Weak<BusShared>,
    topic: Topic,
    idx: usize,
    generation: u64,
}

impl Handle {
    const INVALID_IDX: usize = usize::MAX;

    fn invalid(topic: Topic) -> Self {
        Self {
            shared: Weak::new(),
            topic,
            idx: Self::INVALID_IDX,
            generation: 0,
        }
    }

    /// True when this handle refers to a live subscription slot.
    #[inline]
    pub fn valid(&self) -> bool {
        self.idx < MAX_SUBS
    }

    /// Topic this handle subscribes to.
    #[inline]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Release the slot. Called automatically on drop. Safe to call from a
    /// subscriber callback; the release takes effect at the next dispatch.
    pub fn unsubscribe(&mut self) {
        if !self.valid() {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            let state = &shared.topics[self.topic.index()];
            let mut slots = state.slots.lock();
            if let Some(slot) = &slots[self.idx] {
                if slot.generation == self.generation {
                    slots[self.idx] = None;
                    state.sub_count.fetch_sub(1, Ordering::AcqRel);
                }
            }
        }
        self.idx = Self::INVALID_IDX;
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("topic", &self.topic)
            .field("idx", &self.idx)
            .field("valid", &self.valid())
            .finish()
    }
}

/// The topic event bus. Cheap to clone; all clones share one worker.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
}

impl EventBus {
    /// Create the bus and spawn its dispatch worker.
    pub fn new() -> Result<Self, BusError> {
        let queue = Arc::new(BoundedQueue::new(QUEUE_DEPTH));
        let shared = Arc::new(BusShared {
            queue: Arc::clone(&queue),
            topics: std::array::from_fn(|_| TopicState::new()),
            next_gen: AtomicU64::new(1),
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&shared);
        std::thread::Builder::new()
            .name("strider-bus".to_string())
            .spawn(move || worker(queue, weak))
            .map_err(|e| BusError::WorkerSpawn(e.to_string()))?;

        Ok(Self { shared })
    }

    // ── Subscription ────────────────────────────────────────────────

    /// Subscribe a raw payload callback on one topic.
    ///
    /// `interval_ms == 0` delivers immediately. Returns an invalid handle
    /// when all slots of the topic are taken; callers treat that the same as
    /// having no subscribers.
    pub fn subscribe_raw(
        &self,
        topic: Topic,
        interval_ms: u64,
        mode: DeliveryMode,
        cb: impl FnMut(&[Payload]) + Send + 'static,
    ) -> Handle {
        let state = &self.shared.topics[topic.index()];
        let mut slots = state.slots.lock();
        for (idx, entry) in slots.iter_mut().enumerate() {
            if entry.is_none() {
                let generation = self.shared.next_gen.fetch_add(1, Ordering::Relaxed);
                *entry = Some(Slot {
                    cb: Arc::new(Mutex::new(Box::new(cb))),
                    interval: Duration::from_millis(interval_ms),
                    last: Instant::now(),
                    mode,
                    buf: heapless::Vec::new(),
                    generation,
                });
                state.sub_count.fetch_add(1, Ordering::AcqRel);
                return Handle {
                    shared: Arc::downgrade(&self.shared),
                    topic,
                    idx,
                    generation,
                };
            }
        }
        warn!("subscriber slots exhausted on {topic:?}");
        Handle::invalid(topic)
    }

    /// Subscribe a typed per-message callback on the message's topic.
    pub fn subscribe<M: TopicMessage>(
        &self,
        interval_ms: u64,
        mode: DeliveryMode,
        mut f: impl FnMut(&M) + Send + 'static,
    ) -> Handle {
        self.subscribe_raw(M::TOPIC, interval_ms, mode, move |items| {
            for payload in items {
                if let Some(msg) = M::from_payload(payload) {
                    f(msg);
                }
            }
        })
    }

    // ── Publishing ──────────────────────────────────────────────────

    /// Publish, blocking while the queue is full. Returns false only after
    /// shutdown.
    pub fn publish<M: TopicMessage>(&self, msg: M) -> bool {
        self.enqueue_blocking(msg.into_payload(), None)
    }

    /// Publish, blocking at most `timeout` for queue space. Returns false
    /// when the deadline passes without the item being enqueued.
    pub fn publish_timeout<M: TopicMessage>(&self, msg: M, timeout: Duration) -> bool {
        let payload = msg.into_payload();
        self.shared.store_latest(payload);
        let pushed = self
            .shared
            .queue
            .push_timeout(Item { payload, exclude: None }, timeout);
        if pushed {
            self.shared.enqueued.fetch_add(1, Ordering::AcqRel);
        }
        pushed
    }

    /// Publish without blocking. Returns false when the queue is full; the
    /// message is dropped (telemetry is allowed to be lossy).
    pub fn publish_async<M: TopicMessage>(&self, msg: M) -> bool {
        self.enqueue_async(msg.into_payload(), None)
    }

    /// Publish without blocking, skipping the publisher's own subscription
    /// during dispatch. This is the loop-avoidance hook for adapters that
    /// both subscribe to and forward a topic.
    pub fn publish_async_excluding<M: TopicMessage>(&self, msg: M, own: &Handle) -> bool {
        let payload = msg.into_payload();
        let exclude = (own.valid() && own.topic == payload.topic()).then_some((own.idx, own.generation));
        self.enqueue_async(payload, exclude)
    }

    /// Untyped [`EventBus::publish_async`] for callers that already hold a
    /// payload union (sensor readers, adapters).
    pub fn publish_async_payload(&self, payload: Payload) -> bool {
        self.enqueue_async(payload, None)
    }

    /// Untyped [`EventBus::publish_async_excluding`].
    pub fn publish_async_payload_excluding(&self, payload: Payload, own: &Handle) -> bool {
        let exclude = (own.valid() && own.topic == payload.topic()).then_some((own.idx, own.generation));
        self.enqueue_async(payload, exclude)
    }

    fn enqueue_blocking(&self, payload: Payload, exclude: Option<(usize, u64)>) -> bool {
        self.shared.store_latest(payload);
        let pushed = self.shared.queue.push(Item { payload, exclude });
        if pushed {
            self.shared.enqueued.fetch_add(1, Ordering::AcqRel);
        }
        pushed
    }

    fn enqueue_async(&self, payload: Payload, exclude: Option<(usize, u64)>) -> bool {
        self.shared.store_latest(payload);
        let pushed = self.shared.queue.try_push(Item { payload, exclude });
        if pushed {
            self.shared.enqueued.fetch_add(1, Ordering::AcqRel);
        } else {
            debug!("bus queue full, dropped {:?}", payload.topic());
        }
        pushed
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Copy of the last payload published on a topic, if any.
    pub fn peek(&self, topic: Topic) -> Option<Payload> {
        let state = &self.shared.topics[topic.index()];
        if !state.has_latest.load(Ordering::Acquire) {
            return None;
        }
        *state.latest.lock()
    }

    /// Typed [`EventBus::peek`].
    pub fn peek_msg<M: TopicMessage>(&self) -> Option<M> {
        self.peek(M::TOPIC)
            .and_then(|p| M::from_payload(&p).copied())
    }

    /// Like [`EventBus::peek`] but consumes the value: the next take/peek
    /// returns nothing until a fresh publish arrives.
    pub fn take_msg<M: TopicMessage>(&self) -> Option<M> {
        let state = &self.shared.topics[M::TOPIC.index()];
        if !state.has_latest.load(Ordering::Acquire) {
            return None;
        }
        state.has_latest.store(false, Ordering::Release);
        let payload = *state.latest.lock();
        payload.and_then(|p| M::from_payload(&p).copied())
    }

    /// True when at least one subscription slot on the topic is live.
    pub fn has_subscribers(&self, topic: Topic) -> bool {
        self.shared.topics[topic.index()]
            .sub_count
            .load(Ordering::Acquire)
            > 0
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Wait until every item enqueued so far has been dispatched.
    /// Returns false if the deadline passes first.
    pub fn flush(&self, timeout: Duration) -> bool {
        let target = self.shared.enqueued.load(Ordering::Acquire);
        let deadline = Instant::now() + timeout;
        while self.shared.processed.load(Ordering::Acquire) < target {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Close the data plane. Queued items still dispatch; subsequent
    /// publishes return false.
    pub fn close(&self) {
        self.shared.queue.close();
    }
}

impl Drop for BusShared {
    fn drop(&mut self) {
        self.queue.close();
    }
}

fn worker(queue: Arc<BoundedQueue<Item>>, shared: Weak<BusShared>) {
    while let Some(item) = queue.pop() {
        let Some(bus) = shared.upgrade() else { break };
        bus.dispatch(item);
        bus.processed.fetch_add(1, Ordering::AcqRel);
    }
    debug!("bus worker exiting");
}

// ─── Tests ──────────────────────────────────────────────────────────
