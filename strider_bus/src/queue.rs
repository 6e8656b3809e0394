//! Bounded FIFO with blocking, timed and non-blocking producers.
//!
//! The queue carries the bus data plane. Producers choose their
//! backpressure behavior per call: block, block with a deadline, or fail
//! fast. The single consumer blocks until an item arrives or the queue is
//! closed and drained.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A bounded multi-producer FIFO with one blocking consumer.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Push, blocking while the queue is full. Returns false once the queue
    /// is closed.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return false;
            }
            if inner.items.len() < self.capacity {
                inner.items.push_back(item);
                self.not_empty.notify_one();
                return true;
            }
            self.not_full.wait(&mut inner);
        }
    }

    /// Push, blocking up to `timeout` for space. Returns false on timeout or
    /// close, with the item discarded and the queue untouched.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return false;
            }
            if inner.items.len() < self.capacity {
                inner.items.push_back(item);
                self.not_empty.notify_one();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let timed_out = self
                .not_full
                .wait_for(&mut inner, deadline - now)
                .timed_out();
            if timed_out && inner.items.len() >= self.capacity {
                return false;
            }
        }
    }

    /// Push without blocking. Returns false when full or closed.
    pub fn try_push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed || inner.items.len() >= self.capacity {
            return false;
        }
        inner.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Pop, blocking until an item arrives. Returns `None` once the queue is
    /// closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Close the queue. Pending items remain poppable; all blocked producers
    /// and the consumer wake up.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fifo_order() {
        let q = BoundedQueue::new(8);
        for i in 0..5 {
            assert!(q.try_push(i));
        }
        for i in 0..5 {
            assert_eq!(q.pop(), Some(i));
        }
    }

    #[test]
    fn try_push_fails_when_full() {
        let q = BoundedQueue::new(2);
        assert!(q.try_push(1));
        assert!(q.try_push(2));
        assert!(!q.try_push(3));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn push_timeout_expires_on_full_queue() {
        let q = BoundedQueue::new(1);
        assert!(q.push(1));
        let start = Instant::now();
        assert!(!q.push_timeout(2, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        // The queue is untouched by the failed push.
        assert_eq!(q.pop(), Some(1));
    }

    #[test]
    fn pop_blocks_until_item_arrives() {
        let q = Arc::new(BoundedQueue::new(4));
        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                q.push(42)
            })
        };
        assert_eq!(q.pop(), Some(42));
        assert!(producer.join().is_ok());
    }

    #[test]
    fn close_drains_then_returns_none() {
        let q = BoundedQueue::new(4);
        assert!(q.try_push(1));
        q.close();
        assert!(!q.push(2));
        assert!(!q.try_push(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn blocked_producer_wakes_on_pop() {
        let q = Arc::new(BoundedQueue::new(1));
        assert!(q.push(1));
        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || q.push(2))
        };
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(q.pop(), Some(1));
        assert!(producer.join().unwrap_or(false));
        assert_eq!(q.pop(), Some(2));
    }
}
