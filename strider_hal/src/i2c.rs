//! Process-wide shared I²C bus.
//!
//! All sensor drivers and the PWM driver talk to one physical bus. The
//! shared handle serializes transactions behind a single mutex held only
//! for the duration of one transfer (microseconds to a few milliseconds),
//! which is the whole concurrency story for I²C in this system.

use std::sync::Arc;

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};
use parking_lot::Mutex;

/// Cloneable handle to a mutex-guarded I²C peripheral. Each clone can be
/// handed to a different driver; every transaction takes the bus lock.
pub struct SharedI2c<I> {
    inner: Arc<Mutex<I>>,
}

impl<I> SharedI2c<I> {
    /// Wrap a raw bus peripheral.
    pub fn new(bus: I) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }
}

impl<I> Clone for SharedI2c<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: ErrorType> ErrorType for SharedI2c<I> {
    type Error = I::Error;
}

impl<I: I2c<SevenBitAddress>> I2c<SevenBitAddress> for SharedI2c<I> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.inner.lock().transaction(address, operations)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pca9685::testutil::MockI2c;

    #[test]
    fn clones_share_one_device() {
        let mock = MockI2c::default();
        let writes = mock.writes();
        let mut a = SharedI2c::new(mock);
        let mut b = a.clone();

        a.write(0x40, &[1, 2]).expect("write");
        b.write(0x41, &[3]).expect("write");

        let log = writes.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (0x40, vec![1, 2]));
        assert_eq!(log[1], (0x41, vec![3]));
    }
}
