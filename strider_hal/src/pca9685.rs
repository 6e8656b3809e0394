//! PCA9685 16-channel PWM controller over embedded-hal I²C.
//!
//! Only the subset of the register protocol this robot needs: reset,
//! sleep/wake, prescaler setup for 50 Hz servo pulses, single-channel
//! writes and the auto-increment batched write that updates all twelve
//! servo channels in one transaction.

use std::time::Duration;

use embedded_hal::i2c::{I2c, SevenBitAddress};

use strider_common::consts::NUM_SERVOS;

use crate::error::HalError;
use crate::pwm::PwmBackend;

/// Default device address.
pub const DEFAULT_ADDR: u8 = 0x40;

const REG_MODE1: u8 = 0x00;
const REG_PRESCALE: u8 = 0xFE;
const REG_LED0_ON_L: u8 = 0x06;

const MODE1_RESTART: u8 = 0x80;
const MODE1_AI: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

const FULL_ON_BIT: u8 = 0x10;
const FULL_OFF_BIT: u8 = 0x10;

/// PCA9685 driver. Generic over the bus so it runs against the shared
/// hardware bus or a mock alike.
pub struct Pca9685<I> {
    i2c: I,
    addr: u8,
    osc_freq: f32,
}

impl<I: I2c<SevenBitAddress>> Pca9685<I> {
    /// Create an uninitialized driver on the given address.
    pub fn new(i2c: I, addr: u8) -> Self {
        Self {
            i2c,
            addr,
            osc_freq: 25_000_000.0,
        }
    }

    /// Reset, program the oscillator and the 50 Hz servo prescaler, then
    /// leave the device asleep until the controller activates.
    pub fn begin(&mut self, osc_freq: u32, pwm_freq: f32) -> Result<(), HalError> {
        self.reset()?;
        self.osc_freq = osc_freq as f32;
        self.set_pwm_freq(pwm_freq)?;
        self.sleep_device()?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), HalError> {
        self.write_reg(REG_MODE1, &[MODE1_RESTART])?;
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    }

    fn sleep_device(&mut self) -> Result<(), HalError> {
        let mode = self.read_mode1()?;
        self.write_reg(REG_MODE1, &[(mode & !MODE1_RESTART) | MODE1_SLEEP])?;
        std::thread::sleep(Duration::from_millis(5));
        Ok(())
    }

    fn wake_device(&mut self) -> Result<(), HalError> {
        let mode = self.read_mode1()?;
        let awake = mode & !MODE1_SLEEP;
        self.write_reg(REG_MODE1, &[awake])?;
        std::thread::sleep(Duration::from_millis(5));
        self.write_reg(REG_MODE1, &[awake | MODE1_RESTART])?;
        Ok(())
    }

    fn set_pwm_freq(&mut self, freq: f32) -> Result<(), HalError> {
        let freq = freq.clamp(1.0, 3500.0);
        let prescale = ((self.osc_freq / (freq * 4096.0) + 0.5) - 1.0).clamp(3.0, 255.0) as u8;

        let old_mode = self.read_mode1()?;
        self.write_reg(REG_MODE1, &[(old_mode & !MODE1_RESTART) | MODE1_SLEEP])?;
        self.write_reg(REG_PRESCALE, &[prescale])?;
        self.write_reg(REG_MODE1, &[old_mode])?;
        std::thread::sleep(Duration::from_millis(5));
        self.write_reg(REG_MODE1, &[old_mode | MODE1_RESTART | MODE1_AI])?;
        Ok(())
    }

    fn write_reg(&mut self, reg: u8, data: &[u8]) -> Result<(), HalError> {
        let mut buf = [0u8; 1 + 4 * NUM_SERVOS];
        buf[0] = reg;
        buf[1..1 + data.len()].copy_from_slice(data);
        self.i2c
            .write(self.addr, &buf[..1 + data.len()])
            .map_err(HalError::from_i2c)
    }

    fn read_mode1(&mut self) -> Result<u8, HalError> {
        let mut value = [0u8];
        self.i2c
            .write_read(self.addr, &[REG_MODE1], &mut value)
            .map_err(HalError::from_i2c)?;
        Ok(value[0])
    }

    /// Encode one channel value into the 4-byte ON/OFF register layout,
    /// with the full-on / full-off special encodings.
    fn encode(value: u16, out: &mut [u8]) {
        let value = value.min(4095);
        out[0] = 0;
        if value == 0 {
            out[1] = 0;
            out[2] = 0;
            out[3] = FULL_OFF_BIT;
        } else if value == 4095 {
            out[1] = FULL_ON_BIT;
            out[2] = 0;
            out[3] = 0;
        } else {
            out[1] = 0;
            out[2] = (value & 0xFF) as u8;
            out[3] = (value >> 8) as u8;
        }
    }
}

impl<I: I2c<SevenBitAddress> + Send> PwmBackend for Pca9685<I> {
    fn wake(&mut self) -> Result<(), HalError> {
        self.wake_device()
    }

    fn sleep(&mut self) -> Result<(), HalError> {
        self.sleep_device()
    }

    fn write_channel(&mut self, channel: usize, value: u16) -> Result<(), HalError> {
        if channel >= 16 {
            return Err(HalError::InvalidChannel(channel));
        }
        let mut buf = [0u8; 4];
        Self::encode(value, &mut buf);
        self.write_reg(REG_LED0_ON_L + 4 * channel as u8, &buf)
    }

    fn write_all(&mut self, values: &[u16; NUM_SERVOS]) -> Result<(), HalError> {
        let mut buf = [0u8; 4 * NUM_SERVOS];
        for (i, value) in values.iter().enumerate() {
            Self::encode(*value, &mut buf[i * 4..i * 4 + 4]);
        }
        self.write_reg(REG_LED0_ON_L, &buf)
    }
}

// ─── Test Support ───────────────────────────────────────────────────


// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::testutil::MockI2c;
    use super::*;

    #[test]
    fn batched_write_is_one_transaction() {
        let mock = MockI2c::default();
        let writes = mock.writes();
        let mut pca = Pca9685::new(mock, DEFAULT_ADDR);

        let values = [306u16; NUM_SERVOS];
        pca.write_all(&values).expect("write all");

        let log = writes.lock();
        assert_eq!(log.len(), 1);
        let (addr, bytes) = &log[0];
        assert_eq!(*addr, DEFAULT_ADDR);
        assert_eq!(bytes.len(), 1 + 4 * NUM_SERVOS);
        assert_eq!(bytes[0], REG_LED0_ON_L);
        // 306 = 0x132: OFF_L 0x32, OFF_H 0x01 for every channel.
        assert_eq!(&bytes[1..5], &[0, 0, 0x32, 0x01]);
    }

    #[test]
    fn full_on_and_full_off_use_special_encodings() {
        let mut zero = [0u8; 4];
        Pca9685::<MockI2c>::encode(0, &mut zero);
        assert_eq!(zero, [0, 0, 0, FULL_OFF_BIT]);

        let mut full = [0u8; 4];
        Pca9685::<MockI2c>::encode(4095, &mut full);
        assert_eq!(full, [0, FULL_ON_BIT, 0, 0]);

        let mut clamped = [0u8; 4];
        Pca9685::<MockI2c>::encode(9000, &mut clamped);
        assert_eq!(clamped, full);
    }

    #[test]
    fn channel_write_targets_the_right_registers() {
        let mock = MockI2c::default();
        let writes = mock.writes();
        let mut pca = Pca9685::new(mock, DEFAULT_ADDR);

        pca.write_channel(2, 400).expect("write");
        let log = writes.lock();
        assert_eq!(log[0].1[0], REG_LED0_ON_L + 8);

        assert!(matches!(
            pca.write_channel(16, 400),
            Err(HalError::InvalidChannel(16))
        ));
    }
}
