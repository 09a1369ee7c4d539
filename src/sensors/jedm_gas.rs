// JEDM digital gas concentration module
//
// Command-based I2C at 100 kHz max. 0xA1 returns the concentration as a
// big-endian u16; 0x32 followed by a u16 stores the zero point, after
// which the module should report zero.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x2A;

mod cmd {
    pub const READ: u8 = 0xA1;
    pub const CALIBRATE: u8 = 0x32;
}

pub struct JedmGas<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> JedmGas<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Raw concentration in module units.
    pub fn concentration(&mut self) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[cmd::READ], &mut buf)
            .map_err(Error::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Zero the module at `value`, or at the current reading when `None`.
    /// Returns whether the module reads zero afterwards.
    pub fn calibrate_zero(&mut self, value: Option<u16>) -> Result<bool, I2C::Error> {
        let value = match value {
            Some(v) => v,
            None => self.concentration()?,
        };
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[cmd::CALIBRATE, hi, lo])
            .map_err(Error::Bus)?;
        let after = self.concentration()?;
        if after != 0 {
            log::warn!("jedm: zero calibration at {} left reading {}", value, after);
        }
        Ok(after == 0)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}
