// DS3502 7-bit I2C digital potentiometer
//
// The wiper register is backed by EEPROM. In mode 0 every wiper write is
// also committed to EEPROM, which takes up to 100 ms; mode 1 writes only
// the volatile register.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS_MIN: u8 = 0x28;
pub const ADDRESS_MAX: u8 = 0x2B;
pub const WIPER_MAX: u8 = 127;

const EEPROM_SETTLE_MS: u32 = 100;

mod reg {
    pub const WIPER: u8 = 0x00;
    pub const CONTROL: u8 = 0x02;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WiperMode {
    /// Wiper writes go to EEPROM too
    #[default]
    Persistent = 0x00,
    /// Wiper writes stay in RAM
    Volatile = 0x80,
}

pub struct Ds3502<I2C> {
    i2c: I2C,
    address: u8,
    mode: WiperMode,
}

impl<I2C: I2c> Ds3502<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
            return Err(Error::InvalidArgument("DS3502 address must be 0x28..=0x2B"));
        }
        Ok(Self {
            i2c,
            address,
            mode: WiperMode::default(),
        })
    }

    pub fn write_wiper<D: DelayNs>(&mut self, value: u8, delay: &mut D) -> Result<(), I2C::Error> {
        if value > WIPER_MAX {
            return Err(Error::InvalidArgument("wiper must be 0..=127"));
        }
        self.i2c
            .write(self.address, &[reg::WIPER, value])
            .map_err(Error::Bus)?;
        if self.mode == WiperMode::Persistent {
            delay.delay_ms(EEPROM_SETTLE_MS);
        }
        Ok(())
    }

    pub fn read_wiper(&mut self) -> Result<u8, I2C::Error> {
        self.read_reg(reg::WIPER)
    }

    pub fn set_mode(&mut self, mode: WiperMode) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[reg::CONTROL, mode as u8])
            .map_err(Error::Bus)?;
        self.mode = mode;
        Ok(())
    }

    /// Read CR back and resync the cached mode from it.
    pub fn read_control_register(&mut self) -> Result<WiperMode, I2C::Error> {
        let cr = self.read_reg(reg::CONTROL)?;
        self.mode = if cr & 0x80 != 0 {
            WiperMode::Volatile
        } else {
            WiperMode::Persistent
        };
        Ok(self.mode)
    }

    pub fn mode(&self) -> WiperMode {
        self.mode
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }
}
