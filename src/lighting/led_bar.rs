// Eight-LED bar graph behind a PCF8574
//
// LED n follows port bit n; a set bit lights the LED.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};
use crate::input::Pcf8574;

pub const LED_COUNT: u8 = 8;

pub struct LedBar<I2C> {
    pcf: Pcf8574<I2C>,
}

impl<I2C: I2c> LedBar<I2C> {
    /// Takes the expander and switches every LED off.
    pub fn new(pcf: Pcf8574<I2C>) -> Result<Self, I2C::Error> {
        let mut bar = Self { pcf };
        bar.clear()?;
        Ok(bar)
    }

    pub fn set_led(&mut self, index: u8, on: bool) -> Result<(), I2C::Error> {
        if index >= LED_COUNT {
            return Err(Error::InvalidArgument("LED index must be 0..=7"));
        }
        self.pcf.set_pin(index, on)
    }

    pub fn set_all(&mut self, mask: u8) -> Result<(), I2C::Error> {
        self.pcf.set_port(mask)
    }

    /// Light the lowest `level` LEDs, 0..=8.
    pub fn display_level(&mut self, level: u8) -> Result<(), I2C::Error> {
        if level > LED_COUNT {
            return Err(Error::InvalidArgument("level must be 0..=8"));
        }
        let mask = ((1u16 << level) - 1) as u8;
        self.set_all(mask)
    }

    pub fn clear(&mut self) -> Result<(), I2C::Error> {
        self.set_all(0x00)
    }

    pub fn mask(&self) -> u8 {
        self.pcf.latch()
    }

    pub fn release(self) -> Pcf8574<I2C> {
        self.pcf
    }
}
