// RCWL-9623 ultrasonic rangefinder, GPIO (trig/echo) and I2C modes
//
// The transducer's usable range is 25..=700 cm; anything outside it is
// reported as `None` rather than a bogus distance.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const MIN_DISTANCE_CM: f32 = 25.0;
pub const MAX_DISTANCE_CM: f32 = 700.0;

pub const I2C_ADDRESS: u8 = 0x57;

// speed of sound, cm per µs
const SOUND_CM_PER_US: f32 = 0.0343;
// round trip at 700 cm is ~40.8 ms
const ECHO_TIMEOUT_US: u32 = 45_000;
const TRIGGER_US: u32 = 10;

const I2C_MEASURE: u8 = 0x01;
const I2C_CONVERSION_MS: u32 = 120;

fn in_range(cm: f32) -> Option<f32> {
    (MIN_DISTANCE_CM..=MAX_DISTANCE_CM).contains(&cm).then_some(cm)
}

/// Trig/echo wiring.
pub struct Rcwl9623Gpio<TRIG, ECHO> {
    trig: TRIG,
    echo: ECHO,
}

impl<TRIG: OutputPin, ECHO: InputPin> Rcwl9623Gpio<TRIG, ECHO> {
    pub fn new(mut trig: TRIG, echo: ECHO) -> Result<Self> {
        trig.set_low().map_err(Error::pin)?;
        Ok(Self { trig, echo })
    }

    /// Echo high time in µs for one ping.
    pub fn echo_us<D: DelayNs>(&mut self, delay: &mut D) -> Result<u32> {
        self.trig.set_high().map_err(Error::pin)?;
        delay.delay_us(TRIGGER_US);
        self.trig.set_low().map_err(Error::pin)?;

        let mut waited = 0u32;
        while !self.echo.is_high().map_err(Error::pin)? {
            if waited >= ECHO_TIMEOUT_US {
                return Err(Error::Timeout);
            }
            delay.delay_us(1);
            waited += 1;
        }

        let mut width = 0u32;
        while self.echo.is_high().map_err(Error::pin)? {
            if width >= ECHO_TIMEOUT_US {
                return Err(Error::Timeout);
            }
            delay.delay_us(1);
            width += 1;
        }
        Ok(width)
    }

    pub fn distance_cm<D: DelayNs>(&mut self, delay: &mut D) -> Result<Option<f32>> {
        let us = self.echo_us(delay)?;
        Ok(in_range(us as f32 * SOUND_CM_PER_US / 2.0))
    }

    pub fn release(self) -> (TRIG, ECHO) {
        (self.trig, self.echo)
    }
}

/// I2C mode (fixed address 0x57): trigger, wait, read a 24-bit distance
/// in micrometres.
pub struct Rcwl9623I2c<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Rcwl9623I2c<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn distance_cm<D: DelayNs>(&mut self, delay: &mut D) -> Result<Option<f32>, I2C::Error> {
        self.i2c
            .write(I2C_ADDRESS, &[I2C_MEASURE])
            .map_err(Error::Bus)?;
        delay.delay_ms(I2C_CONVERSION_MS);

        let mut buf = [0u8; 3];
        self.i2c.read(I2C_ADDRESS, &mut buf).map_err(Error::Bus)?;
        let um = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32;
        Ok(in_range(um as f32 / 10_000.0))
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}
