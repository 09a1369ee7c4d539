// PCF8575 16-bit quasi-bidirectional I/O expander
//
// The 16-bit sibling of the PCF8574: two bytes per transfer, port 0
// (P00..P07) first. Pins are numbered 0..=15 with P10 as pin 8. Inputs
// need their latch bit at 1.

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use crate::error::{Error, Result};

pub const ADDRESS_MIN: u8 = 0x20;
pub const ADDRESS_MAX: u8 = 0x27;

pub struct Pcf8575<I2C> {
    i2c: I2C,
    address: u8,
    latch: u16,
}

impl<I2C: I2c> Pcf8575<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
            return Err(Error::InvalidArgument("PCF8575 address must be 0x20..=0x27"));
        }
        Ok(Self {
            i2c,
            address,
            latch: 0xFFFF,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn check(&mut self) -> Result<(), I2C::Error> {
        let mut buf = [0u8; 2];
        match self.i2c.read(self.address, &mut buf) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => Err(Error::NotPresent),
            Err(e) => Err(Error::Bus(e)),
        }
    }

    pub fn port(&mut self) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn latch(&self) -> u16 {
        self.latch
    }

    pub fn set_port(&mut self, value: u16) -> Result<(), I2C::Error> {
        self.latch = value;
        self.flush()
    }

    pub fn pin(&mut self, pin: u8) -> Result<bool, I2C::Error> {
        let pin = validate_pin::<I2C::Error>(pin)?;
        Ok((self.port()? >> pin) & 1 != 0)
    }

    pub fn set_pin(&mut self, pin: u8, high: bool) -> Result<(), I2C::Error> {
        let pin = validate_pin::<I2C::Error>(pin)?;
        if high {
            self.latch |= 1 << pin;
        } else {
            self.latch &= !(1 << pin);
        }
        self.flush()
    }

    pub fn toggle(&mut self, pin: u8) -> Result<(), I2C::Error> {
        let pin = validate_pin::<I2C::Error>(pin)?;
        self.latch ^= 1 << pin;
        self.flush()
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn flush(&mut self) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &self.latch.to_le_bytes())
            .map_err(Error::Bus)
    }
}

fn validate_pin<E>(pin: u8) -> Result<u8, E> {
    if pin > 15 {
        return Err(Error::InvalidArgument("PCF8575 pin must be 0..=15"));
    }
    Ok(pin)
}
