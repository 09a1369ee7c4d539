// PCF8574 8-bit quasi-bidirectional I/O expander
//
// No registers: one byte written sets the port latch, one byte read
// returns the pin levels. A pin works as an input only while its latch
// bit is 1 (weak pull-up), so `set_pin(n, true)` before reading it.

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use crate::error::{Error, Result};

pub const ADDRESS_MIN: u8 = 0x20;
pub const ADDRESS_MAX: u8 = 0x27;

pub struct Pcf8574<I2C> {
    i2c: I2C,
    address: u8,
    latch: u8,
}

impl<I2C: I2c> Pcf8574<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
            return Err(Error::InvalidArgument("PCF8574 address must be 0x20..=0x27"));
        }
        Ok(Self {
            i2c,
            address,
            latch: 0xFF,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// One-byte read to confirm the part answers. Only a NACK means the
    /// device is absent; any other failure is a bus fault.
    pub fn check(&mut self) -> Result<(), I2C::Error> {
        let mut buf = [0u8; 1];
        match self.i2c.read(self.address, &mut buf) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => {
                log::warn!("PCF8574 not found at {:#04x}", self.address);
                Err(Error::NotPresent)
            }
            Err(e) => Err(Error::Bus(e)),
        }
    }

    /// Current pin levels.
    pub fn port(&mut self) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        Ok(buf[0])
    }

    /// Last value written to the latch.
    pub fn latch(&self) -> u8 {
        self.latch
    }

    pub fn set_port(&mut self, value: u8) -> Result<(), I2C::Error> {
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
            .write(self.address, &[self.latch])
            .map_err(Error::Bus)
    }
}

fn validate_pin<E>(pin: u8) -> Result<u8, E> {
    if pin > 7 {
        return Err(Error::InvalidArgument("PCF8574 pin must be 0..=7"));
    }
    Ok(pin)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::MockI2c;
    use std::vec;

    #[test]
    fn test_rejects_out_of_range_address() {
        assert!(matches!(
            Pcf8574::new(MockI2c::raw(), 0x40),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pin_ops_update_latch() {
        let bus = MockI2c::raw();
        let mut pcf = Pcf8574::new(bus.clone(), 0x20).unwrap();

        pcf.set_port(0x00).unwrap();
        pcf.set_pin(3, true).unwrap();
        pcf.toggle(0).unwrap();
        pcf.toggle(3).unwrap();

        assert_eq!(
            bus.written(),
            [vec![0x00], vec![0x08], vec![0x09], vec![0x01]]
        );
        assert_eq!(pcf.latch(), 0x01);
        assert!(matches!(pcf.set_pin(8, true), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_read_pin_levels() {
        let bus = MockI2c::raw();
        let mut pcf = Pcf8574::new(bus.clone(), 0x21).unwrap();
        bus.queue_read(&[0b1010_0000]);
        assert!(pcf.pin(7).unwrap());
        bus.queue_read(&[0b1010_0000]);
        assert!(!pcf.pin(6).unwrap());
    }

    #[test]
    fn test_check_maps_nack() {
        let bus = MockI2c::raw();
        bus.only_address(0x22);
        let mut pcf = Pcf8574::new(bus, 0x20).unwrap();
        assert_eq!(pcf.check(), Err(Error::NotPresent));
    }

    #[test]
    fn test_check_keeps_bus_faults() {
        let bus = MockI2c::raw();
        let mut pcf = Pcf8574::new(bus.clone(), 0x20).unwrap();
        assert_eq!(pcf.check(), Ok(()));
        bus.set_fail(true);
        assert_eq!(pcf.check(), Err(Error::Bus(ErrorKind::Bus)));
    }
}
