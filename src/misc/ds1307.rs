// DS1307 I2C real-time clock
//
// Seven BCD time registers from 0x00. Bit 7 of the seconds register is
// CH (clock halt): while set the oscillator is stopped. The hours register
// is either 24-hour or 12-hour with bit 5 as PM. Day-of-week is stored
// 1..=7; this driver exposes it as 0..=6.

use embedded_hal::i2c::I2c;

use super::datetime::{DateTime, decode_hour};
use crate::bcd;
use crate::error::{Error, Result};

pub const ADDRESS: u8 = 0x68;

const CLOCK_HALT: u8 = 0x80;
const HOUR_12: u8 = 0x40;

mod reg {
    pub const SECONDS: u8 = 0x00;
}

pub struct Ds1307<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ds1307<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        if address > 0x7F {
            return Err(Error::InvalidArgument("I2C address must be 7-bit"));
        }
        Ok(Self { i2c, address })
    }

    pub fn datetime(&mut self) -> Result<DateTime, I2C::Error> {
        let mut buf = [0u8; 7];
        self.i2c
            .write_read(self.address, &[reg::SECONDS], &mut buf)
            .map_err(Error::Bus)?;
        Ok(DateTime {
            year: 2000 + bcd::to_decimal(buf[6]) as u16,
            month: bcd::to_decimal(buf[5] & 0x1F),
            day: bcd::to_decimal(buf[4] & 0x3F),
            weekday: (buf[3] & 0x07).saturating_sub(1),
            hour: decode_hour(buf[2], HOUR_12),
            minute: bcd::to_decimal(buf[1] & 0x7F),
            second: bcd::to_decimal(buf[0] & !CLOCK_HALT),
        })
    }

    /// Write the time in 24-hour format. Clears CH, so the clock runs.
    pub fn set_datetime(&mut self, dt: &DateTime) -> Result<(), I2C::Error> {
        dt.validate::<I2C::Error>()?;
        let frame = [
            reg::SECONDS,
            bcd::from_decimal(dt.second),
            bcd::from_decimal(dt.minute),
            bcd::from_decimal(dt.hour),
            dt.weekday + 1,
            bcd::from_decimal(dt.day),
            bcd::from_decimal(dt.month),
            bcd::from_decimal((dt.year % 100) as u8),
        ];
        self.i2c.write(self.address, &frame).map_err(Error::Bus)
    }

    pub fn oscillator_disabled(&mut self) -> Result<bool, I2C::Error> {
        Ok(self.read_seconds()? & CLOCK_HALT != 0)
    }

    /// Set or clear CH, keeping the seconds count.
    pub fn set_oscillator_disabled(&mut self, disabled: bool) -> Result<(), I2C::Error> {
        let mut sec = self.read_seconds()? & !CLOCK_HALT;
        if disabled {
            sec |= CLOCK_HALT;
        }
        self.i2c
            .write(self.address, &[reg::SECONDS, sec])
            .map_err(Error::Bus)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_seconds(&mut self) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg::SECONDS], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockI2c;

    fn rtc() -> (Ds1307<MockI2c>, MockI2c) {
        let bus = MockI2c::new();
        (Ds1307::new(bus.clone(), ADDRESS).unwrap(), bus)
    }

    #[test]
    fn test_set_then_read() {
        let (mut rtc, bus) = rtc();
        let dt = DateTime {
            year: 2024,
            month: 12,
            day: 31,
            weekday: 1,
            hour: 23,
            minute: 59,
            second: 58,
        };
        rtc.set_datetime(&dt).unwrap();
        assert_eq!(bus.regs(0, 7), [0x58, 0x59, 0x23, 0x02, 0x31, 0x12, 0x24]);
        assert_eq!(rtc.datetime().unwrap(), dt);
    }

    #[test]
    fn test_reads_twelve_hour_register() {
        let (mut rtc, bus) = rtc();
        // 3 PM in 12-hour mode, 2031-07-04
        bus.set_regs(0, &[0x05, 0x30, HOUR_12 | 0x20 | 0x03, 0x01, 0x04, 0x07, 0x31]);
        let dt = rtc.datetime().unwrap();
        assert_eq!((dt.hour, dt.minute, dt.second), (15, 30, 5));
        assert_eq!((dt.year, dt.month, dt.day, dt.weekday), (2031, 7, 4, 0));
    }

    #[test]
    fn test_clock_halt_bit() {
        let (mut rtc, bus) = rtc();
        bus.set_regs(0, &[0x42]);
        rtc.set_oscillator_disabled(true).unwrap();
        assert_eq!(bus.reg(0), 0xC2);
        assert!(rtc.oscillator_disabled().unwrap());
        assert_eq!(rtc.datetime().unwrap().second, 42);
        rtc.set_oscillator_disabled(false).unwrap();
        assert_eq!(bus.reg(0), 0x42);
    }

    #[test]
    fn test_invalid_datetime_rejected() {
        let (mut rtc, bus) = rtc();
        let dt = DateTime {
            year: 2024,
            month: 2,
            day: 1,
            weekday: 7,
            ..DateTime::default()
        };
        assert!(rtc.set_datetime(&dt).is_err());
        assert!(bus.written().is_empty());
    }
}
