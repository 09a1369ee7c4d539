// DS1302 trickle-charge RTC on a three-wire serial link
//
// CE frames each transfer. Bytes go LSB first, sampled on the rising
// edge of SCLK; after a read command the chip drives DIO from the
// falling edge of the eighth clock, so DIO must be an open-drain pin
// that can be released and read back. Writes are bracketed by clearing
// and setting the write-protect bit. 31 bytes of battery-backed RAM.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use super::datetime::{DateTime, decode_hour};
use crate::bcd;
use crate::error::{Error, Result};

pub const RAM_SIZE: u8 = 31;

const CLOCK_HALT: u8 = 0x80;
const HOUR_12: u8 = 0x80;
const WRITE_PROTECT: u8 = 0x80;

// write addresses; the read address is one higher
mod reg {
    pub const SECOND: u8 = 0x80;
    pub const MINUTE: u8 = 0x82;
    pub const HOUR: u8 = 0x84;
    pub const DAY: u8 = 0x86;
    pub const MONTH: u8 = 0x88;
    pub const WEEKDAY: u8 = 0x8A;
    pub const YEAR: u8 = 0x8C;
    pub const WP: u8 = 0x8E;
    pub const RAM: u8 = 0xC0;
}

pub struct Ds1302<CLK, DIO, CS, D> {
    clk: CLK,
    dio: DIO,
    cs: CS,
    delay: D,
}

impl<CLK, DIO, CS, D> Ds1302<CLK, DIO, CS, D>
where
    CLK: OutputPin,
    DIO: InputPin + OutputPin,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(mut clk: CLK, dio: DIO, mut cs: CS, delay: D) -> Result<Self> {
        clk.set_low().map_err(Error::pin)?;
        cs.set_low().map_err(Error::pin)?;
        Ok(Self { clk, dio, cs, delay })
    }

    /// Clear CH so the oscillator runs.
    pub fn start(&mut self) -> Result<()> {
        let sec = self.get_reg(reg::SECOND)?;
        self.write(reg::SECOND, sec & !CLOCK_HALT)
    }

    /// Set CH; the time stops advancing.
    pub fn stop(&mut self) -> Result<()> {
        let sec = self.get_reg(reg::SECOND)?;
        self.write(reg::SECOND, sec | CLOCK_HALT)
    }

    pub fn is_running(&mut self) -> Result<bool> {
        Ok(self.get_reg(reg::SECOND)? & CLOCK_HALT == 0)
    }

    pub fn second(&mut self) -> Result<u8> {
        Ok(bcd::to_decimal(self.get_reg(reg::SECOND)? & !CLOCK_HALT))
    }

    /// Writing seconds also clears CH.
    pub fn set_second(&mut self, second: u8) -> Result<()> {
        check(second, 59, "second must be 0..=59")?;
        self.write(reg::SECOND, bcd::from_decimal(second))
    }

    pub fn minute(&mut self) -> Result<u8> {
        Ok(bcd::to_decimal(self.get_reg(reg::MINUTE)? & 0x7F))
    }

    pub fn set_minute(&mut self, minute: u8) -> Result<()> {
        check(minute, 59, "minute must be 0..=59")?;
        self.write(reg::MINUTE, bcd::from_decimal(minute))
    }

    pub fn hour(&mut self) -> Result<u8> {
        Ok(decode_hour(self.get_reg(reg::HOUR)?, HOUR_12))
    }

    /// Always written in 24-hour mode.
    pub fn set_hour(&mut self, hour: u8) -> Result<()> {
        check(hour, 23, "hour must be 0..=23")?;
        self.write(reg::HOUR, bcd::from_decimal(hour))
    }

    /// 0..=6
    pub fn weekday(&mut self) -> Result<u8> {
        Ok((self.get_reg(reg::WEEKDAY)? & 0x07).saturating_sub(1))
    }

    pub fn set_weekday(&mut self, weekday: u8) -> Result<()> {
        check(weekday, 6, "weekday must be 0..=6")?;
        self.write(reg::WEEKDAY, weekday + 1)
    }

    pub fn day(&mut self) -> Result<u8> {
        Ok(bcd::to_decimal(self.get_reg(reg::DAY)? & 0x3F))
    }

    pub fn set_day(&mut self, day: u8) -> Result<()> {
        if day == 0 {
            return Err(Error::InvalidArgument("day must be 1..=31"));
        }
        check(day, 31, "day must be 1..=31")?;
        self.write(reg::DAY, bcd::from_decimal(day))
    }

    pub fn month(&mut self) -> Result<u8> {
        Ok(bcd::to_decimal(self.get_reg(reg::MONTH)? & 0x1F))
    }

    pub fn set_month(&mut self, month: u8) -> Result<()> {
        if month == 0 {
            return Err(Error::InvalidArgument("month must be 1..=12"));
        }
        check(month, 12, "month must be 1..=12")?;
        self.write(reg::MONTH, bcd::from_decimal(month))
    }

    pub fn year(&mut self) -> Result<u16> {
        Ok(2000 + bcd::to_decimal(self.get_reg(reg::YEAR)?) as u16)
    }

    pub fn set_year(&mut self, year: u16) -> Result<()> {
        if !(2000..=2099).contains(&year) {
            return Err(Error::InvalidArgument("year must be 2000..=2099"));
        }
        self.write(reg::YEAR, bcd::from_decimal((year % 100) as u8))
    }

    pub fn datetime(&mut self) -> Result<DateTime> {
        Ok(DateTime {
            year: self.year()?,
            month: self.month()?,
            day: self.day()?,
            weekday: self.weekday()?,
            hour: self.hour()?,
            minute: self.minute()?,
            second: self.second()?,
        })
    }

    pub fn set_datetime(&mut self, dt: &DateTime) -> Result<()> {
        dt.validate::<()>()?;
        self.set_year(dt.year)?;
        self.set_month(dt.month)?;
        self.set_day(dt.day)?;
        self.set_weekday(dt.weekday)?;
        self.set_hour(dt.hour)?;
        self.set_minute(dt.minute)?;
        self.set_second(dt.second)
    }

    pub fn ram(&mut self, index: u8) -> Result<u8> {
        check(index, RAM_SIZE - 1, "RAM index must be 0..=30")?;
        self.get_reg(reg::RAM + index * 2)
    }

    pub fn set_ram(&mut self, index: u8, value: u8) -> Result<()> {
        check(index, RAM_SIZE - 1, "RAM index must be 0..=30")?;
        self.write(reg::RAM + index * 2, value)
    }

    pub fn release(self) -> (CLK, DIO, CS) {
        (self.clk, self.dio, self.cs)
    }

    // ── wire protocol ───────────────────────────────────────────────

    fn write(&mut self, reg: u8, value: u8) -> Result<()> {
        self.set_reg(reg::WP, 0)?;
        self.set_reg(reg, value)?;
        self.set_reg(reg::WP, WRITE_PROTECT)
    }

    fn set_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        self.begin()?;
        self.write_byte(reg)?;
        self.write_byte(value)?;
        self.end()
    }

    fn get_reg(&mut self, reg: u8) -> Result<u8> {
        self.begin()?;
        self.write_byte(reg | 1)?;
        let value = self.read_byte()?;
        self.end()?;
        Ok(value)
    }

    fn begin(&mut self) -> Result<()> {
        self.clk.set_low().map_err(Error::pin)?;
        self.cs.set_high().map_err(Error::pin)?;
        self.delay.delay_us(4);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.clk.set_low().map_err(Error::pin)?;
        self.cs.set_low().map_err(Error::pin)?;
        self.delay.delay_us(4);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        for i in 0..8 {
            self.dio
                .set_state(PinState::from(byte >> i & 1 != 0))
                .map_err(Error::pin)?;
            self.clock()?;
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        // release the line to the chip
        self.dio.set_high().map_err(Error::pin)?;
        let mut byte = 0;
        for i in 0..8 {
            if self.dio.is_high().map_err(Error::pin)? {
                byte |= 1 << i;
            }
            self.clock()?;
        }
        Ok(byte)
    }

    fn clock(&mut self) -> Result<()> {
        self.clk.set_high().map_err(Error::pin)?;
        self.delay.delay_us(1);
        self.clk.set_low().map_err(Error::pin)?;
        self.delay.delay_us(1);
        Ok(())
    }
}

fn check(value: u8, max: u8, msg: &'static str) -> Result<()> {
    if value > max {
        return Err(Error::InvalidArgument(msg));
    }
    Ok(())
}
