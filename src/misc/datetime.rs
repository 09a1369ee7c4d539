// Calendar time as the RTC drivers exchange it.

use crate::bcd;
use crate::error::Error;

/// Wall-clock time, 24-hour. `weekday` is 0..=6 with the RTC's own
/// convention for which day is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Range check against what a two-digit-year RTC can hold.
    pub fn validate<E>(&self) -> Result<(), Error<E>> {
        if !(2000..=2099).contains(&self.year) {
            return Err(Error::InvalidArgument("year must be 2000..=2099"));
        }
        if !(1..=12).contains(&self.month) {
            return Err(Error::InvalidArgument("month must be 1..=12"));
        }
        if !(1..=31).contains(&self.day) {
            return Err(Error::InvalidArgument("day must be 1..=31"));
        }
        if self.weekday > 6 {
            return Err(Error::InvalidArgument("weekday must be 0..=6"));
        }
        if self.hour > 23 || self.minute > 59 || self.second > 59 {
            return Err(Error::InvalidArgument("time of day out of range"));
        }
        Ok(())
    }
}

/// Hours register to 0..=23. `twelve_hour` is the chip's 12/24 select bit;
/// in 12-hour mode bit 5 is PM.
pub(crate) fn decode_hour(raw: u8, twelve_hour: u8) -> u8 {
    if raw & twelve_hour == 0 {
        return bcd::to_decimal(raw & 0x3F);
    }
    // 12 AM is midnight, 12 PM is noon
    let h = bcd::to_decimal(raw & 0x1F) % 12;
    if raw & 0x20 != 0 { h + 12 } else { h }
}
