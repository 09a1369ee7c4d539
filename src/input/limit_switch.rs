// Mechanical limit switch on a pull-up input.
// `read` is the raw level (true = open); `poll` reports only changes, and
// the caller's poll period doubles as the debounce window.

use embedded_hal::digital::InputPin;

use crate::error::{Error, Result};

pub struct LimitSwitch<P> {
    pin: P,
    last: bool,
}

impl<P: InputPin> LimitSwitch<P> {
    pub fn new(mut pin: P) -> Result<Self> {
        let last = pin.is_high().map_err(Error::pin)?;
        Ok(Self { pin, last })
    }

    pub fn read(&mut self) -> Result<bool> {
        self.pin.is_high().map_err(Error::pin)
    }

    pub fn poll(&mut self) -> Result<Option<bool>> {
        let level = self.read()?;
        if level == self.last {
            return Ok(None);
        }
        self.last = level;
        log::debug!("limit switch -> {}", if level { "open" } else { "closed" });
        Ok(Some(level))
    }

    pub fn release(self) -> P {
        self.pin
    }
}
