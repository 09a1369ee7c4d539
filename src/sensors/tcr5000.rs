// TCR5000 reflective IR line tracker. Digital output, high over a dark line.

use embedded_hal::digital::InputPin;

use crate::error::{Error, Result};

pub struct Tcr5000<P> {
    pin: P,
    last: Option<bool>,
}

impl<P: InputPin> Tcr5000<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, last: None }
    }

    pub fn read(&mut self) -> Result<bool> {
        self.pin.is_high().map_err(Error::pin)
    }

    /// New level if it changed since the previous poll. The first poll
    /// always reports.
    pub fn poll(&mut self) -> Result<Option<bool>> {
        let level = self.read()?;
        if self.last == Some(level) {
            return Ok(None);
        }
        self.last = Some(level);
        Ok(Some(level))
    }

    pub fn release(self) -> P {
        self.pin
    }
}
