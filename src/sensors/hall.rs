// OH34N unipolar Hall switch. Open-collector output: pulled low while a
// south pole is close enough, released otherwise. Field events are only
// reported while the sensor is enabled.

use embedded_hal::digital::InputPin;

use crate::error::{Error, Result};

pub struct HallSensor<P> {
    pin: P,
    enabled: bool,
    last: Option<bool>,
}

impl<P: InputPin> HallSensor<P> {
    /// Starts disabled.
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            enabled: false,
            last: None,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.last = None;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Raw output level; low means a magnet is present.
    pub fn read(&mut self) -> Result<bool> {
        self.pin.is_high().map_err(Error::pin)
    }

    pub fn is_magnet_detected(&mut self) -> Result<bool> {
        self.pin.is_low().map_err(Error::pin)
    }

    /// Field presence if it changed since the last poll; always `None`
    /// while disabled. The first poll after `enable` reports.
    pub fn poll(&mut self) -> Result<Option<bool>> {
        if !self.enabled {
            return Ok(None);
        }
        let present = self.is_magnet_detected()?;
        if self.last == Some(present) {
            return Ok(None);
        }
        self.last = Some(present);
        Ok(Some(present))
    }

    pub fn release(self) -> P {
        self.pin
    }
}
