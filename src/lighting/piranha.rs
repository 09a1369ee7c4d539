// Piranha LED on a plain GPIO
//
// Common-cathode modules light when the pin is high, common-anode ones
// when it is low. `is_on` reads the driven level back.

use embedded_hal::digital::{PinState, StatefulOutputPin};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Cathode,
    Anode,
}

impl Polarity {
    fn level(self, on: bool) -> PinState {
        match self {
            Polarity::Cathode => PinState::from(on),
            Polarity::Anode => PinState::from(!on),
        }
    }
}

pub struct PiranhaLed<P> {
    pin: P,
    polarity: Polarity,
}

impl<P: StatefulOutputPin> PiranhaLed<P> {
    pub fn new(pin: P, polarity: Polarity) -> Self {
        Self { pin, polarity }
    }

    pub fn on(&mut self) -> Result<()> {
        self.pin
            .set_state(self.polarity.level(true))
            .map_err(Error::pin)
    }

    pub fn off(&mut self) -> Result<()> {
        self.pin
            .set_state(self.polarity.level(false))
            .map_err(Error::pin)
    }

    pub fn toggle(&mut self) -> Result<()> {
        self.pin.toggle().map_err(Error::pin)
    }

    pub fn is_on(&mut self) -> Result<bool> {
        let high = self.pin.is_set_high().map_err(Error::pin)?;
        Ok(PinState::from(high) == self.polarity.level(true))
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn release(self) -> P {
        self.pin
    }
}
