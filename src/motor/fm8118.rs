// FM8118 ultrasonic atomizer driver board
//
// The board's key input is active low. Pulling it low starts misting;
// stopping takes a release, a 100 ms low pulse, and a final release,
// because the board's key logic cycles through its modes on each press.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::{Error, Result};

const STOP_PULSE_MS: u32 = 100;

pub struct Fm8118<P> {
    pin: P,
    running: bool,
}

impl<P: OutputPin> Fm8118<P> {
    /// Releases the key line; the atomizer starts idle.
    pub fn new(mut pin: P) -> Result<Self> {
        pin.set_high().map_err(Error::pin)?;
        Ok(Self { pin, running: false })
    }

    pub fn on(&mut self) -> Result<()> {
        self.pin.set_low().map_err(Error::pin)?;
        self.running = true;
        Ok(())
    }

    pub fn off<D: DelayNs>(&mut self, delay: &mut D) -> Result<()> {
        self.pin.set_high().map_err(Error::pin)?;
        delay.delay_ms(STOP_PULSE_MS);
        self.pin.set_low().map_err(Error::pin)?;
        delay.delay_ms(STOP_PULSE_MS);
        self.pin.set_high().map_err(Error::pin)?;
        self.running = false;
        log::debug!("fm8118: stopped");
        Ok(())
    }

    pub fn toggle<D: DelayNs>(&mut self, delay: &mut D) -> Result<()> {
        if self.running { self.off(delay) } else { self.on() }
    }

    pub fn is_on(&self) -> bool {
        self.running
    }

    pub fn release(self) -> P {
        self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockPin};

    #[test]
    fn test_on_pulls_low() {
        let pin = MockPin::new();
        let mut mist = Fm8118::new(pin.clone()).unwrap();
        assert!(pin.level());
        mist.on().unwrap();
        assert!(!pin.level());
        assert!(mist.is_on());
    }

    #[test]
    fn test_off_sequence() {
        let pin = MockPin::new();
        let mut delay = MockDelay::new();
        let mut mist = Fm8118::new(pin.clone()).unwrap();
        mist.toggle(&mut delay).unwrap();
        pin.clear_history();

        mist.toggle(&mut delay).unwrap();
        assert_eq!(pin.history(), [true, false, true]);
        assert_eq!(delay.elapsed_ms(), 200);
        assert!(!mist.is_on());
    }
}
