// Passive infrared motion sensor (HC-SR501 style). The module output goes
// high while motion is seen and holds for its own on-board delay.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use crate::error::{Error, Result};

pub const POLL_PERIOD_MS: u32 = 10;

pub struct PirSensor<P> {
    pin: P,
    last: Option<bool>,
}

impl<P: InputPin> PirSensor<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, last: None }
    }

    pub fn is_motion_detected(&mut self) -> Result<bool> {
        self.pin.is_high().map_err(Error::pin)
    }

    /// `Some(true)` when motion starts, `Some(false)` when it ends.
    pub fn poll(&mut self) -> Result<Option<bool>> {
        let level = self.is_motion_detected()?;
        if self.last == Some(level) {
            return Ok(None);
        }
        self.last = Some(level);
        if level {
            log::info!("PIR: motion");
        }
        Ok(Some(level))
    }

    /// Block until motion is seen. `None` waits forever; otherwise gives
    /// up after `timeout_ms` and returns false.
    pub fn wait_for_motion<D: DelayNs>(&mut self, delay: &mut D, timeout_ms: Option<u32>) -> Result<bool> {
        let mut waited = 0u32;
        loop {
            if self.is_motion_detected()? {
                return Ok(true);
            }
            if timeout_ms.is_some_and(|limit| waited >= limit) {
                return Ok(false);
            }
            delay.delay_ms(POLL_PERIOD_MS);
            waited = waited.saturating_add(POLL_PERIOD_MS);
        }
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
    fn test_poll_reports_start_and_end() {
        let pin = MockPin::low();
        let mut pir = PirSensor::new(pin.clone());
        assert_eq!(pir.poll().unwrap(), Some(false));
        pin.set_idle(true);
        assert_eq!(pir.poll().unwrap(), Some(true));
        assert_eq!(pir.poll().unwrap(), None);
        pin.set_idle(false);
        assert_eq!(pir.poll().unwrap(), Some(false));
    }

    #[test]
    fn test_wait_for_motion() {
        let pin = MockPin::low();
        pin.script(&[false, false, false, true]);
        let mut pir = PirSensor::new(pin);
        let mut delay = MockDelay::new();
        assert!(pir.wait_for_motion(&mut delay, Some(1000)).unwrap());
        assert_eq!(delay.elapsed_ms(), 30);
    }

    #[test]
    fn test_wait_gives_up() {
        let mut pir = PirSensor::new(MockPin::low());
        let mut delay = MockDelay::new();
        assert!(!pir.wait_for_motion(&mut delay, Some(50)).unwrap());
        assert_eq!(delay.elapsed_ms(), 50);
    }
}
