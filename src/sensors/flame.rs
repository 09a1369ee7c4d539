// Flame sensor module: IR photodiode with analog output and a comparator
// output (high while a flame is seen).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use crate::analog::{AdcChannel, DEFAULT_VREF, raw_to_voltage};
use crate::error::{Error, Result};

pub const POLL_PERIOD_MS: u32 = 50;

pub struct FlameSensor<A, D> {
    adc: A,
    digital: D,
    last: Option<bool>,
}

impl<A: AdcChannel, D: InputPin> FlameSensor<A, D> {
    pub fn new(adc: A, digital: D) -> Self {
        Self {
            adc,
            digital,
            last: None,
        }
    }

    pub fn is_flame_detected(&mut self) -> Result<bool, A::Error> {
        self.digital.is_high().map_err(Error::pin)
    }

    pub fn analog_value(&mut self) -> Result<u16, A::Error> {
        self.adc.read_u16().map_err(Error::Bus)
    }

    pub fn voltage(&mut self) -> Result<f32, A::Error> {
        Ok(raw_to_voltage(self.analog_value()?, DEFAULT_VREF))
    }

    /// Comparator level if it changed since the previous poll.
    pub fn poll(&mut self) -> Result<Option<bool>, A::Error> {
        let level = self.is_flame_detected()?;
        if self.last == Some(level) {
            return Ok(None);
        }
        self.last = Some(level);
        Ok(Some(level))
    }

    /// Block until a flame is seen; `None` waits forever.
    pub fn wait_for_flame<DL: DelayNs>(
        &mut self,
        delay: &mut DL,
        timeout_ms: Option<u32>,
    ) -> Result<bool, A::Error> {
        let mut waited = 0u32;
        loop {
            if self.is_flame_detected()? {
                return Ok(true);
            }
            if let Some(limit) = timeout_ms {
                if waited >= limit {
                    return Ok(false);
                }
            }
            delay.delay_ms(POLL_PERIOD_MS);
            waited = waited.saturating_add(POLL_PERIOD_MS);
        }
    }

    pub fn release(self) -> (A, D) {
        (self.adc, self.digital)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAdc, MockDelay, MockPin};

    #[test]
    fn test_wait_times_out() {
        let mut s = FlameSensor::new(MockAdc::new(0), MockPin::low());
        let mut delay = MockDelay::new();
        assert!(!s.wait_for_flame(&mut delay, Some(200)).unwrap());
        assert_eq!(delay.elapsed_ms(), 200);
    }

    #[test]
    fn test_wait_sees_flame() {
        let pin = MockPin::low();
        pin.script(&[false, false, true]);
        let mut s = FlameSensor::new(MockAdc::new(0), pin);
        let mut delay = MockDelay::new();
        assert!(s.wait_for_flame(&mut delay, None).unwrap());
        assert_eq!(delay.elapsed_ms(), 100);
    }

    #[test]
    fn test_analog_and_poll() {
        let pin = MockPin::low();
        let mut s = FlameSensor::new(MockAdc::new(u16::MAX), pin.clone());
        assert!((s.voltage().unwrap() - 3.3).abs() < 1e-4);
        assert_eq!(s.poll().unwrap(), Some(false));
        assert_eq!(s.poll().unwrap(), None);
        pin.set_idle(true);
        assert_eq!(s.poll().unwrap(), Some(true));
    }
}
