// Vibration switch modules (SW-420 ball switch, spring switch)
//
// The comparator output pulses high while the switch chatters. Each
// rising edge counts as one vibration event unless it falls inside the
// debounce window of the previous event.

use embedded_hal::digital::InputPin;

use crate::error::{Error, Result};

pub const DEFAULT_DEBOUNCE_MS: u32 = 50;

/// Snapshot returned by [`VibrationSensor::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VibrationStatus {
    /// Output level seen by the last poll
    pub level: bool,
    pub events: u32,
    pub last_event_ms: Option<u32>,
    pub debounce_ms: u32,
}

pub struct VibrationSensor<P> {
    pin: P,
    debounce_ms: u32,
    level: bool,
    events: u32,
    last_event_ms: Option<u32>,
}

impl<P: InputPin> VibrationSensor<P> {
    pub fn new(pin: P, debounce_ms: u32) -> Self {
        Self {
            pin,
            debounce_ms,
            level: false,
            events: 0,
            last_event_ms: None,
        }
    }

    pub fn read(&mut self) -> Result<bool> {
        self.pin.is_high().map_err(Error::pin)
    }

    /// True on a debounced rising edge.
    pub fn poll(&mut self, now_ms: u32) -> Result<bool> {
        let level = self.read()?;
        let rising = level && !self.level;
        self.level = level;
        if !rising {
            return Ok(false);
        }
        if let Some(at) = self.last_event_ms {
            if now_ms.wrapping_sub(at) < self.debounce_ms {
                return Ok(false);
            }
        }
        self.last_event_ms = Some(now_ms);
        self.events = self.events.wrapping_add(1);
        log::debug!("vibration event {}", self.events);
        Ok(true)
    }

    pub fn status(&self) -> VibrationStatus {
        VibrationStatus {
            level: self.level,
            events: self.events,
            last_event_ms: self.last_event_ms,
            debounce_ms: self.debounce_ms,
        }
    }

    pub fn set_debounce_ms(&mut self, debounce_ms: u32) {
        self.debounce_ms = debounce_ms;
    }

    pub fn reset_count(&mut self) {
        self.events = 0;
        self.last_event_ms = None;
    }

    pub fn release(self) -> P {
        self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPin;

    #[test]
    fn test_rising_edges_counted() {
        let pin = MockPin::low();
        pin.script(&[true, false, true, true, false]);
        let mut s = VibrationSensor::new(pin, 0);
        let seen: [bool; 5] = core::array::from_fn(|i| s.poll(i as u32 * 100).unwrap());
        assert_eq!(seen, [true, false, true, false, false]);
        assert_eq!(s.status().events, 2);
        assert_eq!(s.status().last_event_ms, Some(200));
    }

    #[test]
    fn test_chatter_inside_window_ignored() {
        let pin = MockPin::low();
        pin.script(&[true, false, true, false, true]);
        let mut s = VibrationSensor::new(pin, DEFAULT_DEBOUNCE_MS);
        assert!(s.poll(0).unwrap());
        assert!(!s.poll(10).unwrap());
        assert!(!s.poll(20).unwrap());
        assert!(!s.poll(30).unwrap());
        assert!(s.poll(60).unwrap());
        assert_eq!(s.status().events, 2);

        s.reset_count();
        assert_eq!(
            s.status(),
            VibrationStatus {
                level: true,
                events: 0,
                last_event_ms: None,
                debounce_ms: 50
            }
        );
    }
}
