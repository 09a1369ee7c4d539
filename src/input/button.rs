// Push button or capacitive touch key on a digital input.
//
// The idle level depends on the module (pull-up buttons idle high, TTP223
// touch keys idle low), so it is given at construction. A level change
// only counts once it has held for the debounce time.

use embedded_hal::digital::InputPin;

use crate::error::{Error, Result};

pub const DEFAULT_DEBOUNCE_MS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
    Released,
}

pub struct Button<P> {
    pin: P,
    idle_level: bool,
    debounce_ms: u32,
    pressed: bool,
    raw: bool,
    raw_since: u32,
}

impl<P: InputPin> Button<P> {
    pub fn new(pin: P, idle_level: bool, debounce_ms: u32) -> Self {
        Self {
            pin,
            idle_level,
            debounce_ms,
            pressed: false,
            raw: false,
            raw_since: 0,
        }
    }

    /// Undebounced pressed state.
    pub fn state(&mut self) -> Result<bool> {
        let level = self.pin.is_high().map_err(Error::pin)?;
        Ok(level != self.idle_level)
    }

    /// Debounced pressed state as of the last poll.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn poll(&mut self, now_ms: u32) -> Result<Option<ButtonEvent>> {
        let raw = self.state()?;
        if raw != self.raw {
            self.raw = raw;
            self.raw_since = now_ms;
        }
        if self.raw == self.pressed || now_ms.wrapping_sub(self.raw_since) < self.debounce_ms {
            return Ok(None);
        }
        self.pressed = self.raw;
        Ok(Some(if self.pressed {
            ButtonEvent::Pressed
        } else {
            ButtonEvent::Released
        }))
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
    fn test_press_and_release_after_debounce() {
        let pin = MockPin::high();
        let mut b = Button::new(pin.clone(), true, 50);
        assert_eq!(b.poll(0).unwrap(), None);

        pin.set_idle(false);
        assert_eq!(b.poll(10).unwrap(), None);
        assert_eq!(b.poll(40).unwrap(), None);
        assert_eq!(b.poll(60).unwrap(), Some(ButtonEvent::Pressed));
        assert!(b.is_pressed());
        assert_eq!(b.poll(70).unwrap(), None);

        pin.set_idle(true);
        assert_eq!(b.poll(100).unwrap(), None);
        assert_eq!(b.poll(150).unwrap(), Some(ButtonEvent::Released));
    }

    #[test]
    fn test_bounce_restarts_window() {
        let pin = MockPin::low();
        // touch key: idles low
        pin.script(&[true, false, true, true, true]);
        let mut b = Button::new(pin, false, 20);
        assert_eq!(b.poll(0).unwrap(), None);
        assert_eq!(b.poll(5).unwrap(), None);
        assert_eq!(b.poll(10).unwrap(), None);
        assert_eq!(b.poll(25).unwrap(), None);
        assert_eq!(b.poll(30).unwrap(), Some(ButtonEvent::Pressed));
    }
}
