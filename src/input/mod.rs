// Human input: analog stick, switches, key pads, rotary encoder,
// touch, and a USB keyboard bridge.
//
// Every driver here is polled. The host loop calls `sample`/`poll`/`scan`
// at its own rate; nothing runs from a timer or an interrupt.

pub mod button;
pub mod ch9328;
pub mod ec11;
pub mod gt911;
pub mod joystick;
pub mod limit_switch;
pub mod pcf8574;
pub mod pcf8574_keys;
pub mod pcf8575;

pub use button::{Button, ButtonEvent};
pub use ch9328::Ch9328;
pub use ec11::Ec11Encoder;
pub use gt911::Gt911;
pub use joystick::Joystick;
pub use limit_switch::LimitSwitch;
pub use pcf8574::Pcf8574;
pub use pcf8574_keys::{DEFAULT_KEYMAP, Key, KeyEvent, Pcf8574Keys};
pub use pcf8575::Pcf8575;

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin};

/// Placeholder for an optional push button that is not wired.
///
/// Always reads high, i.e. released on a pull-up input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoButton;

impl ErrorType for NoButton {
    type Error = Infallible;
}

impl InputPin for NoButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}
