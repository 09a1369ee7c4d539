// Two-axis analog stick with optional push button (PS2-style module)
//
// Each axis is a pot across the supply, read as volts. Readings go
// through a first-order low-pass: f = a*raw + (1-a)*f, seeded at the
// rest position (about half the supply) so the first samples don't ramp
// up from zero.

use embedded_hal::digital::InputPin;

use super::NoButton;
use crate::analog::{AdcChannel, DEFAULT_VREF, raw_to_voltage};
use crate::error::{Error, Result};

pub const DEFAULT_ALPHA: f32 = 0.2;
pub const REST_VOLTAGE: f32 = 1.55;

pub struct Joystick<X, Y, SW = NoButton> {
    adc_x: X,
    adc_y: Y,
    sw: SW,
    alpha: f32,
    filtered_x: f32,
    filtered_y: f32,
    pressed: bool,
}

impl<X, Y> Joystick<X, Y, NoButton>
where
    X: AdcChannel,
    Y: AdcChannel<Error = X::Error>,
{
    pub fn new(adc_x: X, adc_y: Y) -> Self {
        Self::with_button(adc_x, adc_y, NoButton)
    }
}

impl<X, Y, SW> Joystick<X, Y, SW>
where
    X: AdcChannel,
    Y: AdcChannel<Error = X::Error>,
    SW: InputPin,
{
    /// `sw` is an active-low button on a pull-up input.
    pub fn with_button(adc_x: X, adc_y: Y, sw: SW) -> Self {
        Self {
            adc_x,
            adc_y,
            sw,
            alpha: DEFAULT_ALPHA,
            filtered_x: REST_VOLTAGE,
            filtered_y: REST_VOLTAGE,
            pressed: false,
        }
    }

    /// Override the filter weight; 1.0 disables filtering.
    pub fn with_filter(mut self, alpha: f32) -> Result<Self, X::Error> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::InvalidArgument("filter alpha must be in (0, 1]"));
        }
        self.alpha = alpha;
        Ok(self)
    }

    /// Read both axes and the button once, updating the filtered values.
    pub fn sample(&mut self) -> Result<(f32, f32, bool), X::Error> {
        let raw_x = raw_to_voltage(self.adc_x.read_u16().map_err(Error::Bus)?, DEFAULT_VREF);
        let raw_y = raw_to_voltage(self.adc_y.read_u16().map_err(Error::Bus)?, DEFAULT_VREF);

        self.filtered_x = self.alpha * raw_x + (1.0 - self.alpha) * self.filtered_x;
        self.filtered_y = self.alpha * raw_y + (1.0 - self.alpha) * self.filtered_y;
        self.pressed = self.sw.is_low().map_err(Error::pin)?;

        Ok(self.values())
    }

    /// Last filtered `(x_volts, y_volts, pressed)`.
    pub fn values(&self) -> (f32, f32, bool) {
        (self.filtered_x, self.filtered_y, self.pressed)
    }

    pub fn release(self) -> (X, Y, SW) {
        (self.adc_x, self.adc_y, self.sw)
    }
}
