// UV LED matrix on a PWM channel
//
// The array is rated for half duty at most: `on` drives 50% and
// `set_brightness` caps the 10-bit duty at 512.

use embedded_hal::pwm::SetDutyCycle;

use crate::analog::{duty_from_10bit, duty_from_u16};
use crate::error::{Error, Result};

pub const BRIGHTNESS_MAX: u16 = 512;

const ON_DUTY: u16 = 32766;

pub struct UvMatrix<PWM> {
    pwm: PWM,
    lit: bool,
}

impl<PWM: SetDutyCycle> UvMatrix<PWM> {
    pub fn new(mut pwm: PWM) -> Result<Self> {
        pwm.set_duty_cycle_fully_off().map_err(Error::pin)?;
        Ok(Self { pwm, lit: false })
    }

    pub fn on(&mut self) -> Result<()> {
        let native = duty_from_u16(ON_DUTY, self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(native).map_err(Error::pin)?;
        self.lit = true;
        Ok(())
    }

    pub fn off(&mut self) -> Result<()> {
        self.pwm.set_duty_cycle_fully_off().map_err(Error::pin)?;
        self.lit = false;
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<()> {
        if self.lit { self.off() } else { self.on() }
    }

    /// 0..=512 on the 10-bit scale. Leaves the on/off state alone.
    pub fn set_brightness(&mut self, duty: u16) -> Result<()> {
        if duty > BRIGHTNESS_MAX {
            return Err(Error::InvalidArgument("UV duty must be 0..=512"));
        }
        let native = duty_from_10bit(duty, self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(native).map_err(Error::pin)
    }

    pub fn is_on(&self) -> bool {
        self.lit
    }

    pub fn release(self) -> PWM {
        self.pwm
    }
}
