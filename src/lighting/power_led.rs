// High-power LED on a PWM channel
//
// Brightness uses the 10-bit duty range; `on` drives the channel fully on.

use embedded_hal::pwm::SetDutyCycle;

use crate::analog::{DUTY_MAX, duty_from_10bit};
use crate::error::{Error, Result};

pub struct PowerLed<PWM> {
    pwm: PWM,
    lit: bool,
}

impl<PWM: SetDutyCycle> PowerLed<PWM> {
    /// Starts dark.
    pub fn new(mut pwm: PWM) -> Result<Self> {
        pwm.set_duty_cycle_fully_off().map_err(Error::pin)?;
        Ok(Self { pwm, lit: false })
    }

    pub fn on(&mut self) -> Result<()> {
        self.pwm.set_duty_cycle_fully_on().map_err(Error::pin)?;
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

    /// 0..=1023; any non-zero duty counts as on.
    pub fn set_brightness(&mut self, duty: u16) -> Result<()> {
        if duty > DUTY_MAX {
            return Err(Error::InvalidArgument("duty must be 0..=1023"));
        }
        let native = duty_from_10bit(duty, self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(native).map_err(Error::pin)?;
        self.lit = duty > 0;
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.lit
    }

    pub fn release(self) -> PWM {
        self.pwm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPwm;

    #[test]
    fn test_on_off_toggle() {
        let pwm = MockPwm::new(1000);
        let mut led = PowerLed::new(pwm.clone()).unwrap();
        assert!(!led.is_on());
        led.on().unwrap();
        assert_eq!(pwm.duty(), 1000);
        led.toggle().unwrap();
        assert_eq!(pwm.duty(), 0);
        assert!(!led.is_on());
    }

    #[test]
    fn test_brightness() {
        let pwm = MockPwm::new(2046);
        let mut led = PowerLed::new(pwm.clone()).unwrap();
        led.set_brightness(512).unwrap();
        assert_eq!(pwm.duty(), 1024);
        assert!(led.is_on());
        led.set_brightness(0).unwrap();
        assert!(!led.is_on());
        assert!(led.set_brightness(1024).is_err());
    }
}
