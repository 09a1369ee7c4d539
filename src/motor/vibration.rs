// Vibration motor module on a PWM channel

use embedded_hal::pwm::SetDutyCycle;

use crate::analog::{DUTY_MAX, duty_from_10bit};
use crate::error::{Error, Result};

pub struct VibrationMotor<PWM> {
    pwm: PWM,
    running: bool,
}

impl<PWM: SetDutyCycle> VibrationMotor<PWM> {
    pub fn new(mut pwm: PWM) -> Result<Self> {
        pwm.set_duty_cycle_fully_off().map_err(Error::pin)?;
        Ok(Self {
            pwm,
            running: false,
        })
    }

    pub fn on(&mut self) -> Result<()> {
        self.pwm.set_duty_cycle_fully_on().map_err(Error::pin)?;
        self.running = true;
        Ok(())
    }

    pub fn off(&mut self) -> Result<()> {
        self.pwm.set_duty_cycle_fully_off().map_err(Error::pin)?;
        self.running = false;
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<()> {
        if self.running { self.off() } else { self.on() }
    }

    /// 0..=1023. Does not change the on/off state.
    pub fn set_strength(&mut self, duty: u16) -> Result<()> {
        if duty > DUTY_MAX {
            return Err(Error::InvalidArgument("duty must be 0..=1023"));
        }
        let native = duty_from_10bit(duty, self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(native).map_err(Error::pin)
    }

    pub fn is_on(&self) -> bool {
        self.running
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
    fn test_toggle() {
        let pwm = MockPwm::new(1023);
        let mut motor = VibrationMotor::new(pwm.clone()).unwrap();
        motor.toggle().unwrap();
        assert!(motor.is_on());
        assert_eq!(pwm.duty(), 1023);
        motor.toggle().unwrap();
        assert!(!motor.is_on());
        assert_eq!(pwm.duty(), 0);
    }

    #[test]
    fn test_strength_range() {
        let pwm = MockPwm::new(1023);
        let mut motor = VibrationMotor::new(pwm.clone()).unwrap();
        motor.set_strength(400).unwrap();
        assert_eq!(pwm.duty(), 400);
        assert!(matches!(
            motor.set_strength(1024),
            Err(Error::InvalidArgument(_))
        ));
    }
}
