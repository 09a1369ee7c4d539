// PWM fan
//
// Speed is the 10-bit duty, silently clamped. Run the channel at 25 kHz
// for 4-wire fans.

use embedded_hal::pwm::SetDutyCycle;

use crate::analog::{DUTY_MAX, duty_from_10bit};
use crate::error::{Error, Result};

pub const DEFAULT_FREQ_HZ: u32 = 25_000;

pub struct FanPwm<PWM> {
    pwm: PWM,
    duty: u16,
}

impl<PWM: SetDutyCycle> FanPwm<PWM> {
    pub fn new(mut pwm: PWM) -> Result<Self> {
        pwm.set_duty_cycle_fully_off().map_err(Error::pin)?;
        Ok(Self { pwm, duty: 0 })
    }

    pub fn on(&mut self) -> Result<()> {
        self.set_speed(DUTY_MAX)
    }

    pub fn off(&mut self) -> Result<()> {
        self.set_speed(0)
    }

    pub fn set_speed(&mut self, duty: u16) -> Result<()> {
        let duty = duty.min(DUTY_MAX);
        let native = duty_from_10bit(duty, self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(native).map_err(Error::pin)?;
        self.duty = duty;
        Ok(())
    }

    pub fn speed(&self) -> u16 {
        self.duty
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
    fn test_speed_is_clamped() {
        let pwm = MockPwm::new(1023);
        let mut fan = FanPwm::new(pwm.clone()).unwrap();
        fan.set_speed(5000).unwrap();
        assert_eq!(fan.speed(), 1023);
        assert_eq!(pwm.duty(), 1023);
        fan.set_speed(300).unwrap();
        assert_eq!(pwm.duty(), 300);
        fan.off().unwrap();
        assert_eq!(fan.speed(), 0);
    }

    #[test]
    fn test_on_is_full_duty() {
        let pwm = MockPwm::new(4000);
        let mut fan = FanPwm::new(pwm.clone()).unwrap();
        fan.on().unwrap();
        assert_eq!(pwm.duty(), 4000);
    }
}
