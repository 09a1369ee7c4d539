// Analog input seam and the unit conventions drivers share.
//
// embedded-hal 1.0 has no ADC trait. Drivers read through `AdcChannel`,
// which follows the 16-bit full-scale convention (0..=65535) regardless
// of the converter's native resolution; HAL glue scales up.
//
// PWM outputs use embedded-hal's `SetDutyCycle` directly. Catalog APIs
// keep the 10-bit duty range (0..=1023) and map it with
// `set_duty_cycle_fraction(duty, DUTY_MAX)`.

/// Full-scale value of an `AdcChannel` reading.
pub const ADC_FULL_SCALE: u16 = u16::MAX;

/// Reference voltage assumed when a driver is not told otherwise.
pub const DEFAULT_VREF: f32 = 3.3;

/// Upper bound of the 10-bit duty range used by PWM drivers.
pub const DUTY_MAX: u16 = 1023;

/// One analog input channel.
pub trait AdcChannel {
    type Error: core::fmt::Debug;

    /// Sample the channel, scaled to 0..=65535.
    fn read_u16(&mut self) -> Result<u16, Self::Error>;
}

impl<T: AdcChannel + ?Sized> AdcChannel for &mut T {
    type Error = T::Error;

    fn read_u16(&mut self) -> Result<u16, Self::Error> {
        T::read_u16(self)
    }
}

/// Convert a 16-bit reading to volts against `vref`.
pub fn raw_to_voltage(raw: u16, vref: f32) -> f32 {
    raw as f32 / ADC_FULL_SCALE as f32 * vref
}

/// Map a 10-bit duty (0..=1023) onto a PWM channel's native range.
pub fn duty_from_10bit(duty: u16, max_duty: u16) -> u16 {
    (duty.min(DUTY_MAX) as u32 * max_duty as u32 / DUTY_MAX as u32) as u16
}

/// Map a 16-bit duty (0..=65535) onto a PWM channel's
/// native range.
pub fn duty_from_u16(duty: u16, max_duty: u16) -> u16 {
    (duty as u32 * max_duty as u32 / u16::MAX as u32) as u16
}
