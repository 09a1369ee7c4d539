// MEMS air-quality board: four gas elements on an ADS1115
//
// Each element (formaldehyde, smoke, VOC, CO) sits on its own
// single-ended input. Conversions are pipelined, so a reading discards
// two stale results before keeping the third. Concentration is a
// quadratic in the measured voltage, with per-gas coefficients.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};
use crate::signal::ads1115::{Ads1115, Channel, Rate};

const SETTLE_MS: u32 = 2;

/// `c0 + c1·v + c2·v²`
pub const DEFAULT_POLY: [f32; 3] = [0.0, 100.0, -20.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gas {
    Formaldehyde,
    Smoke,
    Voc,
    CarbonMonoxide,
}

impl Gas {
    fn channel(self) -> Channel {
        match self {
            Gas::Formaldehyde => Channel::A0,
            Gas::Smoke => Channel::A1,
            Gas::Voc => Channel::A2,
            Gas::CarbonMonoxide => Channel::A3,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

pub struct MemsAirQuality<I2C> {
    adc: Ads1115<I2C>,
    rate: Rate,
    polys: [[f32; 3]; 4],
}

impl<I2C: I2c> MemsAirQuality<I2C> {
    pub fn new(adc: Ads1115<I2C>) -> Self {
        Self {
            adc,
            rate: Rate::Sps860,
            polys: [DEFAULT_POLY; 4],
        }
    }

    pub fn set_rate(&mut self, rate: Rate) {
        self.rate = rate;
    }

    pub fn set_polynomial(&mut self, gas: Gas, coeffs: [f32; 3]) {
        self.polys[gas.index()] = coeffs;
    }

    /// Put one gas back on the stock curve.
    pub fn reset_polynomial(&mut self, gas: Gas) {
        self.polys[gas.index()] = DEFAULT_POLY;
    }

    pub fn polynomial(&self, gas: Gas) -> [f32; 3] {
        self.polys[gas.index()]
    }

    pub fn voltage<D: DelayNs>(&mut self, gas: Gas, delay: &mut D) -> Result<f32, I2C::Error> {
        self.adc.set_conversion(self.rate, gas.channel());
        self.adc.read_rev()?;
        delay.delay_ms(SETTLE_MS);
        self.adc.read_rev()?;
        delay.delay_ms(SETTLE_MS);
        let raw = self.adc.read_rev()?;
        Ok(self.adc.raw_to_voltage(raw))
    }

    /// Mean concentration over `samples` readings spaced `interval_ms`
    /// apart.
    pub fn ppm<D: DelayNs>(
        &mut self,
        gas: Gas,
        samples: u16,
        interval_ms: u32,
        delay: &mut D,
    ) -> Result<f32, I2C::Error> {
        if samples == 0 {
            return Err(Error::InvalidArgument("sample count must be non-zero"));
        }
        let coeffs = self.polynomial(gas);
        let mut sum = 0.0;
        for _ in 0..samples {
            let v = self.voltage(gas, delay)?;
            sum += eval_poly(&coeffs, v);
            if interval_ms > 0 {
                delay.delay_ms(interval_ms);
            }
        }
        Ok(sum / samples as f32)
    }

    pub fn release(self) -> Ads1115<I2C> {
        self.adc
    }
}

pub fn eval_poly(coeffs: &[f32; 3], x: f32) -> f32 {
    coeffs[0] + coeffs[1] * x + coeffs[2] * x * x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockI2c};
    use crate::signal::ads1115::Gain;

    fn board() -> (MemsAirQuality<MockI2c>, MockI2c) {
        let bus = MockI2c::new();
        let adc = Ads1115::new(bus.clone(), 0x48, Gain::One).unwrap();
        (MemsAirQuality::new(adc), bus)
    }

    #[test]
    fn test_voltage_keeps_third_result() {
        let (mut mems, bus) = board();
        let mut delay = MockDelay::new();
        bus.queue_read(&[0x7F, 0xFF]);
        bus.queue_read(&[0x7F, 0xFF]);
        bus.queue_read(&[0x40, 0x00]);
        let v = mems.voltage(Gas::Voc, &mut delay).unwrap();
        assert!((v - 2.048).abs() < 1e-4);
        assert_eq!(delay.elapsed_ms(), 4);
        // AIN2 single-ended, ±4.096 V, 860 SPS
        assert_eq!(bus.last_write().unwrap(), [0x01, 0xE3, 0xE3]);
    }

    #[test]
    fn test_ppm_default_curve() {
        let (mut mems, bus) = board();
        let mut delay = MockDelay::new();
        for _ in 0..2 {
            bus.queue_read(&[0, 0]);
            bus.queue_read(&[0, 0]);
            bus.queue_read(&[0x40, 0x00]);
        }
        let ppm = mems.ppm(Gas::CarbonMonoxide, 2, 10, &mut delay).unwrap();
        assert!((ppm - 120.91392).abs() < 1e-3);
        assert_eq!(delay.elapsed_ms(), 2 * (4 + 10));
    }

    #[test]
    fn test_custom_polynomial() {
        let (mut mems, _) = board();
        mems.set_polynomial(Gas::Smoke, [1.0, 2.0, 3.0]);
        assert_eq!(mems.polynomial(Gas::Smoke), [1.0, 2.0, 3.0]);
        assert_eq!(mems.polynomial(Gas::Voc), DEFAULT_POLY);
        mems.reset_polynomial(Gas::Smoke);
        assert_eq!(mems.polynomial(Gas::Smoke), DEFAULT_POLY);
        assert_eq!(eval_poly(&[1.0, 2.0, 3.0], 2.0), 17.0);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let (mut mems, _) = board();
        let mut delay = MockDelay::new();
        assert!(matches!(
            mems.ppm(Gas::Formaldehyde, 0, 0, &mut delay),
            Err(Error::InvalidArgument(_))
        ));
    }
}
