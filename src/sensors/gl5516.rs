// GL5516 photoresistor module, analog output.
// Light level is reported against two recorded points, darkest and
// brightest, so the module's divider direction does not matter.

use crate::analog::{AdcChannel, DEFAULT_VREF, raw_to_voltage};
use crate::error::{Error, Result};

pub struct Gl5516<A> {
    adc: A,
    vref: f32,
    min_light: u16,
    max_light: u16,
}

impl<A: AdcChannel> Gl5516<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            vref: DEFAULT_VREF,
            min_light: 0,
            max_light: u16::MAX,
        }
    }

    pub fn with_vref(mut self, vref: f32) -> Self {
        self.vref = vref;
        self
    }

    /// `(volts, raw)`
    pub fn read_light_intensity(&mut self) -> Result<(f32, u16), A::Error> {
        let raw = self.adc.read_u16().map_err(Error::Bus)?;
        Ok((raw_to_voltage(raw, self.vref), raw))
    }

    /// Record the current reading as 0 %.
    pub fn set_min_light(&mut self) -> Result<u16, A::Error> {
        self.min_light = self.read_light_intensity()?.1;
        Ok(self.min_light)
    }

    /// Record the current reading as 100 %.
    pub fn set_max_light(&mut self) -> Result<u16, A::Error> {
        self.max_light = self.read_light_intensity()?.1;
        Ok(self.max_light)
    }

    pub fn min_light(&self) -> u16 {
        self.min_light
    }

    pub fn max_light(&self) -> u16 {
        self.max_light
    }

    pub fn calibrated_light(&mut self) -> Result<f32, A::Error> {
        let (_, raw) = self.read_light_intensity()?;
        let span = self.max_light as f32 - self.min_light as f32;
        if span == 0.0 {
            return Err(Error::InvalidArgument("light calibration points are equal"));
        }
        let percent = (raw as f32 - self.min_light as f32) / span * 100.0;
        Ok(percent.clamp(0.0, 100.0))
    }

    pub fn release(self) -> A {
        self.adc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdc;

    #[test]
    fn test_calibrated_either_direction() {
        let adc = MockAdc::new(60_000);
        let mut s = Gl5516::new(adc.clone());
        s.set_min_light().unwrap();
        adc.set(10_000);
        s.set_max_light().unwrap();
        assert_eq!((s.min_light(), s.max_light()), (60_000, 10_000));

        adc.set(22_500);
        assert!((s.calibrated_light().unwrap() - 75.0).abs() < 1e-3);
        adc.set(0);
        assert_eq!(s.calibrated_light().unwrap(), 100.0);
    }

    #[test]
    fn test_voltage_and_flat_calibration() {
        let adc = MockAdc::new(u16::MAX);
        let mut s = Gl5516::new(adc).with_vref(5.0);
        let (v, raw) = s.read_light_intensity().unwrap();
        assert_eq!(raw, u16::MAX);
        assert!((v - 5.0).abs() < 1e-4);

        s.set_min_light().unwrap();
        s.set_max_light().unwrap();
        assert!(matches!(s.calibrated_light(), Err(Error::InvalidArgument(_))));
    }
}
