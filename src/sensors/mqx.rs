// MQ-series gas sensors (MQ2, MQ4, MQ7 ...)
//
// The analog output is converted to volts and mapped to ppm through a
// polynomial in voltage, c0 + c1*v + c2*v^2 + ... Built-in curves are
// rough linear fits; calibrate per sensor with `set_custom_polynomial`.
// The optional comparator pin is the module's DO output.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use crate::analog::{AdcChannel, DEFAULT_VREF, raw_to_voltage};
use crate::error::{Error, Result};
use crate::input::NoButton;

pub const MAX_COEFFS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSensor {
    Mq2,
    Mq4,
    Mq7,
}

impl GasSensor {
    pub const fn coefficients(self) -> &'static [f32] {
        match self {
            GasSensor::Mq2 => &[0.0, 100.0, -20.0],
            GasSensor::Mq4 => &[0.0, 200.0, -40.0],
            GasSensor::Mq7 => &[0.0, 50.0, -8.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    None,
    Builtin(GasSensor),
    Custom([f32; MAX_COEFFS], usize),
}

impl Curve {
    fn eval(&self, v: f32) -> Option<f32> {
        let coeffs = match self {
            Curve::None => return None,
            Curve::Builtin(s) => s.coefficients(),
            Curve::Custom(c, n) => &c[..*n],
        };
        let mut res = 0.0;
        let mut p = 1.0;
        for &a in coeffs {
            res += a * p;
            p *= v;
        }
        Some(res)
    }
}

pub struct Mqx<A, C = NoButton> {
    adc: A,
    comparator: Option<C>,
    vref: f32,
    load_ohm: f32,
    curve: Curve,
    last_raw: Option<u16>,
    last_voltage: Option<f32>,
}

impl<A: AdcChannel> Mqx<A, NoButton> {
    pub fn new(adc: A) -> Self {
        Self::build(adc, None)
    }
}

impl<A: AdcChannel, C: InputPin> Mqx<A, C> {
    pub fn with_comparator(adc: A, comparator: C) -> Self {
        Self::build(adc, Some(comparator))
    }

    fn build(adc: A, comparator: Option<C>) -> Self {
        Self {
            adc,
            comparator,
            vref: DEFAULT_VREF,
            load_ohm: 10_000.0,
            curve: Curve::None,
            last_raw: None,
            last_voltage: None,
        }
    }

    pub fn with_vref(mut self, vref: f32) -> Self {
        self.vref = vref;
        self
    }

    /// Load resistor on the module, kept for Rs/R0 calibration math.
    pub fn with_load_resistance(mut self, ohms: f32) -> Self {
        self.load_ohm = ohms;
        self
    }

    pub fn load_resistance(&self) -> f32 {
        self.load_ohm
    }

    pub fn read_raw(&mut self) -> Result<u16, A::Error> {
        let raw = self.adc.read_u16().map_err(Error::Bus)?;
        self.last_raw = Some(raw);
        Ok(raw)
    }

    pub fn read_voltage(&mut self) -> Result<f32, A::Error> {
        let v = raw_to_voltage(self.read_raw()?, self.vref);
        self.last_voltage = Some(v);
        Ok(v)
    }

    pub fn select_builtin(&mut self, sensor: GasSensor) {
        self.curve = Curve::Builtin(sensor);
    }

    /// Coefficients in ascending power order, at most `MAX_COEFFS`.
    pub fn set_custom_polynomial(&mut self, coeffs: &[f32]) -> Result<(), A::Error> {
        if coeffs.is_empty() || coeffs.len() > MAX_COEFFS {
            return Err(Error::InvalidArgument("polynomial needs 1..=8 coefficients"));
        }
        let mut c = [0.0; MAX_COEFFS];
        c[..coeffs.len()].copy_from_slice(coeffs);
        self.curve = Curve::Custom(c, coeffs.len());
        Ok(())
    }

    /// Average ppm over `samples` readings. `sensor` applies a built-in
    /// curve for this call only.
    pub fn read_ppm<D: DelayNs>(
        &mut self,
        samples: u32,
        delay_ms: u32,
        sensor: Option<GasSensor>,
        delay: &mut D,
    ) -> Result<f32, A::Error> {
        let curve = match sensor {
            Some(s) => Curve::Builtin(s),
            None => self.curve,
        };
        if curve == Curve::None {
            return Err(Error::InvalidArgument("no polynomial selected"));
        }

        let n = samples.max(1);
        let mut sum = 0.0;
        for _ in 0..n {
            let v = self.read_voltage()?;
            sum += curve.eval(v).unwrap_or(0.0);
            if delay_ms > 0 {
                delay.delay_ms(delay_ms);
            }
        }
        Ok(sum / n as f32)
    }

    /// DO level, `None` without a comparator pin.
    pub fn comparator_level(&mut self) -> Result<Option<bool>, A::Error> {
        match self.comparator.as_mut() {
            Some(pin) => pin.is_high().map(Some).map_err(Error::pin),
            None => Ok(None),
        }
    }

    pub fn last_raw(&self) -> Option<u16> {
        self.last_raw
    }

    pub fn last_voltage(&self) -> Option<f32> {
        self.last_voltage
    }

    pub fn release(self) -> (A, Option<C>) {
        (self.adc, self.comparator)
    }
}
