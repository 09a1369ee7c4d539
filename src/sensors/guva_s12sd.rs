// GUVA-S12SD UV photodiode with on-board amplifier.
// Output is about 0.1 V per UV index step.

use crate::analog::{AdcChannel, DEFAULT_VREF, raw_to_voltage};
use crate::error::{Error, Result};

const VOLTS_PER_UVI: f32 = 0.1;

pub struct GuvaS12sd<A> {
    adc: A,
    vref: f32,
}

impl<A: AdcChannel> GuvaS12sd<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            vref: DEFAULT_VREF,
        }
    }

    pub fn with_vref(mut self, vref: f32) -> Self {
        self.vref = vref;
        self
    }

    pub fn voltage(&mut self) -> Result<f32, A::Error> {
        let raw = self.adc.read_u16().map_err(Error::Bus)?;
        Ok(raw_to_voltage(raw, self.vref))
    }

    pub fn uv_index(&mut self) -> Result<f32, A::Error> {
        Ok(self.voltage()? / VOLTS_PER_UVI)
    }

    pub fn release(self) -> A {
        self.adc
    }
}
