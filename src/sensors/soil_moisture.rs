// Capacitive soil moisture sensor on an analog input
//
// The output falls as the soil gets wetter. Two calibration points, the
// reading in dry air and in water, map raw samples onto 0..=100 %.

use crate::analog::AdcChannel;
use crate::error::{Error, Result};

/// Below this many percent the soil counts as dry.
pub const DRY_BELOW: f32 = 30.0;
/// At or above this many percent the soil counts as wet.
pub const WET_FROM: f32 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoistureLevel {
    Dry,
    Moist,
    Wet,
}

impl MoistureLevel {
    pub fn from_percent(percent: f32) -> Self {
        if percent < DRY_BELOW {
            MoistureLevel::Dry
        } else if percent < WET_FROM {
            MoistureLevel::Moist
        } else {
            MoistureLevel::Wet
        }
    }
}

pub struct SoilMoisture<A> {
    adc: A,
    dry: u16,
    wet: u16,
}

impl<A: AdcChannel> SoilMoisture<A> {
    /// Uncalibrated: full scale is dry, zero is wet.
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            dry: u16::MAX,
            wet: 0,
        }
    }

    pub fn read_raw(&mut self) -> Result<u16, A::Error> {
        self.adc.read_u16().map_err(Error::Bus)
    }

    /// Record the current reading as the dry point.
    pub fn calibrate_dry(&mut self) -> Result<u16, A::Error> {
        self.dry = self.read_raw()?;
        Ok(self.dry)
    }

    /// Record the current reading as the wet point.
    pub fn calibrate_wet(&mut self) -> Result<u16, A::Error> {
        self.wet = self.read_raw()?;
        Ok(self.wet)
    }

    pub fn set_calibration(&mut self, dry: u16, wet: u16) -> Result<(), A::Error> {
        if dry == wet {
            return Err(Error::InvalidArgument("dry and wet readings must differ"));
        }
        self.dry = dry;
        self.wet = wet;
        Ok(())
    }

    pub fn calibration(&self) -> (u16, u16) {
        (self.dry, self.wet)
    }

    /// Moisture in percent, clamped to 0..=100.
    pub fn read_moisture(&mut self) -> Result<f32, A::Error> {
        let raw = self.read_raw()?;
        let span = self.dry as f32 - self.wet as f32;
        if span == 0.0 {
            return Err(Error::InvalidArgument("dry and wet readings must differ"));
        }
        let percent = (self.dry as f32 - raw as f32) / span * 100.0;
        Ok(percent.clamp(0.0, 100.0))
    }

    pub fn level(&mut self) -> Result<MoistureLevel, A::Error> {
        Ok(MoistureLevel::from_percent(self.read_moisture()?))
    }

    pub fn release(self) -> A {
        self.adc
    }
}
