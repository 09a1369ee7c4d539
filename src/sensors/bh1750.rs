// BH1750 ambient light sensor
//
// Opcode-only protocol, no register map. Sensitivity is scaled by the
// measurement-time register (MTreg, 31..=254, default 69), written as two
// opcodes carrying the high 3 and low 5 bits. One-time modes power down
// after each conversion, so every read re-sends the mode opcode and waits.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS_LOW: u8 = 0x23;
pub const ADDRESS_HIGH: u8 = 0x5C;

pub const MTREG_DEFAULT: u8 = 69;
pub const MTREG_MIN: u8 = 31;
pub const MTREG_MAX: u8 = 254;

mod cmd {
    pub const POWER_DOWN: u8 = 0x00;
    pub const POWER_ON: u8 = 0x01;
    pub const RESET: u8 = 0x07;
    pub const MTREG_HIGH: u8 = 0x40; // | mt[7:5]
    pub const MTREG_LOW: u8 = 0x60; // | mt[4:0]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Continuous = 1,
    #[default]
    OneTime = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// 1 lx steps
    #[default]
    High = 0,
    /// 0.5 lx steps
    High2 = 1,
    /// 4 lx steps, fast
    Low = 2,
}

pub struct Bh1750<I2C> {
    i2c: I2C,
    address: u8,
    mode: Mode,
    resolution: Resolution,
    mtreg: u8,
}

impl<I2C: I2c> Bh1750<I2C> {
    /// One-time high resolution at the default MTreg.
    pub fn new<D: DelayNs>(i2c: I2C, address: u8, delay: &mut D) -> Result<Self, I2C::Error> {
        if address != ADDRESS_LOW && address != ADDRESS_HIGH {
            return Err(Error::InvalidArgument("BH1750 address must be 0x23 or 0x5C"));
        }
        let mut dev = Self {
            i2c,
            address,
            mode: Mode::default(),
            resolution: Resolution::default(),
            mtreg: MTREG_DEFAULT,
        };
        dev.write_mtreg()?;
        dev.write_mode(delay)?;
        Ok(dev)
    }

    pub fn configure<D: DelayNs>(
        &mut self,
        mode: Mode,
        resolution: Resolution,
        mtreg: u8,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        if !(MTREG_MIN..=MTREG_MAX).contains(&mtreg) {
            return Err(Error::InvalidArgument("MTreg must be 31..=254"));
        }
        self.mode = mode;
        self.resolution = resolution;
        self.mtreg = mtreg;
        self.write_mtreg()?;
        self.write_mode(delay)
    }

    pub fn reset(&mut self) -> Result<(), I2C::Error> {
        self.command(cmd::RESET)
    }

    pub fn power_on(&mut self) -> Result<(), I2C::Error> {
        self.command(cmd::POWER_ON)
    }

    pub fn power_off(&mut self) -> Result<(), I2C::Error> {
        self.command(cmd::POWER_DOWN)
    }

    /// Illuminance in lux.
    pub fn measurement<D: DelayNs>(&mut self, delay: &mut D) -> Result<f32, I2C::Error> {
        if self.mode == Mode::OneTime {
            self.write_mode(delay)?;
        }
        let mut buf = [0u8; 2];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        Ok(raw_to_lux(
            u16::from_be_bytes(buf),
            self.mtreg,
            self.resolution,
        ))
    }

    /// Conversion time for the current resolution and MTreg, i.e. how
    /// long to wait between continuous-mode reads.
    pub fn measurement_delay_ms(&self) -> u32 {
        let base: u32 = if self.resolution == Resolution::Low {
            16
        } else {
            120
        };
        (base * self.mtreg as u32).div_ceil(MTREG_DEFAULT as u32)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn mtreg(&self) -> u8 {
        self.mtreg
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_mtreg(&mut self) -> Result<(), I2C::Error> {
        let (hi, lo) = mtreg_opcodes(self.mtreg);
        self.command(hi)?;
        self.command(lo)
    }

    fn write_mode<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), I2C::Error> {
        let opcode = ((self.mode as u8) << 4) | self.resolution as u8;
        self.command(opcode)?;
        delay.delay_ms(if self.resolution == Resolution::Low {
            24
        } else {
            180
        });
        Ok(())
    }

    fn command(&mut self, opcode: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[opcode]).map_err(Error::Bus)
    }
}

pub const fn mtreg_opcodes(mtreg: u8) -> (u8, u8) {
    (cmd::MTREG_HIGH | (mtreg >> 5), cmd::MTREG_LOW | (mtreg & 0x1F))
}

pub fn raw_to_lux(raw: u16, mtreg: u8, resolution: Resolution) -> f32 {
    let lux = raw as f32 / (1.2 * (MTREG_DEFAULT as f32 / mtreg as f32));
    if resolution == Resolution::High2 {
        lux / 2.0
    } else {
        lux
    }
}
