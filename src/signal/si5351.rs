// SI5351 I2C clock generator
//
// Crystal -> PLL A/B (x15..x90, fractional) -> MultiSynth 0..2 (/4../2047,
// fractional) -> R divider (/1../128) -> CLK0..2. Both PLL and MultiSynth
// dividers are programmed through the same 8-byte P1/P2/P3 block. A
// frequency is reached either by holding the PLL and picking a divider
// (`set_freq_fixed_pll`) or by holding the divider and retuning the PLL
// (`set_freq_fixed_ms`). Changing a MultiSynth's integer divider needs a
// PLL reset to realign the outputs.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS: u8 = 0x60;

pub const OUTPUTS: u8 = 3;

const SYS_INIT: u8 = 0x80;
const INIT_POLL_LIMIT: u32 = 1000;

const MS_DIV_MIN: u64 = 8;
const MS_DIV_MAX: u64 = 2048;
const PLL_MUL_MIN: u64 = 15;
const PLL_MUL_MAX: u64 = 90;
const R_DIV_MAX: u8 = 7;
/// Largest fractional denominator (20 bits).
pub const DENOM_MAX: u32 = 1_048_575;
const PHASE_MAX: u32 = 0x7F;

mod reg {
    pub const DEVICE_STATUS: u8 = 0;
    pub const OUTPUT_ENABLE: u8 = 3;
    pub const OEB_ENABLE: u8 = 9;
    pub const CLK0_CONTROL: u8 = 16;
    pub const DIS_STATE_1: u8 = 24;
    pub const DIS_STATE_2: u8 = 25;
    pub const PLL_A: u8 = 26;
    pub const PLL_B: u8 = 34;
    pub const MULTISYNTH0: u8 = 42;
    pub const CLK0_PHOFF: u8 = 165;
    pub const PLL_RESET: u8 = 177;
    pub const CRYSTAL_LOAD: u8 = 183;
}

mod clk {
    pub const POWERDOWN: u8 = 1 << 7;
    pub const INTEGER_MODE: u8 = 1 << 6;
    pub const PLL_B: u8 = 1 << 5;
    pub const INVERT: u8 = 1 << 4;
    pub const INPUT_MULTISYNTH: u8 = 3 << 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pll {
    A,
    B,
}

impl Pll {
    fn index(self) -> usize {
        self as usize
    }

    fn config_reg(self) -> u8 {
        match self {
            Pll::A => reg::PLL_A,
            Pll::B => reg::PLL_B,
        }
    }

    fn reset_bit(self) -> u8 {
        match self {
            Pll::A => 1 << 5,
            Pll::B => 1 << 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrystalLoad {
    Pf6 = 1,
    Pf8 = 2,
    #[default]
    Pf10 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveStrength {
    Ma2 = 0,
    Ma4 = 1,
    Ma6 = 2,
    #[default]
    Ma8 = 3,
}

/// Output level while a clock is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledState {
    Low = 0,
    High = 1,
    HighImpedance = 2,
    NeverDisabled = 3,
}

/// Per-output routing chosen by `init_clock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    pub pll: Pll,
    /// Shift by 90° through the phase offset; also inverts.
    pub quadrature: bool,
    pub invert: bool,
    pub drive: DriveStrength,
}

impl ClockConfig {
    pub fn new(pll: Pll) -> Self {
        Self {
            pll,
            quadrature: false,
            invert: false,
            drive: DriveStrength::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Output {
    config: ClockConfig,
    div: Option<u32>,
    rdiv: u8,
}

/// Best rational approximation of `n / d` with a denominator no larger
/// than `max_denom`, by continued fractions. Returns the input unchanged
/// when `d` already fits.
pub fn approximate_fraction(n: u64, d: u64, max_denom: u64) -> (u64, u64) {
    if d <= max_denom {
        return (n, d);
    }
    let (mut num, mut denom) = (n, d);
    let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
    while denom != 0 {
        let a = num / denom;
        let q2 = q0 + a * q1;
        if q2 > max_denom {
            break;
        }
        let p2 = p0 + a * p1;
        (p0, q0, p1, q1) = (p1, q1, p2, q2);
        (num, denom) = (denom, num % denom);
    }
    (p1, q1)
}

/// The 8-byte divider block for `whole + num / denom`, with the R divider
/// exponent in the top nibble of byte 2.
pub fn divider_registers(whole: u32, num: u32, denom: u32, rdiv: u8) -> [u8; 8] {
    let (whole, num, denom) = (whole as u64, num as u64, denom as u64);
    let frac = 128 * num / denom;
    let p1 = (128 * whole + frac).saturating_sub(512) as u32;
    let p2 = (128 * num - denom * frac) as u32;
    let p3 = denom as u32;
    [
        (p3 >> 8) as u8,
        p3 as u8,
        ((p1 >> 16) & 0x03) as u8 | (rdiv & 0x07) << 4,
        (p1 >> 8) as u8,
        p1 as u8,
        ((p3 >> 12) & 0xF0) as u8 | ((p2 >> 16) & 0x0F) as u8,
        (p2 >> 8) as u8,
        p2 as u8,
    ]
}

pub struct Si5351<I2C> {
    i2c: I2C,
    address: u8,
    crystal_hz: u32,
    vco: [Option<f64>; 2],
    outputs: [Option<Output>; OUTPUTS as usize],
}

impl<I2C: I2c> Si5351<I2C> {
    /// Waits for the power-on self init, then disables and powers down
    /// every output and sets the crystal load.
    pub fn new(i2c: I2C, address: u8, crystal_hz: u32, load: CrystalLoad) -> Result<Self, I2C::Error> {
        let mut dev = Self {
            i2c,
            address,
            crystal_hz,
            vco: [None; 2],
            outputs: [None; OUTPUTS as usize],
        };
        let mut polls = 0;
        while dev.read_reg(reg::DEVICE_STATUS)? & SYS_INIT != 0 {
            polls += 1;
            if polls >= INIT_POLL_LIMIT {
                return Err(Error::Timeout);
            }
        }
        dev.write_reg(reg::OUTPUT_ENABLE, 0xFF)?;
        dev.write_block(reg::CLK0_CONTROL, &[clk::POWERDOWN; 8])?;
        dev.write_reg(reg::CRYSTAL_LOAD, (load as u8) << 6)?;
        log::debug!("SI5351 ready, crystal {} Hz", crystal_hz);
        Ok(dev)
    }

    /// Route an output. Takes effect at the next divider setup.
    pub fn init_clock(&mut self, output: u8, config: ClockConfig) -> Result<(), I2C::Error> {
        let index = check_output::<I2C::Error>(output)?;
        self.outputs[index] = Some(Output {
            config,
            div: None,
            rdiv: 0,
        });
        Ok(())
    }

    pub fn enable_output(&mut self, output: u8) -> Result<(), I2C::Error> {
        check_output::<I2C::Error>(output)?;
        let mask = self.read_reg(reg::OUTPUT_ENABLE)?;
        self.write_reg(reg::OUTPUT_ENABLE, mask & !(1 << output))
    }

    pub fn disable_output(&mut self, output: u8) -> Result<(), I2C::Error> {
        check_output::<I2C::Error>(output)?;
        let mask = self.read_reg(reg::OUTPUT_ENABLE)?;
        self.write_reg(reg::OUTPUT_ENABLE, mask | (1 << output))
    }

    /// VCO = crystal * (mul + num / denom).
    pub fn setup_pll(&mut self, pll: Pll, mul: u32, num: u32, denom: u32) -> Result<(), I2C::Error> {
        if !(PLL_MUL_MIN..=PLL_MUL_MAX).contains(&(mul as u64)) {
            return Err(Error::InvalidArgument("PLL multiplier must be 15..=90"));
        }
        if denom == 0 || denom > DENOM_MAX || num >= DENOM_MAX {
            return Err(Error::InvalidArgument("PLL fraction out of range"));
        }
        self.write_block(pll.config_reg(), &divider_registers(mul, num, denom, 0))?;
        self.vco[pll.index()] = Some(self.crystal_hz as f64 * (mul as f64 + num as f64 / denom as f64));
        Ok(())
    }

    pub fn vco_hz(&self, pll: Pll) -> Option<f64> {
        self.vco[pll.index()]
    }

    /// Output = VCO / (div + num / denom) / 2^rdiv. A changed integer
    /// divider also rewrites the phase offset, resets the PLL and
    /// reprograms the clock control register.
    pub fn setup_multisynth(
        &mut self,
        output: u8,
        div: u32,
        num: u32,
        denom: u32,
        rdiv: u8,
    ) -> Result<(), I2C::Error> {
        let index = check_output::<I2C::Error>(output)?;
        let out = self.outputs[index].ok_or(Error::<I2C::Error>::InvalidArgument("output not initialised"))?;
        if !(4..MS_DIV_MAX as u32).contains(&div) {
            return Err(Error::InvalidArgument("MultiSynth divider must be 4..=2047"));
        }
        if denom == 0 || denom > DENOM_MAX || rdiv > R_DIV_MAX {
            return Err(Error::InvalidArgument("MultiSynth fraction out of range"));
        }
        if out.config.quadrature && div > PHASE_MAX {
            return Err(Error::InvalidArgument("quadrature needs a divider of at most 127"));
        }
        self.write_block(
            reg::MULTISYNTH0 + 8 * output,
            &divider_registers(div, num, denom, rdiv),
        )?;
        if out.div != Some(div) {
            self.set_phase(output, if out.config.quadrature { div } else { 0 })?;
            self.reset_pll(out.config.pll)?;
            self.init_multisynth(output, num == 0)?;
        }
        self.outputs[index] = Some(Output {
            div: Some(div),
            rdiv,
            ..out
        });
        Ok(())
    }

    /// Phase offset in quarter periods of the VCO.
    pub fn set_phase(&mut self, output: u8, offset: u32) -> Result<(), I2C::Error> {
        check_output::<I2C::Error>(output)?;
        if offset > PHASE_MAX {
            return Err(Error::InvalidArgument("phase offset must be 0..=127"));
        }
        self.write_reg(reg::CLK0_PHOFF + output, offset as u8)
    }

    pub fn reset_pll(&mut self, pll: Pll) -> Result<(), I2C::Error> {
        self.write_reg(reg::PLL_RESET, pll.reset_bit())
    }

    /// Power the output up with its routing, drive and polarity.
    pub fn init_multisynth(&mut self, output: u8, integer_mode: bool) -> Result<(), I2C::Error> {
        let index = check_output::<I2C::Error>(output)?;
        let out = self.outputs[index].ok_or(Error::<I2C::Error>::InvalidArgument("output not initialised"))?;
        let mut value = clk::INPUT_MULTISYNTH | out.config.drive as u8;
        if integer_mode {
            value |= clk::INTEGER_MODE;
        }
        if out.config.invert || out.config.quadrature {
            value |= clk::INVERT;
        }
        if out.config.pll == Pll::B {
            value |= clk::PLL_B;
        }
        self.write_reg(reg::CLK0_CONTROL + output, value)
    }

    /// Keep the PLL and pick the MultiSynth and R dividers for `freq_hz`.
    pub fn set_freq_fixed_pll(&mut self, output: u8, freq_hz: f64) -> Result<(), I2C::Error> {
        let index = check_output::<I2C::Error>(output)?;
        let out = self.outputs[index].ok_or(Error::<I2C::Error>::InvalidArgument("output not initialised"))?;
        let vco = self.vco[out.config.pll.index()]
            .ok_or(Error::<I2C::Error>::InvalidArgument("PLL not set up"))?;
        if freq_hz <= 0.0 {
            return Err(Error::InvalidArgument("frequency must be positive"));
        }

        let mut freq = freq_hz;
        let mut rdiv = 0;
        while freq * MS_DIV_MAX as f64 <= vco {
            if rdiv == R_DIV_MAX {
                return Err(Error::InvalidArgument("frequency below the R divider range"));
            }
            freq *= 2.0;
            rdiv += 1;
        }

        // tenths of a hertz
        let vco = (10.0 * vco) as u64;
        let denom = (10.0 * freq) as u64;
        if denom == 0 {
            return Err(Error::InvalidArgument("frequency must be positive"));
        }
        let div = vco / denom;
        if !(MS_DIV_MIN..MS_DIV_MAX).contains(&div) {
            return Err(Error::InvalidArgument("MultiSynth divider out of range"));
        }
        let (num, denom) = approximate_fraction(vco % denom, denom, DENOM_MAX as u64);
        self.setup_multisynth(output, div as u32, num as u32, denom as u32, rdiv)
    }

    /// Keep the output's current dividers and retune its PLL to `freq_hz`.
    pub fn set_freq_fixed_ms(&mut self, output: u8, freq_hz: f64) -> Result<(), I2C::Error> {
        let index = check_output::<I2C::Error>(output)?;
        let out = self.outputs[index].ok_or(Error::<I2C::Error>::InvalidArgument("output not initialised"))?;
        let div = out
            .div
            .ok_or(Error::<I2C::Error>::InvalidArgument("MultiSynth not set up"))?;
        if freq_hz <= 0.0 {
            return Err(Error::InvalidArgument("frequency must be positive"));
        }

        let vco = (10.0 * freq_hz * div as f64 * (1u32 << out.rdiv) as f64) as u64;
        let denom = 10 * self.crystal_hz as u64;
        let mul = vco / denom;
        if !(PLL_MUL_MIN..PLL_MUL_MAX).contains(&mul) {
            return Err(Error::InvalidArgument("PLL multiplier out of range"));
        }
        let (num, denom) = approximate_fraction(vco % denom, denom, DENOM_MAX as u64);
        self.setup_pll(out.config.pll, mul as u32, num as u32, denom as u32)
    }

    /// Disabled-state levels live two bits per clock across two registers
    /// (CLK0..3, CLK4..7).
    pub fn set_disabled_state(&mut self, clock: u8, state: DisabledState) -> Result<(), I2C::Error> {
        let (reg, slot) = match clock {
            0..=3 => (reg::DIS_STATE_1, clock),
            4..=7 => (reg::DIS_STATE_2, clock - 4),
            _ => return Err(Error::InvalidArgument("clock must be 0..=7")),
        };
        let shift = slot * 2;
        let value = self.read_reg(reg)?;
        self.write_reg(reg, (value & !(0x03 << shift)) | (state as u8) << shift)
    }

    /// Set bits stop the OEB pin from gating those clocks.
    pub fn disable_oeb(&mut self, mask: u8) -> Result<(), I2C::Error> {
        self.write_reg(reg::OEB_ENABLE, mask)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), I2C::Error> {
        self.write_block(reg, &[value])
    }

    fn write_block(&mut self, reg: u8, values: &[u8]) -> Result<(), I2C::Error> {
        let mut frame = [0u8; 9];
        frame[0] = reg;
        frame[1..=values.len()].copy_from_slice(values);
        self.i2c
            .write(self.address, &frame[..=values.len()])
            .map_err(Error::Bus)
    }
}

fn check_output<E>(output: u8) -> Result<usize, E> {
    if output >= OUTPUTS {
        return Err(Error::InvalidArgument("output must be 0..=2"));
    }
    Ok(output as usize)
}
