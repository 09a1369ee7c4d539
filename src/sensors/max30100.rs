// MAX30100 pulse oximeter / heart-rate front end
//
// Older sibling of the MAX30102: a 16-deep FIFO of 4-byte entries (IR
// then red, 16 bits each), LED currents packed into one register and a
// self-clearing temperature trigger in MODE_CONFIG. IR samples feed the
// same `HeartRateMonitor` the MAX30102 driver uses.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS: u8 = 0x57;
pub const PART_ID: u8 = 0x11;

const FIFO_DEPTH: u8 = 16;
const POLL_LIMIT: u32 = 100;

mod reg {
    pub const INT_STATUS: u8 = 0x00;
    pub const INT_ENABLE: u8 = 0x01;
    pub const FIFO_WR_PTR: u8 = 0x02;
    pub const FIFO_RD_PTR: u8 = 0x04;
    pub const FIFO_DATA: u8 = 0x05;
    pub const MODE_CONFIG: u8 = 0x06;
    pub const SPO2_CONFIG: u8 = 0x07;
    pub const LED_CONFIG: u8 = 0x09;
    pub const TEMP_INTG: u8 = 0x16;
    pub const TEMP_FRAC: u8 = 0x17;
    pub const REV_ID: u8 = 0xFE;
    pub const PART_ID: u8 = 0xFF;
}

mod mode {
    pub const SHUTDOWN: u8 = 0x80;
    pub const RESET: u8 = 0x40;
    pub const TEMP_EN: u8 = 0x08;
    pub const MASK: u8 = 0x07;
}

const SPO2_HI_RES: u8 = 0x40;

/// Sample rates in Hz, indexed by SPO2_CONFIG[4:2].
const SAMPLE_RATES: [u16; 8] = [50, 100, 167, 200, 400, 600, 800, 1000];
/// Pulse widths in µs, indexed by SPO2_CONFIG[1:0].
const PULSE_WIDTHS: [u16; 4] = [200, 400, 800, 1600];
/// LED drive per 4-bit code, in tenths of a milliamp.
pub const LED_CURRENTS: [u16; 16] = [
    0, 44, 76, 110, 142, 174, 208, 240, 271, 306, 338, 370, 402, 436, 468, 500,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    HeartRate = 0x02,
    SpO2 = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    FifoAlmostFull = 0x80,
    TemperatureReady = 0x40,
    HeartRateReady = 0x20,
    SpO2Ready = 0x10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    pub sample_rate: u16,
    pub pulse_width: u16,
    /// Tenths of a milliamp, one of `LED_CURRENTS`.
    pub red_current: u16,
    pub ir_current: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::HeartRate,
            sample_rate: 100,
            pulse_width: 1600,
            red_current: 110,
            ir_current: 110,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample {
    pub ir: u16,
    pub red: u16,
}

pub struct Max30100<I2C> {
    i2c: I2C,
    latest: Option<Sample>,
}

impl<I2C: I2c> Max30100<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c, latest: None }
    }

    pub fn setup(&mut self, config: &Config) -> Result<(), I2C::Error> {
        self.set_mode(config.mode)?;
        self.set_led_current(config.red_current, config.ir_current)?;
        self.set_spo2_config(config.sample_rate, config.pulse_width)?;
        log::debug!(
            "max30100: {:?} at {} sps, {} us",
            config.mode,
            config.sample_rate,
            config.pulse_width
        );
        Ok(())
    }

    pub fn part_id(&mut self) -> Result<u8, I2C::Error> {
        self.read_reg(reg::PART_ID)
    }

    pub fn revision(&mut self) -> Result<u8, I2C::Error> {
        self.read_reg(reg::REV_ID)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::MASK, mode as u8)
    }

    /// Currents in tenths of a milliamp; each must be an entry of
    /// `LED_CURRENTS`.
    pub fn set_led_current(&mut self, red: u16, ir: u16) -> Result<(), I2C::Error> {
        let red = lookup::<I2C::Error>(&LED_CURRENTS, red, "unsupported LED current")?;
        let ir = lookup::<I2C::Error>(&LED_CURRENTS, ir, "unsupported LED current")?;
        self.write_reg(reg::LED_CONFIG, ((red as u8) << 4) | ir as u8)
    }

    /// High-resolution SpO2 is kept as the chip has it.
    pub fn set_spo2_config(&mut self, sample_rate: u16, pulse_width: u16) -> Result<(), I2C::Error> {
        let sr = lookup::<I2C::Error>(&SAMPLE_RATES, sample_rate, "unsupported sample rate")?;
        let pw = lookup::<I2C::Error>(&PULSE_WIDTHS, pulse_width, "unsupported pulse width")?;
        self.modify(reg::SPO2_CONFIG, !SPO2_HI_RES, ((sr as u8) << 2) | pw as u8)
    }

    /// Enables one interrupt source and clears anything pending.
    pub fn enable_interrupt(&mut self, interrupt: Interrupt) -> Result<(), I2C::Error> {
        self.write_reg(reg::INT_ENABLE, interrupt as u8)?;
        self.read_reg(reg::INT_STATUS)?;
        Ok(())
    }

    /// Reading INT_STATUS clears it.
    pub fn interrupt_status(&mut self) -> Result<u8, I2C::Error> {
        self.read_reg(reg::INT_STATUS)
    }

    pub fn sample_count(&mut self) -> Result<u8, I2C::Error> {
        let write = self.read_reg(reg::FIFO_WR_PTR)?;
        let read = self.read_reg(reg::FIFO_RD_PTR)?;
        Ok((FIFO_DEPTH + (write & 0x0F) - (read & 0x0F)) % FIFO_DEPTH)
    }

    pub fn read_sample(&mut self) -> Result<Sample, I2C::Error> {
        let mut buf = [0u8; 4];
        self.i2c
            .write_read(ADDRESS, &[reg::FIFO_DATA], &mut buf)
            .map_err(Error::Bus)?;
        let sample = Sample {
            ir: u16::from_be_bytes([buf[0], buf[1]]),
            red: u16::from_be_bytes([buf[2], buf[3]]),
        };
        self.latest = Some(sample);
        Ok(sample)
    }

    /// Reads every queued sample, handing each to `f`. Returns the count.
    pub fn drain(&mut self, mut f: impl FnMut(Sample)) -> Result<usize, I2C::Error> {
        let count = self.sample_count()?;
        for _ in 0..count {
            let sample = self.read_sample()?;
            f(sample);
        }
        Ok(count as usize)
    }

    pub fn latest(&self) -> Option<Sample> {
        self.latest
    }

    pub fn shutdown(&mut self) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::SHUTDOWN, mode::SHUTDOWN)
    }

    pub fn wake_up(&mut self) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::SHUTDOWN, 0)
    }

    pub fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::RESET, mode::RESET)?;
        self.wait_clear(mode::RESET, delay)?;
        self.latest = None;
        Ok(())
    }

    /// Die temperature in °C. TEMP_EN clears itself when the
    /// conversion is done.
    pub fn temperature<D: DelayNs>(&mut self, delay: &mut D) -> Result<f32, I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::TEMP_EN, mode::TEMP_EN)?;
        self.wait_clear(mode::TEMP_EN, delay)?;
        let whole = self.read_reg(reg::TEMP_INTG)? as i8;
        let frac = self.read_reg(reg::TEMP_FRAC)? & 0x0F;
        Ok(whole as f32 + frac as f32 * 0.0625)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn wait_clear<D: DelayNs>(&mut self, bit: u8, delay: &mut D) -> Result<(), I2C::Error> {
        let mut polls = 0;
        while self.read_reg(reg::MODE_CONFIG)? & bit != 0 {
            if polls >= POLL_LIMIT {
                return Err(Error::Timeout);
            }
            delay.delay_ms(1);
            polls += 1;
        }
        Ok(())
    }

    fn modify(&mut self, reg: u8, mask: u8, value: u8) -> Result<(), I2C::Error> {
        let current = self.read_reg(reg)?;
        self.write_reg(reg, (current & !mask) | (value & mask))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(ADDRESS, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(ADDRESS, &[reg, value]).map_err(Error::Bus)
    }
}

fn lookup<E>(table: &[u16], value: u16, msg: &'static str) -> Result<usize, E> {
    table
        .iter()
        .position(|&v| v == value)
        .ok_or(Error::InvalidArgument(msg))
}
