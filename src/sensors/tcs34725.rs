// TCS34725 RGB + clear light sensor
//
// Every register access goes through a command byte: bit 7 set, bits 6:5
// select auto-increment, bits 4:0 the register. Channel data is 16-bit
// little-endian. Integration time is ATIME = 256 - cycles of 2.4 ms.
// The clear-channel interrupt fires when C leaves the threshold window
// for the configured number of consecutive cycles; it stays asserted
// until the special clear command is sent.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use micromath::F32Ext;

use crate::error::{Error, Result};

pub const ADDRESS: u8 = 0x29;

const COMMAND: u8 = 0x80;
const AUTO_INCREMENT: u8 = 0x20;
const CLEAR_INTERRUPT: u8 = 0xE6;

const CYCLE_MS: f32 = 2.4;
const MAX_CYCLES: u32 = 256;
const POLL_LIMIT: u32 = 1000;

mod reg {
    pub const ENABLE: u8 = 0x00;
    pub const ATIME: u8 = 0x01;
    pub const AILT: u8 = 0x04;
    pub const AIHT: u8 = 0x06;
    pub const APERS: u8 = 0x0C;
    pub const CONTROL: u8 = 0x0F;
    pub const ID: u8 = 0x12;
    pub const STATUS: u8 = 0x13;
    pub const CDATA: u8 = 0x14;
}

mod enable {
    pub const PON: u8 = 0x01;
    pub const AEN: u8 = 0x02;
    pub const AIEN: u8 = 0x10;
}

const STATUS_AVALID: u8 = 0x01;
const STATUS_AINT: u8 = 0x10;

// TCS34725 and TCS34727
const KNOWN_IDS: [u8; 2] = [0x44, 0x4D];

/// Consecutive out-of-window cycles before the interrupt fires, indexed by
/// the APERS value.
const PERSISTENCE: [u8; 16] = [0, 1, 2, 3, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    #[default]
    X1,
    X4,
    X16,
    X60,
}

impl Gain {
    pub fn factor(self) -> u8 {
        match self {
            Gain::X1 => 1,
            Gain::X4 => 4,
            Gain::X16 => 16,
            Gain::X60 => 60,
        }
    }
}

/// Raw channel counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgbc {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub clear: u16,
}

/// Clear-channel interrupt settings. `cycles == None` means disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub cycles: Option<u8>,
    pub low: u16,
    pub high: u16,
}

/// Correlated colour temperature (K) and illuminance (lux) estimated from
/// the RGB counts.
pub fn temperature_and_lux(data: Rgbc) -> (f32, f32) {
    let (r, g, b) = (data.red as f32, data.green as f32, data.blue as f32);
    let x = -0.14282 * r + 1.54924 * g - 0.95641 * b;
    let y = -0.32466 * r + 1.57837 * g - 0.73191 * b;
    let z = -0.68202 * r + 0.77073 * g + 0.56332 * b;
    let sum = x + y + z;
    if sum == 0.0 {
        return (0.0, y);
    }
    let n = (x / sum - 0.3320) / (0.1858 - y / sum);
    let cct = 449.0 * n.powi(3) + 3525.0 * n.powi(2) + 6823.3 * n + 5520.33;
    (cct, y)
}

/// Gamma-corrected 8-bit RGB, each channel normalised by clear.
pub fn html_rgb(data: Rgbc) -> (u8, u8, u8) {
    if data.clear == 0 {
        return (0, 0, 0);
    }
    let scale = |v: u16| -> u8 {
        let ratio = ((v as f32 / data.clear as f32) * 256.0).floor() / 255.0;
        (ratio.powf(2.5) * 255.0).clamp(0.0, 255.0) as u8
    };
    (scale(data.red), scale(data.green), scale(data.blue))
}

/// `html_rgb` packed as 0xRRGGBB, ready for `{:06x}`.
pub fn html_hex(data: Rgbc) -> u32 {
    let (r, g, b) = html_rgb(data);
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

pub struct Tcs34725<I2C> {
    i2c: I2C,
    address: u8,
    active: bool,
    cycles: u32,
}

impl<I2C: I2c> Tcs34725<I2C> {
    /// Checks the ID register and sets the shortest integration time.
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        let mut dev = Self {
            i2c,
            address,
            active: false,
            cycles: 1,
        };
        let id = dev.sensor_id()?;
        if !KNOWN_IDS.contains(&id) {
            log::warn!("TCS34725: unexpected id {:#04x}", id);
            return Err(Error::InvalidResponse);
        }
        dev.set_integration_time(CYCLE_MS)?;
        Ok(dev)
    }

    pub fn sensor_id(&mut self) -> Result<u8, I2C::Error> {
        self.read8(reg::ID)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Power on and start the ADC, or stop both. Power-on needs 2.4 ms
    /// before AEN.
    pub fn set_active<D: DelayNs>(&mut self, on: bool, delay: &mut D) -> Result<(), I2C::Error> {
        if self.active == on {
            return Ok(());
        }
        let value = self.read8(reg::ENABLE)?;
        if on {
            self.write8(reg::ENABLE, value | enable::PON)?;
            delay.delay_ms(3);
            self.write8(reg::ENABLE, value | enable::PON | enable::AEN)?;
        } else {
            self.write8(reg::ENABLE, value & !(enable::PON | enable::AEN))?;
        }
        self.active = on;
        Ok(())
    }

    /// Integration time actually programmed, in ms.
    pub fn integration_time(&self) -> f32 {
        self.cycles as f32 * CYCLE_MS
    }

    /// Clamped to 2.4..=614.4 ms and rounded down to whole cycles.
    pub fn set_integration_time(&mut self, ms: f32) -> Result<(), I2C::Error> {
        let ms = ms.clamp(CYCLE_MS, MAX_CYCLES as f32 * CYCLE_MS);
        let cycles = ((ms / CYCLE_MS + 1e-3) as u32).clamp(1, MAX_CYCLES);
        self.cycles = cycles;
        self.write8(reg::ATIME, (MAX_CYCLES - cycles) as u8)
    }

    pub fn gain(&mut self) -> Result<Gain, I2C::Error> {
        Ok(match self.read8(reg::CONTROL)? & 0x03 {
            0 => Gain::X1,
            1 => Gain::X4,
            2 => Gain::X16,
            _ => Gain::X60,
        })
    }

    pub fn set_gain(&mut self, gain: Gain) -> Result<(), I2C::Error> {
        self.write8(reg::CONTROL, gain as u8)
    }

    pub fn threshold(&mut self) -> Result<Threshold, I2C::Error> {
        let low = self.read16(reg::AILT)?;
        let high = self.read16(reg::AIHT)?;
        let cycles = if self.read8(reg::ENABLE)? & enable::AIEN != 0 {
            Some(PERSISTENCE[(self.read8(reg::APERS)? & 0x0F) as usize])
        } else {
            None
        };
        Ok(Threshold { cycles, low, high })
    }

    /// Program the clear-channel window. `cycles` must be one of the
    /// persistence steps (0, 1, 2, 3, 5, 10 ... 60); `None` disables the
    /// interrupt.
    pub fn set_threshold(&mut self, threshold: Threshold) -> Result<(), I2C::Error> {
        let apers = match threshold.cycles {
            Some(c) => Some(
                PERSISTENCE
                    .iter()
                    .position(|&p| p == c)
                    .ok_or(Error::<I2C::Error>::InvalidArgument("unsupported persistence cycle count"))?,
            ),
            None => None,
        };
        self.write16(reg::AILT, threshold.low)?;
        self.write16(reg::AIHT, threshold.high)?;
        let value = self.read8(reg::ENABLE)?;
        match apers {
            Some(index) => {
                self.write8(reg::ENABLE, value | enable::AIEN)?;
                self.write8(reg::APERS, index as u8)
            }
            None => self.write8(reg::ENABLE, value & !enable::AIEN),
        }
    }

    pub fn interrupt_pending(&mut self) -> Result<bool, I2C::Error> {
        Ok(self.read8(reg::STATUS)? & STATUS_AINT != 0)
    }

    pub fn clear_interrupt(&mut self) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[CLEAR_INTERRUPT])
            .map_err(Error::Bus)
    }

    /// One full integration. The sensor is powered for the read and
    /// returned to its previous state afterwards.
    pub fn read_raw<D: DelayNs>(&mut self, delay: &mut D) -> Result<Rgbc, I2C::Error> {
        let was_active = self.active;
        self.set_active(true, delay)?;
        let mut polls = 0;
        while self.read8(reg::STATUS)? & STATUS_AVALID == 0 {
            if polls >= POLL_LIMIT {
                return Err(Error::Timeout);
            }
            delay.delay_ms(self.integration_time().ceil() as u32);
            polls += 1;
        }
        let mut buf = [0u8; 8];
        self.i2c
            .write_read(self.address, &[command(reg::CDATA)], &mut buf)
            .map_err(Error::Bus)?;
        self.set_active(was_active, delay)?;
        let word = |i: usize| u16::from_le_bytes([buf[i], buf[i + 1]]);
        Ok(Rgbc {
            clear: word(0),
            red: word(2),
            green: word(4),
            blue: word(6),
        })
    }

    /// `(colour temperature K, lux)`
    pub fn read<D: DelayNs>(&mut self, delay: &mut D) -> Result<(f32, f32), I2C::Error> {
        Ok(temperature_and_lux(self.read_raw(delay)?))
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read8(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[command(reg)], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    fn write8(&mut self, reg: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[command(reg), value])
            .map_err(Error::Bus)
    }

    fn read16(&mut self, reg: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[command(reg)], &mut buf)
            .map_err(Error::Bus)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn write16(&mut self, reg: u8, value: u16) -> Result<(), I2C::Error> {
        let [lo, hi] = value.to_le_bytes();
        self.i2c
            .write(self.address, &[command(reg), lo, hi])
            .map_err(Error::Bus)
    }
}

const fn command(reg: u8) -> u8 {
    COMMAND | AUTO_INCREMENT | reg
}
