// MLX90614 / MLX90615 infrared thermometers
//
// SMBus read-word with PEC: command byte, then data low, data high and a
// CRC-8 (poly 0x07) over address+W, command, address+R and both data
// bytes. Temperatures are 0.02 K per LSB. Bit 15 set in an object
// reading flags a measurement error. The MLX90614 reports a second
// thermopile when bit 6 of its config EEPROM word is set.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const MLX90614_ADDRESS: u8 = 0x5A;
pub const MLX90615_ADDRESS: u8 = 0x5B;

const KELVIN_PER_LSB: f32 = 0.02;
const ZERO_CELSIUS_K: f32 = 273.15;
const ERROR_FLAG: u16 = 0x8000;
const DUAL_ZONE: u16 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Mlx90614,
    Mlx90615,
}

struct Registers {
    ambient: u8,
    object1: u8,
    object2: Option<u8>,
}

impl Model {
    fn registers(self) -> Registers {
        match self {
            Model::Mlx90614 => Registers {
                ambient: 0x06,
                object1: 0x07,
                object2: Some(0x08),
            },
            Model::Mlx90615 => Registers {
                ambient: 0x26,
                object1: 0x27,
                object2: None,
            },
        }
    }
}

// EEPROM config word 1 (0x20 | 0x05)
const MLX90614_CONFIG1: u8 = 0x25;

/// SMBus packet error code over the bytes of a read-word transfer.
pub fn pec(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, &b| {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
        crc
    })
}

pub struct Mlx9061x<I2C> {
    i2c: I2C,
    address: u8,
    model: Model,
    dual_zone: bool,
}

impl<I2C: I2c> Mlx9061x<I2C> {
    /// MLX90614; reads the config word to learn the thermopile count.
    pub fn mlx90614(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        let mut dev = Self {
            i2c,
            address,
            model: Model::Mlx90614,
            dual_zone: false,
        };
        dev.dual_zone = dev.read_word(MLX90614_CONFIG1)? & DUAL_ZONE != 0;
        log::info!(
            "MLX90614 at {:#04x}, {} zone",
            address,
            if dev.dual_zone { "dual" } else { "single" }
        );
        Ok(dev)
    }

    pub fn mlx90615(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            model: Model::Mlx90615,
            dual_zone: false,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn is_dual_zone(&self) -> bool {
        self.dual_zone
    }

    /// Die temperature in °C.
    pub fn ambient_temperature(&mut self) -> Result<f32, I2C::Error> {
        let raw = self.read_word(self.model.registers().ambient)?;
        Ok(raw_to_celsius(raw))
    }

    pub fn object_temperature(&mut self) -> Result<f32, I2C::Error> {
        self.read_object(self.model.registers().object1)
    }

    /// Second thermopile; `InvalidArgument` on single-zone parts.
    pub fn object2_temperature(&mut self) -> Result<f32, I2C::Error> {
        match self.model.registers().object2 {
            Some(reg) if self.dual_zone => self.read_object(reg),
            _ => Err(Error::InvalidArgument("device has only one thermopile")),
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_object(&mut self, reg: u8) -> Result<f32, I2C::Error> {
        let raw = self.read_word(reg)?;
        if raw & ERROR_FLAG != 0 {
            return Err(Error::InvalidResponse);
        }
        Ok(raw_to_celsius(raw))
    }

    fn read_word(&mut self, command: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(self.address, &[command], &mut buf)
            .map_err(Error::Bus)?;
        let expected = pec(&[self.address << 1, command, self.address << 1 | 1, buf[0], buf[1]]);
        if expected != buf[2] {
            return Err(Error::Checksum {
                expected,
                actual: buf[2],
            });
        }
        Ok(u16::from_le_bytes([buf[0], buf[1]]))
    }
}

pub fn raw_to_celsius(raw: u16) -> f32 {
    raw as f32 * KELVIN_PER_LSB - ZERO_CELSIUS_K
}
