// MCP4725 12-bit I2C DAC
//
// Fast-write is two bytes: power-down bits and the top nibble, then the
// low byte. The full write command can also program the EEPROM that
// holds the power-on value. Reading returns 5 bytes of status, DAC
// register and EEPROM contents.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS: u8 = 0x60;
pub const ADDRESS_ALT: u8 = 0x61;
pub const VALUE_MAX: u16 = 4095;

mod cmd {
    pub const WRITE_DAC: u8 = 0x40;
    pub const WRITE_DAC_EEPROM: u8 = 0x60;
}

/// Output state while powered down; the DAC output is off in all but `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerDown {
    #[default]
    Off = 0,
    /// 1 kΩ to ground
    Pull1k = 1,
    /// 100 kΩ to ground
    Pull100k = 2,
    /// 500 kΩ to ground
    Pull500k = 3,
}

impl PowerDown {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => PowerDown::Off,
            1 => PowerDown::Pull1k,
            2 => PowerDown::Pull100k,
            _ => PowerDown::Pull500k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mcp4725Status {
    pub eeprom_write_busy: bool,
    pub power_down: PowerDown,
    pub value: u16,
    pub eeprom_power_down: PowerDown,
    pub eeprom_value: u16,
}

impl Mcp4725Status {
    pub fn parse(buf: &[u8; 5]) -> Self {
        Self {
            eeprom_write_busy: buf[0] & 0x80 == 0,
            power_down: PowerDown::from_bits(buf[0] >> 1),
            value: ((buf[1] as u16) << 4) | (buf[2] >> 4) as u16,
            eeprom_power_down: PowerDown::from_bits(buf[3] >> 5),
            eeprom_value: (((buf[3] & 0x0F) as u16) << 8) | buf[4] as u16,
        }
    }
}

pub struct Mcp4725<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Mcp4725<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        if address != ADDRESS && address != ADDRESS_ALT {
            return Err(Error::InvalidArgument("MCP4725 address must be 0x60 or 0x61"));
        }
        Ok(Self { i2c, address })
    }

    /// Fast write, output powered.
    pub fn write(&mut self, value: u16) -> Result<(), I2C::Error> {
        check_value::<I2C::Error>(value)?;
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[hi & 0x0F, lo])
            .map_err(Error::Bus)
    }

    /// Full write with power-down mode; `eeprom` also stores it as the
    /// power-on default.
    pub fn config(&mut self, power_down: PowerDown, value: u16, eeprom: bool) -> Result<(), I2C::Error> {
        check_value::<I2C::Error>(value)?;
        let c = if eeprom { cmd::WRITE_DAC_EEPROM } else { cmd::WRITE_DAC };
        let frame = [
            c | ((power_down as u8) << 1),
            (value >> 4) as u8,
            ((value & 0x0F) as u8) << 4,
        ];
        self.i2c.write(self.address, &frame).map_err(Error::Bus)
    }

    pub fn read(&mut self) -> Result<Mcp4725Status, I2C::Error> {
        let mut buf = [0u8; 5];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        Ok(Mcp4725Status::parse(&buf))
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

fn check_value<E>(value: u16) -> Result<(), E> {
    if value > VALUE_MAX {
        return Err(Error::InvalidArgument("DAC value must be 0..=4095"));
    }
    Ok(())
}
