// DS18S20 / DS1822 / DS18B20 temperature sensors on a 1-Wire bus
//
// Usage: `convert_temp` (all devices, or one ROM), wait up to 750 ms for
// 12-bit conversions, then `read_temp` each ROM. Parasite power is not
// handled; sensors need VDD wired.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::communication::onewire::{self, OneWire, Rom};
use crate::error::{Error, Result};

pub const FAMILY_DS18S20: u8 = 0x10;
pub const FAMILY_DS1822: u8 = 0x22;
pub const FAMILY_DS18B20: u8 = 0x28;

/// Worst-case conversion time at 12 bits.
pub const CONVERSION_TIME_MS: u32 = 750;

mod cmd {
    pub const CONVERT_T: u8 = 0x44;
    pub const READ_SCRATCHPAD: u8 = 0xBE;
    pub const WRITE_SCRATCHPAD: u8 = 0x4E;
    pub const READ_POWER_SUPPLY: u8 = 0xB4;
}

pub type Scratchpad = [u8; 9];

pub const fn is_supported_family(family: u8) -> bool {
    matches!(family, FAMILY_DS18S20 | FAMILY_DS1822 | FAMILY_DS18B20)
}

pub struct Ds18x20<P, D> {
    ow: OneWire<P, D>,
}

impl<P, D> Ds18x20<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(ow: OneWire<P, D>) -> Self {
        Self { ow }
    }

    /// Temperature sensors on the bus; other 1-Wire families are skipped.
    pub fn scan(&mut self, roms: &mut [Rom]) -> Result<usize> {
        let mut found = [[0u8; 8]; onewire::MAX_DEVICES];
        let n = self.ow.scan(&mut found)?;
        let mut count = 0;
        for rom in found[..n].iter().filter(|r| is_supported_family(r[0])) {
            if count == roms.len() {
                break;
            }
            roms[count] = *rom;
            count += 1;
        }
        Ok(count)
    }

    /// Start a conversion on one device, or on all of them with `None`.
    pub fn convert_temp(&mut self, rom: Option<&Rom>) -> Result<()> {
        self.address(rom)?;
        self.ow.write_byte(cmd::CONVERT_T)
    }

    /// `true` when the devices are externally powered.
    pub fn read_power_supply(&mut self, rom: Option<&Rom>) -> Result<bool> {
        self.address(rom)?;
        self.ow.write_byte(cmd::READ_POWER_SUPPLY)?;
        self.ow.read_bit()
    }

    pub fn read_scratch(&mut self, rom: &Rom) -> Result<Scratchpad> {
        self.ow.select_rom(rom)?;
        self.ow.write_byte(cmd::READ_SCRATCHPAD)?;
        let mut buf = [0u8; 9];
        self.ow.read_into(&mut buf)?;
        let crc = onewire::crc8(&buf[..8]);
        if crc != buf[8] {
            return Err(Error::Checksum {
                expected: crc,
                actual: buf[8],
            });
        }
        Ok(buf)
    }

    /// Write TH, TL and the configuration register.
    pub fn write_scratch(&mut self, rom: &Rom, data: &[u8; 3]) -> Result<()> {
        self.ow.select_rom(rom)?;
        self.ow.write_byte(cmd::WRITE_SCRATCHPAD)?;
        self.ow.write(data)
    }

    /// Last converted temperature in °C.
    pub fn read_temp(&mut self, rom: &Rom) -> Result<f32> {
        let buf = self.read_scratch(rom)?;
        decode_temperature(rom[0], &buf).ok_or(Error::InvalidResponse)
    }

    /// Conversion resolution in bits (9..=12).
    pub fn resolution(&mut self, rom: &Rom) -> Result<u8> {
        let buf = self.read_scratch(rom)?;
        Ok(((buf[4] >> 5) & 0x03) + 9)
    }

    /// Change resolution, keeping the alarm thresholds.
    pub fn set_resolution(&mut self, rom: &Rom, bits: u8) -> Result<()> {
        if !(9..=12).contains(&bits) {
            return Err(Error::InvalidArgument("resolution must be 9..=12 bits"));
        }
        let buf = self.read_scratch(rom)?;
        let config = [buf[2], buf[3], ((bits - 9) << 5) | 0x1F];
        self.write_scratch(rom, &config)
    }

    pub fn release(self) -> OneWire<P, D> {
        self.ow
    }

    fn address(&mut self, rom: Option<&Rom>) -> Result<()> {
        match rom {
            Some(rom) => self.ow.select_rom(rom),
            None => {
                self.ow.reset(false)?;
                self.ow.write_byte(onewire::cmd::SKIP_ROM)
            }
        }
    }
}

/// Scratchpad temperature for a given family code.
pub fn decode_temperature(family: u8, buf: &Scratchpad) -> Option<f32> {
    match family {
        FAMILY_DS18S20 => {
            // 0.5 °C register extended with COUNT_REMAIN / COUNT_PER_C
            let count_per_c = buf[7];
            if count_per_c == 0 {
                return None;
            }
            let t = if buf[1] != 0 {
                ((buf[0] >> 1) | 0x80) as i8 as f32
            } else {
                (buf[0] >> 1) as f32
            };
            Some(t - 0.25 + (count_per_c as f32 - buf[6] as f32) / count_per_c as f32)
        }
        FAMILY_DS1822 | FAMILY_DS18B20 => Some(i16::from_le_bytes([buf[0], buf[1]]) as f32 / 16.0),
        _ => None,
    }
}

pub fn fahrenheit(celsius: f32) -> f32 {
    celsius * 1.8 + 32.0
}

pub fn kelvin(celsius: f32) -> f32 {
    celsius + 273.15
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::communication::onewire::tests::bits_of;
    use crate::mock::{MockDelay, MockPin};
    use std::vec::Vec;

    const ROM: Rom = [0x28, 0x61, 0x64, 0x12, 0x3C, 0x7C, 0x2F, 0x27];

    fn sensor(pin: &MockPin) -> Ds18x20<MockPin, MockDelay> {
        Ds18x20::new(OneWire::new(pin.clone(), MockDelay::new()).unwrap())
    }

    fn answer(pin: &MockPin, scratch: &[u8; 9]) {
        let mut script = Vec::new();
        script.push(false);
        script.extend(bits_of(scratch));
        pin.script(&script);
    }

    #[test]
    fn test_read_temp_ds18b20() {
        let pin = MockPin::new();
        let mut s = sensor(&pin);
        answer(&pin, &[0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x70]);
        assert!((s.read_temp(&ROM).unwrap() - 25.0625).abs() < 1e-6);

        answer(&pin, &[0x5E, 0xFF, 0x4B, 0x46, 0x1F, 0xFF, 0x0C, 0x10, 0xFA]);
        assert!((s.read_temp(&ROM).unwrap() + 10.125).abs() < 1e-6);
    }

    #[test]
    fn test_crc_error() {
        let pin = MockPin::new();
        let mut s = sensor(&pin);
        answer(&pin, &[0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x71]);
        assert_eq!(
            s.read_temp(&ROM),
            Err(Error::Checksum {
                expected: 0x70,
                actual: 0x71
            })
        );
    }

    #[test]
    fn test_resolution() {
        let pin = MockPin::new();
        let mut s = sensor(&pin);
        answer(&pin, &[0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x70]);
        assert_eq!(s.resolution(&ROM).unwrap(), 12);
        assert!(matches!(
            s.set_resolution(&ROM, 13),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_ds18s20_extended() {
        // +25 °C in half degrees, COUNT_REMAIN 12 of 16
        let buf = [0x32, 0x00, 0, 0, 0xFF, 0xFF, 0x0C, 0x10, 0];
        let t = decode_temperature(FAMILY_DS18S20, &buf).unwrap();
        assert!((t - 25.0).abs() < 1e-6);

        // 0xFFFF is -0.5 °C; the half bit is dropped before extension
        let buf = [0xFF, 0xFF, 0, 0, 0xFF, 0xFF, 0x0C, 0x10, 0];
        let t = decode_temperature(FAMILY_DS18S20, &buf).unwrap();
        assert!((t + 1.0).abs() < 1e-6);

        assert_eq!(decode_temperature(0x01, &buf), None);
    }

    #[test]
    fn test_unit_conversions() {
        assert!((fahrenheit(100.0) - 212.0).abs() < 1e-4);
        assert!((kelvin(0.0) - 273.15).abs() < 1e-4);
    }
}
