// Bit-banged 1-Wire master on one open-drain pin
//
// The pin must idle high through a pull-up; driving it high only
// releases the line. Slot timings are the standard-speed values. The
// caller is responsible for keeping interrupts from stretching a slot.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::error::{Error, Result};

/// 64-bit device id: family code, 48-bit serial, CRC.
pub type Rom = [u8; 8];

pub const MAX_DEVICES: usize = 8;

pub mod cmd {
    pub const SEARCH_ROM: u8 = 0xF0;
    pub const READ_ROM: u8 = 0x33;
    pub const MATCH_ROM: u8 = 0x55;
    pub const SKIP_ROM: u8 = 0xCC;
}

// Dallas/Maxim CRC-8 (x^8 + x^5 + x^4 + 1), one nibble at a time
const CRC_LO: [u8; 16] = [
    0x00, 0x5E, 0xBC, 0xE2, 0x61, 0x3F, 0xDD, 0x83, 0xC2, 0x9C, 0x7E, 0x20, 0xA3, 0xFD, 0x1F, 0x41,
];
const CRC_HI: [u8; 16] = [
    0x00, 0x9D, 0x23, 0xBE, 0x46, 0xDB, 0x65, 0xF8, 0x8C, 0x11, 0xAF, 0x32, 0xCA, 0x57, 0xE9, 0x74,
];

/// CRC-8 over `data`. Running it over a payload plus its CRC byte gives 0.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &b in data {
        crc ^= b;
        crc = CRC_LO[(crc & 0x0F) as usize] ^ CRC_HI[(crc >> 4) as usize];
    }
    crc
}

pub struct OneWire<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> OneWire<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(mut pin: P, delay: D) -> Result<Self> {
        pin.set_high().map_err(Error::pin)?;
        Ok(Self { pin, delay })
    }

    /// Reset pulse; `Ok(true)` when some device answered with presence.
    /// With `required`, a silent bus is `NotPresent`.
    pub fn reset(&mut self, required: bool) -> Result<bool> {
        self.low()?;
        self.delay.delay_us(480);
        self.high()?;
        self.delay.delay_us(60);
        let present = self.pin.is_low().map_err(Error::pin)?;
        self.delay.delay_us(420);
        if required && !present {
            return Err(Error::NotPresent);
        }
        Ok(present)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        self.high()?;
        self.low()?;
        self.high()?;
        self.delay.delay_us(5);
        let bit = self.pin.is_high().map_err(Error::pin)?;
        self.delay.delay_us(40);
        Ok(bit)
    }

    /// LSB first.
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut value = 0u8;
        for i in 0..8 {
            if self.read_bit()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.low()?;
        self.pin.set_state(PinState::from(bit)).map_err(Error::pin)?;
        self.delay.delay_us(60);
        self.high()
    }

    /// LSB first.
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        for i in 0..8 {
            self.write_bit(value & (1 << i) != 0)?;
        }
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        for &b in data {
            self.write_byte(b)?;
        }
        Ok(())
    }

    /// Reset, then address one device.
    pub fn select_rom(&mut self, rom: &Rom) -> Result<()> {
        self.reset(false)?;
        self.write_byte(cmd::MATCH_ROM)?;
        self.write(rom)
    }

    /// Enumerate device ROMs into `roms`; returns how many were found.
    /// Stops early once `roms` is full.
    pub fn scan(&mut self, roms: &mut [Rom]) -> Result<usize> {
        let mut count = 0;
        let mut last: Rom = [0; 8];
        let mut diff = 65u8;

        while count < roms.len() {
            match self.search_rom(&last, diff)? {
                Some((rom, next_diff)) => {
                    if crc8(&rom) != 0 {
                        log::warn!("1-Wire ROM with bad CRC: {:02x?}", rom);
                    } else {
                        roms[count] = rom;
                        count += 1;
                    }
                    last = rom;
                    diff = next_diff;
                }
                None => break,
            }
            if diff == 0 {
                break;
            }
        }

        log::debug!("1-Wire scan: {} device(s)", count);
        Ok(count)
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }

    // One pass of the ROM search tree walk. `diff` is the bit position of
    // the last branch taken towards 1; 0 in the result means no branches
    // remain.
    fn search_rom(&mut self, last: &Rom, diff: u8) -> Result<Option<(Rom, u8)>> {
        if !self.reset(false)? {
            return Ok(None);
        }
        self.write_byte(cmd::SEARCH_ROM)?;

        let mut rom: Rom = [0; 8];
        let mut next_diff = 0u8;
        let mut i = 64u8;
        for byte in 0..8 {
            let mut r = 0u8;
            for bit in 0..8 {
                let mut b = self.read_bit()?;
                if self.read_bit()? {
                    if b {
                        // no device answered this slot
                        return Ok(None);
                    }
                } else if !b && (diff > i || (last[byte] & (1 << bit) != 0 && diff != i)) {
                    b = true;
                    next_diff = i;
                }
                self.write_bit(b)?;
                if b {
                    r |= 1 << bit;
                }
                i -= 1;
            }
            rom[byte] = r;
        }
        Ok(Some((rom, next_diff)))
    }

    fn low(&mut self) -> Result<()> {
        self.pin.set_low().map_err(Error::pin)
    }

    fn high(&mut self) -> Result<()> {
        self.pin.set_high().map_err(Error::pin)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{MockDelay, MockPin};
    use std::vec::Vec;

    /// Read levels a single device produces for `bytes`, LSB first.
    pub(crate) fn bits_of(bytes: &[u8]) -> Vec<bool> {
        let mut out = Vec::new();
        for &b in bytes {
            for i in 0..8 {
                out.push(b & (1 << i) != 0);
            }
        }
        out
    }

    #[test]
    fn test_crc8_datasheet_example() {
        let rom = [0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(crc8(&rom), 0xA2);
        assert_eq!(crc8(&[0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00, 0xA2]), 0);
    }

    #[test]
    fn test_reset_presence() {
        let pin = MockPin::new();
        let mut ow = OneWire::new(pin.clone(), MockDelay::new()).unwrap();

        pin.script(&[false]);
        assert!(ow.reset(true).unwrap());

        pin.script(&[true]);
        assert!(!ow.reset(false).unwrap());

        pin.script(&[true]);
        assert_eq!(ow.reset(true), Err(Error::NotPresent));

        let (_, delay) = ow.release();
        assert_eq!(delay.elapsed_us(), 3 * 960);
    }

    #[test]
    fn test_write_byte_lsb_first() {
        let pin = MockPin::new();
        let mut ow = OneWire::new(pin.clone(), MockDelay::new()).unwrap();
        pin.clear_history();

        ow.write_byte(0x01).unwrap();
        let h = pin.history();
        // each slot: low, data, release
        assert_eq!(h.len(), 24);
        assert_eq!(&h[0..3], &[false, true, true]);
        assert_eq!(&h[3..6], &[false, false, true]);
    }

    #[test]
    fn test_read_byte() {
        let pin = MockPin::new();
        let mut ow = OneWire::new(pin.clone(), MockDelay::new()).unwrap();
        pin.script(&bits_of(&[0xB4]));
        assert_eq!(ow.read_byte().unwrap(), 0xB4);
    }

    #[test]
    fn test_scan_single_device() {
        let rom: Rom = [0x28, 0x61, 0x64, 0x12, 0x3C, 0x7C, 0x2F, 0x27];
        let pin = MockPin::new();

        let mut script = Vec::new();
        script.push(false); // presence
        for bit in bits_of(&rom) {
            script.push(bit);
            script.push(!bit);
        }
        pin.script(&script);

        let mut ow = OneWire::new(pin, MockDelay::new()).unwrap();
        let mut found = [[0u8; 8]; MAX_DEVICES];
        assert_eq!(ow.scan(&mut found).unwrap(), 1);
        assert_eq!(found[0], rom);
    }

    #[test]
    fn test_scan_empty_bus() {
        let pin = MockPin::new();
        pin.script(&[true]);
        let mut ow = OneWire::new(pin, MockDelay::new()).unwrap();
        let mut found = [[0u8; 8]; MAX_DEVICES];
        assert_eq!(ow.scan(&mut found).unwrap(), 0);
    }
}
