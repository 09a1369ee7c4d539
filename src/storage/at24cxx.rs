// AT24Cxx serial EEPROM (AT24C32 .. AT24C512)
//
// 16-bit memory address sent big-endian ahead of every transfer. Writes
// land in a 64-byte page buffer and wrap inside the page, so a write that
// would cross a page boundary is split into one transaction per page.
// Each page write starts a self-timed program cycle (max 5 ms) during
// which the chip NACKs.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x50;
pub const PAGE_SIZE: usize = 64;

const WRITE_CYCLE_MS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipSize {
    /// 32 Kbit, 4 KiB
    At24c32,
    /// 64 Kbit, 8 KiB
    At24c64,
    /// 128 Kbit, 16 KiB
    At24c128,
    /// 256 Kbit, 32 KiB
    #[default]
    At24c256,
    /// 512 Kbit, 64 KiB
    At24c512,
}

impl ChipSize {
    pub const fn bytes(self) -> u32 {
        match self {
            ChipSize::At24c32 => 4096,
            ChipSize::At24c64 => 8192,
            ChipSize::At24c128 => 16384,
            ChipSize::At24c256 => 32768,
            ChipSize::At24c512 => 65536,
        }
    }
}

pub struct At24cxx<I2C> {
    i2c: I2C,
    address: u8,
    size: ChipSize,
}

impl<I2C: I2c> At24cxx<I2C> {
    pub fn new(i2c: I2C, size: ChipSize, address: u8) -> Self {
        Self { i2c, address, size }
    }

    pub fn size(&self) -> ChipSize {
        self.size
    }

    pub fn capacity(&self) -> u32 {
        self.size.bytes()
    }

    pub fn write_byte<D: DelayNs>(
        &mut self,
        mem: u16,
        value: u8,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        self.check_range(mem, 1)?;
        let [hi, lo] = mem.to_be_bytes();
        self.i2c
            .write(self.address, &[hi, lo, value])
            .map_err(Error::Bus)?;
        delay.delay_ms(WRITE_CYCLE_MS);
        Ok(())
    }

    pub fn read_byte(&mut self, mem: u16) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.read_sequence(mem, &mut buf)?;
        Ok(buf[0])
    }

    /// Write `data` starting at `mem`, one transaction per page touched.
    pub fn write_page<D: DelayNs>(
        &mut self,
        mem: u16,
        data: &[u8],
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        self.check_range(mem, data.len())?;

        let mut addr = mem as usize;
        let mut rest = data;
        let mut frame = [0u8; PAGE_SIZE + 2];
        while !rest.is_empty() {
            let page_end = (addr / PAGE_SIZE + 1) * PAGE_SIZE;
            let n = rest.len().min(page_end - addr);
            let [hi, lo] = (addr as u16).to_be_bytes();
            frame[0] = hi;
            frame[1] = lo;
            frame[2..2 + n].copy_from_slice(&rest[..n]);
            self.i2c
                .write(self.address, &frame[..2 + n])
                .map_err(Error::Bus)?;
            delay.delay_ms(WRITE_CYCLE_MS);

            log::debug!("at24: wrote {} bytes at {:#06x}", n, addr);
            addr += n;
            rest = &rest[n..];
        }
        Ok(())
    }

    /// Sequential read; the chip's address counter rolls over at the end
    /// of memory, so the range is checked up front.
    pub fn read_sequence(&mut self, mem: u16, buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.check_range(mem, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        self.i2c
            .write_read(self.address, &mem.to_be_bytes(), buf)
            .map_err(Error::Bus)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn check_range(&self, mem: u16, len: usize) -> Result<(), I2C::Error> {
        if mem as u32 + len as u32 > self.size.bytes() {
            return Err(Error::InvalidArgument("EEPROM access past end of memory"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{MockDelay, MockI2c};
    use std::vec::Vec;

    fn eeprom(size: ChipSize) -> (At24cxx<MockI2c>, MockI2c) {
        let bus = MockI2c::wide();
        (At24cxx::new(bus.clone(), size, DEFAULT_ADDRESS), bus)
    }

    #[test]
    fn test_byte_roundtrip() {
        let (mut rom, bus) = eeprom(ChipSize::At24c256);
        let mut delay = MockDelay::default();
        rom.write_byte(0x1234, 0xA5, &mut delay).unwrap();
        assert_eq!(bus.last_write().unwrap(), [0x12, 0x34, 0xA5]);
        assert_eq!(delay.elapsed_ms(), 5);
        assert_eq!(rom.read_byte(0x1234).unwrap(), 0xA5);
    }

    #[test]
    fn test_page_write_splits_on_boundary() {
        let (mut rom, bus) = eeprom(ChipSize::At24c256);
        let mut delay = MockDelay::default();
        let data: Vec<u8> = (0..100).collect();
        rom.write_page(60, &data, &mut delay).unwrap();

        let writes = bus.written();
        assert_eq!(writes.len(), 3);
        // 60..64, 64..128, 128..160
        assert_eq!(&writes[0][..2], &[0x00, 60]);
        assert_eq!(writes[0].len() - 2, 4);
        assert_eq!(&writes[1][..2], &[0x00, 64]);
        assert_eq!(writes[1].len() - 2, 64);
        assert_eq!(&writes[2][..2], &[0x00, 128]);
        assert_eq!(writes[2].len() - 2, 32);
        assert_eq!(delay.elapsed_ms(), 15);

        let mut back = [0u8; 100];
        rom.read_sequence(60, &mut back).unwrap();
        assert_eq!(&back[..], &data[..]);
    }

    #[test]
    fn test_aligned_page_is_one_write() {
        let (mut rom, bus) = eeprom(ChipSize::At24c32);
        let mut delay = MockDelay::default();
        rom.write_page(128, &[0x55; 64], &mut delay).unwrap();
        assert_eq!(bus.written().len(), 1);
    }

    #[test]
    fn test_range_checks() {
        let (mut rom, bus) = eeprom(ChipSize::At24c32);
        let mut delay = MockDelay::default();
        assert!(matches!(
            rom.write_byte(4096, 1, &mut delay),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            rom.write_page(4090, &[0; 8], &mut delay),
            Err(Error::InvalidArgument(_))
        ));
        let mut buf = [0u8; 6];
        assert!(rom.read_sequence(4090, &mut buf).is_ok());
        assert!(bus.written().len() == 1);
    }

    #[test]
    fn test_last_byte_of_largest_chip() {
        let (mut rom, _) = eeprom(ChipSize::At24c512);
        let mut delay = MockDelay::default();
        rom.write_byte(0xFFFF, 0x42, &mut delay).unwrap();
        assert_eq!(rom.read_byte(0xFFFF).unwrap(), 0x42);
    }
}
