// MCP41010 8-bit SPI digital potentiometer
//
// Two-byte frames: command then data. Mode 0, up to 10 MHz.

use embedded_hal::spi::SpiDevice;

use crate::error::{Error, Result};

mod cmd {
    pub const WRITE_POT0: u8 = 0x11;
    pub const SHUTDOWN_POT0: u8 = 0x21;
}

pub struct Mcp41010<SPI> {
    spi: SPI,
    max_value: u8,
}

impl<SPI: SpiDevice> Mcp41010<SPI> {
    /// `max_value` caps the wiper below the 255 taps, e.g. to protect a load.
    pub fn new(spi: SPI, max_value: u8) -> Self {
        Self { spi, max_value }
    }

    pub fn set_value(&mut self, value: u8) -> Result<(), SPI::Error> {
        if value > self.max_value {
            return Err(Error::InvalidArgument("wiper value above configured maximum"));
        }
        self.send(cmd::WRITE_POT0, value)
    }

    /// Open terminal A and short the wiper to B until the next write.
    pub fn shutdown(&mut self) -> Result<(), SPI::Error> {
        self.send(cmd::SHUTDOWN_POT0, 0x00)
    }

    pub fn max_value(&self) -> u8 {
        self.max_value
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    fn send(&mut self, command: u8, data: u8) -> Result<(), SPI::Error> {
        self.spi.write(&[command, data]).map_err(Error::Bus)
    }
}
