// SSD1306 128x64 monochrome OLED over I2C
//
// Whole-frame RAM buffer in the controller's page layout: 8 pages of 128
// column bytes, bit 0 is the top row of the page. Drawing only touches the
// buffer; `flush` pushes all 1024 bytes with horizontal addressing.
// Internal charge pump, no reset pin.

use core::convert::Infallible;

use embedded_graphics_core::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    pixelcolor::BinaryColor,
};
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 64;
pub const PAGES: usize = (HEIGHT / 8) as usize;
pub const BUF_SIZE: usize = WIDTH as usize * PAGES;

pub const ADDRESS: u8 = 0x3C;
pub const ADDRESS_ALT: u8 = 0x3D;

// control byte: Co = 0, D/C# selects command or data stream
const CONTROL_CMD: u8 = 0x80;
const CONTROL_DATA: u8 = 0x40;

mod cmd {
    pub const SET_CONTRAST: u8 = 0x81;
    pub const ENTIRE_ON_RESUME: u8 = 0xA4;
    pub const NORMAL: u8 = 0xA6;
    pub const INVERT: u8 = 0xA7;
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;
    pub const MEM_ADDR_MODE: u8 = 0x20;
    pub const COL_ADDR: u8 = 0x21;
    pub const PAGE_ADDR: u8 = 0x22;
    pub const START_LINE: u8 = 0x40;
    pub const SEG_REMAP: u8 = 0xA1;
    pub const MUX_RATIO: u8 = 0xA8;
    pub const COM_SCAN_DEC: u8 = 0xC8;
    pub const DISPLAY_OFFSET: u8 = 0xD3;
    pub const COM_PINS: u8 = 0xDA;
    pub const CLOCK_DIV: u8 = 0xD5;
    pub const PRECHARGE: u8 = 0xD9;
    pub const VCOM_DESELECT: u8 = 0xDB;
    pub const IREF_SELECT: u8 = 0xAD;
    pub const CHARGE_PUMP: u8 = 0x8D;
}

const INIT_SEQUENCE: &[u8] = &[
    cmd::DISPLAY_OFF,
    cmd::MEM_ADDR_MODE,
    0x00, // horizontal
    cmd::START_LINE,
    cmd::SEG_REMAP,
    cmd::MUX_RATIO,
    (HEIGHT - 1) as u8,
    cmd::COM_SCAN_DEC,
    cmd::DISPLAY_OFFSET,
    0x00,
    cmd::COM_PINS,
    0x12, // alternative COM config, 64 rows
    cmd::CLOCK_DIV,
    0x80,
    cmd::PRECHARGE,
    0xF1,
    cmd::VCOM_DESELECT,
    0x30,
    cmd::SET_CONTRAST,
    0xFF,
    cmd::ENTIRE_ON_RESUME,
    cmd::NORMAL,
    cmd::IREF_SELECT,
    0x30,
    cmd::CHARGE_PUMP,
    0x14,
    cmd::DISPLAY_ON,
];

pub struct Ssd1306<I2C> {
    i2c: I2C,
    address: u8,
    // [CONTROL_DATA, frame...] so flush is a single write
    buf: [u8; BUF_SIZE + 1],
}

impl<I2C: I2c> Ssd1306<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        if address != ADDRESS && address != ADDRESS_ALT {
            return Err(Error::InvalidArgument("SSD1306 address must be 0x3C or 0x3D"));
        }
        let mut buf = [0u8; BUF_SIZE + 1];
        buf[0] = CONTROL_DATA;
        Ok(Self { i2c, address, buf })
    }

    /// Run the power-up sequence and blank the panel.
    pub fn init(&mut self) -> Result<(), I2C::Error> {
        for &c in INIT_SEQUENCE {
            self.command(c)?;
        }
        self.clear_buffer();
        self.flush()?;
        log::info!("ssd1306: {}x{} at {:#04x} ready", WIDTH, HEIGHT, self.address);
        Ok(())
    }

    pub fn clear_buffer(&mut self) {
        self.buf[1..].fill(0);
    }

    /// Set one pixel; out-of-bounds coordinates are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, on: bool) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let idx = 1 + (y as usize / 8) * WIDTH as usize + x as usize;
        let bit = 1u8 << (y % 8);
        if on {
            self.buf[idx] |= bit;
        } else {
            self.buf[idx] &= !bit;
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        let idx = 1 + (y as usize / 8) * WIDTH as usize + x as usize;
        self.buf[idx] & (1 << (y % 8)) != 0
    }

    /// Frame in controller page layout.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[1..]
    }

    pub fn flush(&mut self) -> Result<(), I2C::Error> {
        self.command(cmd::COL_ADDR)?;
        self.command(0)?;
        self.command((WIDTH - 1) as u8)?;
        self.command(cmd::PAGE_ADDR)?;
        self.command(0)?;
        self.command((PAGES - 1) as u8)?;
        self.i2c.write(self.address, &self.buf).map_err(Error::Bus)
    }

    pub fn set_contrast(&mut self, contrast: u8) -> Result<(), I2C::Error> {
        self.command(cmd::SET_CONTRAST)?;
        self.command(contrast)
    }

    pub fn invert(&mut self, invert: bool) -> Result<(), I2C::Error> {
        self.command(if invert { cmd::INVERT } else { cmd::NORMAL })
    }

    pub fn power_on(&mut self) -> Result<(), I2C::Error> {
        self.command(cmd::DISPLAY_ON)
    }

    pub fn power_off(&mut self) -> Result<(), I2C::Error> {
        self.command(cmd::DISPLAY_OFF)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn command(&mut self, c: u8) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[CONTROL_CMD, c])
            .map_err(Error::Bus)
    }
}

impl<I2C> DrawTarget for Ssd1306<I2C>
where
    I2C: I2c,
{
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 {
                continue;
            }
            self.set_pixel(x as u32, y as u32, color.is_on());
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> core::result::Result<(), Self::Error> {
        let fill = if color.is_on() { 0xFF } else { 0x00 };
        self.buf[1..].fill(fill);
        Ok(())
    }
}

impl<I2C> OriginDimensions for Ssd1306<I2C> {
    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }
}
