// TM1637 four-digit seven-segment LED driver
//
// Two-wire serial link that looks like I2C without addresses: START is
// DIO falling while CLK is high, bytes go LSB first and the chip pulls
// DIO low on a ninth clock as acknowledge. A display update is three
// frames: data command (auto-increment), address command followed by the
// segment bytes, display control with the brightness. Bit 7 of the second
// digit drives the colon.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::error::{Error, Result};

pub const DIGITS: usize = 4;
pub const MAX_BRIGHTNESS: u8 = 7;

const CMD_DATA: u8 = 0x40;
const CMD_ADDRESS: u8 = 0xC0;
const CMD_DISPLAY: u8 = 0x80;
const DISPLAY_ON: u8 = 0x08;
const COLON: u8 = 0x80;
// highest address the chip accepts (six-digit variants)
const MAX_POSITION: u8 = 5;
const BIT_DELAY_US: u32 = 10;

// 0-9, a-z, blank, dash, degree
const SEGMENTS: [u8; 39] = [
    0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F, 0x77, 0x7C, 0x39, 0x5E, 0x79,
    0x71, 0x3D, 0x76, 0x06, 0x1E, 0x76, 0x38, 0x55, 0x54, 0x3F, 0x73, 0x67, 0x50, 0x6D, 0x78,
    0x3E, 0x1C, 0x2A, 0x76, 0x6E, 0x5B, 0x00, 0x40, 0x63,
];
const BLANK: u8 = SEGMENTS[36];
const DASH: u8 = SEGMENTS[37];
const DEGREE: u8 = SEGMENTS[38];

/// Segment pattern for a hex digit; only the low nibble is used.
pub fn encode_digit(digit: u8) -> u8 {
    SEGMENTS[(digit & 0x0F) as usize]
}

/// Segment pattern for a character the display can show: digits, letters
/// (case-insensitive), space, `-` and `*` (degree sign).
pub fn encode_char(c: char) -> Option<u8> {
    Some(match c {
        ' ' => BLANK,
        '-' => DASH,
        '*' => DEGREE,
        '0'..='9' => SEGMENTS[c as usize - '0' as usize],
        'a'..='z' => SEGMENTS[c as usize - 'a' as usize + 10],
        'A'..='Z' => SEGMENTS[c as usize - 'A' as usize + 10],
        _ => return None,
    })
}

fn encode_text(text: &str, out: &mut [u8]) -> Result<usize> {
    let mut n = 0;
    for (slot, c) in out.iter_mut().zip(text.chars()) {
        *slot = encode_char(c).ok_or(Error::<()>::InvalidArgument("character has no segment pattern"))?;
        n += 1;
    }
    Ok(n)
}

/// Right-align `value` in `out` as ASCII, padding with `pad`. The caller
/// clamps `value` so it fits.
fn render_decimal(value: i32, pad: u8, out: &mut [u8]) {
    out.fill(pad);
    let mut rest = value.unsigned_abs();
    let mut i = out.len();
    loop {
        i -= 1;
        out[i] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 || i == 0 {
            break;
        }
    }
    if value < 0 && i > 0 {
        out[i - 1] = b'-';
    }
}

pub struct Tm1637<CLK, DIO, D> {
    clk: CLK,
    dio: DIO,
    delay: D,
    brightness: u8,
}

impl<CLK, DIO, D> Tm1637<CLK, DIO, D>
where
    CLK: OutputPin,
    DIO: InputPin + OutputPin,
    D: DelayNs,
{
    /// Idle both lines high and switch the display on at full brightness.
    pub fn new(mut clk: CLK, mut dio: DIO, delay: D) -> Result<Self> {
        clk.set_high().map_err(Error::pin)?;
        dio.set_high().map_err(Error::pin)?;
        let mut tm = Self {
            clk,
            dio,
            delay,
            brightness: MAX_BRIGHTNESS,
        };
        tm.command(CMD_DATA)?;
        tm.command(tm.display_control())?;
        Ok(tm)
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, level: u8) -> Result<()> {
        if level > MAX_BRIGHTNESS {
            return Err(Error::InvalidArgument("brightness must be 0..=7"));
        }
        self.brightness = level;
        self.command(CMD_DATA)?;
        self.command(self.display_control())
    }

    /// Raw segment bytes starting at digit `pos`.
    pub fn write(&mut self, segments: &[u8], pos: u8) -> Result<()> {
        if pos > MAX_POSITION {
            return Err(Error::InvalidArgument("position must be 0..=5"));
        }
        self.command(CMD_DATA)?;
        self.start()?;
        self.write_byte(CMD_ADDRESS | pos)?;
        for &seg in segments {
            self.write_byte(seg)?;
        }
        self.stop()?;
        self.command(self.display_control())
    }

    /// First four characters of `text`; `colon` lights the centre colon.
    pub fn show(&mut self, text: &str, colon: bool) -> Result<()> {
        let mut segs = [0u8; DIGITS];
        let n = encode_text(text, &mut segs)?;
        if colon && n > 1 {
            segs[1] |= COLON;
        }
        self.write(&segs[..n], 0)
    }

    /// Right-aligned integer, clamped to -999..=9999.
    pub fn number(&mut self, value: i32) -> Result<()> {
        let mut text = [0u8; DIGITS];
        render_decimal(value.clamp(-999, 9999), b' ', &mut text);
        self.write_ascii(&text, false)
    }

    /// Two zero-padded pairs, each clamped to -9..=99, as in a clock face.
    pub fn numbers(&mut self, left: i32, right: i32, colon: bool) -> Result<()> {
        let mut text = [0u8; DIGITS];
        render_decimal(left.clamp(-9, 99), b'0', &mut text[..2]);
        render_decimal(right.clamp(-9, 99), b'0', &mut text[2..]);
        self.write_ascii(&text, colon)
    }

    /// Four lowercase hex digits.
    pub fn hex(&mut self, value: u16) -> Result<()> {
        let segs: [u8; DIGITS] = core::array::from_fn(|i| encode_digit((value >> (12 - 4 * i)) as u8));
        self.write(&segs, 0)
    }

    /// Two digits followed by `°C`; out-of-range values show `lo` or `hi`.
    pub fn temperature(&mut self, celsius: i32) -> Result<()> {
        if celsius < -9 {
            self.show("lo", false)?;
        } else if celsius > 99 {
            self.show("hi", false)?;
        } else {
            let mut text = [0u8; 2];
            render_decimal(celsius, b' ', &mut text);
            let segs = [ascii_segment(text[0]), ascii_segment(text[1])];
            self.write(&segs, 0)?;
        }
        self.write(&[DEGREE, SEGMENTS[12]], 2)
    }

    /// Slide `text` in from the right and out to the left, `step_ms` per
    /// frame.
    pub fn scroll(&mut self, text: &str, step_ms: u32) -> Result<()> {
        let len = text.chars().count();
        for c in text.chars() {
            encode_char(c).ok_or(Error::<()>::InvalidArgument("character has no segment pattern"))?;
        }
        let segment_at = |i: usize| -> u8 {
            match i.checked_sub(DIGITS) {
                Some(k) if k < len => text.chars().nth(k).and_then(encode_char).unwrap_or(BLANK),
                _ => BLANK,
            }
        };
        for frame in 0..len + DIGITS + 1 {
            let segs: [u8; DIGITS] = core::array::from_fn(|d| segment_at(frame + d));
            self.write(&segs, 0)?;
            self.delay.delay_ms(step_ms);
        }
        Ok(())
    }

    pub fn release(self) -> (CLK, DIO, D) {
        (self.clk, self.dio, self.delay)
    }

    fn write_ascii(&mut self, text: &[u8; DIGITS], colon: bool) -> Result<()> {
        let mut segs: [u8; DIGITS] = core::array::from_fn(|i| ascii_segment(text[i]));
        if colon {
            segs[1] |= COLON;
        }
        self.write(&segs, 0)
    }

    fn display_control(&self) -> u8 {
        CMD_DISPLAY | DISPLAY_ON | self.brightness
    }

    // ── wire protocol ───────────────────────────────────────────────

    fn command(&mut self, cmd: u8) -> Result<()> {
        self.start()?;
        self.write_byte(cmd)?;
        self.stop()
    }

    fn start(&mut self) -> Result<()> {
        self.dio.set_low().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        self.clk.set_low().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.dio.set_low().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        self.clk.set_high().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        self.dio.set_high().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        for i in 0..8 {
            self.dio
                .set_state(PinState::from(byte >> i & 1 != 0))
                .map_err(Error::pin)?;
            self.delay.delay_us(BIT_DELAY_US);
            self.clock()?;
        }
        // ninth clock: the chip pulls DIO low to acknowledge
        self.dio.set_high().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        self.clk.set_high().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        let acked = self.dio.is_low().map_err(Error::pin)?;
        self.clk.set_low().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        if !acked {
            log::warn!("TM1637: no acknowledge for {:#04x}", byte);
            return Err(Error::NotPresent);
        }
        Ok(())
    }

    fn clock(&mut self) -> Result<()> {
        self.clk.set_high().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        self.clk.set_low().map_err(Error::pin)?;
        self.delay.delay_us(BIT_DELAY_US);
        Ok(())
    }
}

// Rendered text only holds characters `encode_char` knows.
fn ascii_segment(b: u8) -> u8 {
    encode_char(b as char).unwrap_or(BLANK)
}
