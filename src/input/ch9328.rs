// CH9328 UART-to-USB keyboard bridge
//
// Modes 0..=2 take printable ASCII and let the chip type it; mode 0 ends
// a line with 0x1B and mode 2 with 0x28. Mode 3 is transparent: every
// 8-byte write is forwarded as a raw HID boot-keyboard report
// (modifiers, reserved, six key codes). The mode itself is strapped on
// the chip, so `set_mode` only tells the driver what the chip expects.

use embedded_hal::delay::DelayNs;
use embedded_io::Write;

use crate::error::{Error, Result};

pub const REPORT_LEN: usize = 8;

const LINE_END_SETTLE_MS: u32 = 50;
const CHAR_SETTLE_MS: u32 = 1;
const STRING_GAP_MS: u32 = 5;

pub mod modifier {
    pub const NONE: u8 = 0x00;
    pub const LEFT_CTRL: u8 = 0x01;
    pub const LEFT_SHIFT: u8 = 0x02;
    pub const LEFT_ALT: u8 = 0x04;
    pub const LEFT_GUI: u8 = 0x08;
    pub const RIGHT_CTRL: u8 = 0x10;
    pub const RIGHT_SHIFT: u8 = 0x20;
    pub const RIGHT_ALT: u8 = 0x40;
    pub const RIGHT_GUI: u8 = 0x80;
}

/// USB HID keyboard usage codes.
pub mod key {
    pub const NONE: u8 = 0x00;
    pub const A: u8 = 0x04;
    pub const Z: u8 = 0x1D;
    pub const N1: u8 = 0x1E;
    pub const N0: u8 = 0x27;
    pub const ENTER: u8 = 0x28;
    pub const ESCAPE: u8 = 0x29;
    pub const BACKSPACE: u8 = 0x2A;
    pub const TAB: u8 = 0x2B;
    pub const SPACE: u8 = 0x2C;
    pub const MINUS: u8 = 0x2D;
    pub const EQUAL: u8 = 0x2E;
    pub const LEFT_BRACKET: u8 = 0x2F;
    pub const RIGHT_BRACKET: u8 = 0x30;
    pub const BACKSLASH: u8 = 0x31;
    pub const SEMICOLON: u8 = 0x33;
    pub const APOSTROPHE: u8 = 0x34;
    pub const GRAVE: u8 = 0x35;
    pub const COMMA: u8 = 0x36;
    pub const PERIOD: u8 = 0x37;
    pub const SLASH: u8 = 0x38;
    pub const CAPS_LOCK: u8 = 0x39;
    pub const F1: u8 = 0x3A;
    pub const F12: u8 = 0x45;
    pub const PRINT_SCREEN: u8 = 0x46;
    pub const INSERT: u8 = 0x49;
    pub const HOME: u8 = 0x4A;
    pub const PAGE_UP: u8 = 0x4B;
    pub const DELETE: u8 = 0x4C;
    pub const END: u8 = 0x4D;
    pub const PAGE_DOWN: u8 = 0x4E;
    pub const RIGHT: u8 = 0x4F;
    pub const LEFT: u8 = 0x50;
    pub const DOWN: u8 = 0x51;
    pub const UP: u8 = 0x52;
    pub const MENU: u8 = 0x65;

    /// F1..=F12
    pub const fn function(n: u8) -> Option<u8> {
        if n >= 1 && n <= 12 { Some(F1 + n - 1) } else { None }
    }
}

/// Usage code and modifier a US layout needs to type `c`.
pub fn key_for_char(c: char) -> Option<(u8, u8)> {
    use key::*;
    let shift = modifier::LEFT_SHIFT;
    let plain = modifier::NONE;
    Some(match c {
        'a'..='z' => (A + (c as u8 - b'a'), plain),
        'A'..='Z' => (A + (c as u8 - b'A'), shift),
        '1'..='9' => (N1 + (c as u8 - b'1'), plain),
        '0' => (N0, plain),
        ' ' => (SPACE, plain),
        '\n' => (ENTER, plain),
        '\t' => (TAB, plain),
        '\u{8}' => (BACKSPACE, plain),
        '-' => (MINUS, plain),
        '=' => (EQUAL, plain),
        '[' => (LEFT_BRACKET, plain),
        ']' => (RIGHT_BRACKET, plain),
        '\\' => (BACKSLASH, plain),
        ';' => (SEMICOLON, plain),
        '\'' => (APOSTROPHE, plain),
        '`' => (GRAVE, plain),
        ',' => (COMMA, plain),
        '.' => (PERIOD, plain),
        '/' => (SLASH, plain),
        '!' => (N1, shift),
        '@' => (N1 + 1, shift),
        '#' => (N1 + 2, shift),
        '$' => (N1 + 3, shift),
        '%' => (N1 + 4, shift),
        '^' => (N1 + 5, shift),
        '&' => (N1 + 6, shift),
        '*' => (N1 + 7, shift),
        '(' => (N1 + 8, shift),
        ')' => (N0, shift),
        '_' => (MINUS, shift),
        '+' => (EQUAL, shift),
        '{' => (LEFT_BRACKET, shift),
        '}' => (RIGHT_BRACKET, shift),
        '|' => (BACKSLASH, shift),
        ':' => (SEMICOLON, shift),
        '"' => (APOSTROPHE, shift),
        '~' => (GRAVE, shift),
        '<' => (COMMA, shift),
        '>' => (PERIOD, shift),
        '?' => (SLASH, shift),
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Ascii0,
    Ascii1,
    Ascii2,
    Transparent,
}

pub struct Ch9328<U> {
    uart: U,
    mode: Mode,
}

impl<U: Write> Ch9328<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            mode: Mode::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Line break in the ASCII modes that support one (0 and 2).
    pub fn crlf<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        let byte = match self.mode {
            Mode::Ascii0 => 0x1B,
            Mode::Ascii2 => 0x28,
            _ => return Err(Error::InvalidArgument("line break needs mode 0 or 2")),
        };
        self.uart.write_all(&[byte]).map_err(Error::Bus)?;
        delay.delay_ms(LINE_END_SETTLE_MS);
        Ok(())
    }

    /// One printable ASCII character, typed by the chip.
    pub fn send_ascii<D: DelayNs>(&mut self, c: char, delay: &mut D) -> Result<(), U::Error> {
        if self.mode == Mode::Transparent {
            return Err(Error::InvalidArgument("ASCII input needs modes 0..=2"));
        }
        if !(' '..='~').contains(&c) {
            return Err(Error::InvalidArgument("only printable ASCII can be sent"));
        }
        self.uart.write_all(&[c as u8]).map_err(Error::Bus)?;
        delay.delay_ms(CHAR_SETTLE_MS);
        Ok(())
    }

    /// Checks every character before sending any.
    pub fn send_string<D: DelayNs>(&mut self, text: &str, delay: &mut D) -> Result<(), U::Error> {
        if !text.chars().all(|c| (' '..='~').contains(&c)) {
            return Err(Error::InvalidArgument("only printable ASCII can be sent"));
        }
        for c in text.chars() {
            self.send_ascii(c, delay)?;
            delay.delay_ms(STRING_GAP_MS);
        }
        Ok(())
    }

    pub fn send_report<D: DelayNs>(&mut self, report: &[u8; REPORT_LEN], delay: &mut D) -> Result<(), U::Error> {
        if self.mode != Mode::Transparent {
            return Err(Error::InvalidArgument("HID reports need mode 3"));
        }
        self.uart.write_all(report).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;
        delay.delay_ms(CHAR_SETTLE_MS);
        Ok(())
    }

    pub fn press<D: DelayNs>(&mut self, key: u8, modifiers: u8, delay: &mut D) -> Result<(), U::Error> {
        self.send_report(&[modifiers, 0, key, 0, 0, 0, 0, 0], delay)
    }

    /// Releases every key and modifier.
    pub fn release_all<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.send_report(&[0; REPORT_LEN], delay)
    }

    /// Press, hold for `hold_ms`, release. Also serves for hotkeys.
    pub fn tap<D: DelayNs>(&mut self, key: u8, modifiers: u8, hold_ms: u32, delay: &mut D) -> Result<(), U::Error> {
        self.press(key, modifiers, delay)?;
        delay.delay_ms(hold_ms);
        self.release_all(delay)
    }

    /// Types `text` through HID reports. Characters with no US-layout
    /// key are skipped; returns how many were typed.
    pub fn type_text<D: DelayNs>(&mut self, text: &str, gap_ms: u32, delay: &mut D) -> Result<usize, U::Error> {
        let mut typed = 0;
        for c in text.chars() {
            let Some((code, mods)) = key_for_char(c) else {
                log::warn!("ch9328: no key for {:?}, skipped", c);
                continue;
            };
            self.tap(code, mods, gap_ms, delay)?;
            delay.delay_ms(gap_ms);
            typed += 1;
        }
        Ok(typed)
    }

    pub fn release(self) -> U {
        self.uart
    }
}
