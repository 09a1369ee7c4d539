// SNR9816 text-to-speech module, UART
//
// Frames are FD <len:u16 BE> <cmd> [<encoding> <text>], where len counts
// everything after itself. Text is always sent as UTF-8 (encoding 0x04).
// Control commands answer a single byte: 0x41 ack, and for the status
// query 0x4E busy or 0x4F idle. Voice, volume, speed and tone are set
// with inline tags such as `[v5]` spoken like any other text.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use crate::error::{Error, Result};

pub const RESPONSE_TIMEOUT_MS: u32 = 100;
pub const MAX_TEXT_LEN: usize = u16::MAX as usize - 2;

const HEADER: u8 = 0xFD;
const ENCODING_UTF8: u8 = 0x04;

mod cmd {
    pub const SYNTHESIS: u8 = 0x01;
    pub const STOP: u8 = 0x02;
    pub const PAUSE: u8 = 0x03;
    pub const RESUME: u8 = 0x04;
    pub const STATUS: u8 = 0x21;
}

const ACK: u8 = 0x41;
const BUSY: u8 = 0x4E;
const IDLE: u8 = 0x4F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Busy,
    Idle,
    /// No answer, or a byte the module should not send.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    Female = 0,
    Male = 1,
}

pub struct Snr9816<U> {
    uart: U,
}

impl<U: Read + Write + ReadReady> Snr9816<U> {
    pub fn new(uart: U) -> Self {
        Self { uart }
    }

    pub fn status<D: DelayNs>(&mut self, delay: &mut D) -> Result<Status, U::Error> {
        self.drain()?;
        self.command(cmd::STATUS)?;
        Ok(match self.response(delay)? {
            Some(BUSY) => Status::Busy,
            Some(IDLE) => Status::Idle,
            _ => Status::Unknown,
        })
    }

    /// Speaks `text` if the module is idle. Returns false without
    /// sending anything when it is not.
    pub fn speak<D: DelayNs>(&mut self, text: &str, delay: &mut D) -> Result<bool, U::Error> {
        self.speak_bytes(text.as_bytes(), delay)
    }

    pub fn pause<D: DelayNs>(&mut self, delay: &mut D) -> Result<bool, U::Error> {
        self.acked(cmd::PAUSE, delay)
    }

    pub fn resume<D: DelayNs>(&mut self, delay: &mut D) -> Result<bool, U::Error> {
        self.acked(cmd::RESUME, delay)
    }

    pub fn stop<D: DelayNs>(&mut self, delay: &mut D) -> Result<bool, U::Error> {
        self.acked(cmd::STOP, delay)
    }

    pub fn set_voice<D: DelayNs>(&mut self, voice: Voice, delay: &mut D) -> Result<bool, U::Error> {
        self.tag(b'm', voice as u8, delay)
    }

    /// 0..=9
    pub fn set_volume<D: DelayNs>(&mut self, level: u8, delay: &mut D) -> Result<bool, U::Error> {
        self.tag(b'v', level, delay)
    }

    /// 0..=9
    pub fn set_speed<D: DelayNs>(&mut self, level: u8, delay: &mut D) -> Result<bool, U::Error> {
        self.tag(b's', level, delay)
    }

    /// 0..=9
    pub fn set_tone<D: DelayNs>(&mut self, level: u8, delay: &mut D) -> Result<bool, U::Error> {
        self.tag(b't', level, delay)
    }

    /// Built-in ring tones 1..=5.
    pub fn play_ringtone<D: DelayNs>(&mut self, n: u8, delay: &mut D) -> Result<bool, U::Error> {
        self.sound(b"ring_", n, delay)
    }

    pub fn play_message_tone<D: DelayNs>(&mut self, n: u8, delay: &mut D) -> Result<bool, U::Error> {
        self.sound(b"message_", n, delay)
    }

    pub fn play_alert_tone<D: DelayNs>(&mut self, n: u8, delay: &mut D) -> Result<bool, U::Error> {
        self.sound(b"alert_", n, delay)
    }

    pub fn release(self) -> U {
        self.uart
    }

    fn speak_bytes<D: DelayNs>(&mut self, text: &[u8], delay: &mut D) -> Result<bool, U::Error> {
        if text.is_empty() || text.len() > MAX_TEXT_LEN {
            return Err(Error::InvalidArgument("text must be 1..=65533 bytes"));
        }
        let status = self.status(delay)?;
        if status != Status::Idle {
            log::debug!("snr9816: not idle ({:?}), text dropped", status);
            return Ok(false);
        }
        let [hi, lo] = ((text.len() + 2) as u16).to_be_bytes();
        self.uart
            .write_all(&[HEADER, hi, lo, cmd::SYNTHESIS, ENCODING_UTF8])
            .map_err(Error::Bus)?;
        self.uart.write_all(text).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;
        Ok(true)
    }

    fn tag<D: DelayNs>(&mut self, kind: u8, level: u8, delay: &mut D) -> Result<bool, U::Error> {
        if level > 9 {
            return Err(Error::InvalidArgument("level must be 0..=9"));
        }
        self.speak_bytes(&[b'[', kind, b'0' + level, b']'], delay)
    }

    fn sound<D: DelayNs>(&mut self, prefix: &[u8], n: u8, delay: &mut D) -> Result<bool, U::Error> {
        if !(1..=5).contains(&n) {
            return Err(Error::InvalidArgument("tone number must be 1..=5"));
        }
        let mut name = [0u8; 16];
        name[..prefix.len()].copy_from_slice(prefix);
        name[prefix.len()] = b'0' + n;
        self.speak_bytes(&name[..prefix.len() + 1], delay)
    }

    fn acked<D: DelayNs>(&mut self, command: u8, delay: &mut D) -> Result<bool, U::Error> {
        self.drain()?;
        self.command(command)?;
        Ok(self.response(delay)? == Some(ACK))
    }

    fn command(&mut self, command: u8) -> Result<(), U::Error> {
        self.uart
            .write_all(&[HEADER, 0x00, 0x01, command])
            .map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)
    }

    fn response<D: DelayNs>(&mut self, delay: &mut D) -> Result<Option<u8>, U::Error> {
        let mut byte = [0u8; 1];
        for _ in 0..RESPONSE_TIMEOUT_MS {
            if self.uart.read_ready().map_err(Error::Bus)?
                && self.uart.read(&mut byte).map_err(Error::Bus)? == 1
            {
                return Ok(Some(byte[0]));
            }
            delay.delay_ms(1);
        }
        Ok(None)
    }

    fn drain(&mut self) -> Result<(), U::Error> {
        let mut scratch = [0u8; 16];
        while self.uart.read_ready().map_err(Error::Bus)? {
            if self.uart.read(&mut scratch).map_err(Error::Bus)? == 0 {
                break;
            }
        }
        Ok(())
    }
}
