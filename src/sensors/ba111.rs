// BA111 TDS (total dissolved solids) + water temperature module, UART
//
// Frames are 6 bytes both ways: command/header, 4 parameter bytes,
// 8-bit sum. Measurement replies start with 0xAA; configuration commands
// answer AC 00 00 00 00 AC on success or AC <code> 00 00 00 AE on error.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use crate::error::{Error, Result};

pub const FRAME_LEN: usize = 6;
pub const RESPONSE_TIMEOUT_MS: u32 = 2000;

const POLL_MS: u32 = 10;
const SETTLE_MS: u32 = 50;

mod cmd {
    pub const READ_TDS_TEMPERATURE: u8 = 0xA0;
    pub const SET_NTC_RESISTANCE: u8 = 0xA3;
    pub const SET_NTC_B: u8 = 0xA5;
    pub const BASELINE_CALIBRATION: u8 = 0xA6;
}

const DATA_HEADER: u8 = 0xAA;
const ACK_HEADER: u8 = 0xAC;
const ERROR_TRAILER: u8 = 0xAE;
const SUCCESS: [u8; FRAME_LEN] = [ACK_HEADER, 0, 0, 0, 0, ACK_HEADER];

/// Description of the module's error codes.
pub const fn error_message(code: u8) -> &'static str {
    match code {
        1 => "command frame exception",
        2 => "busy",
        3 => "calibration failed",
        4 => "detection temperature out of range",
        _ => "unknown error",
    }
}

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

pub fn build_frame(command: u8, params: [u8; 4]) -> [u8; FRAME_LEN] {
    let mut frame = [command, params[0], params[1], params[2], params[3], 0];
    frame[5] = checksum(&frame[..5]);
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// ppm
    pub tds: f32,
    /// °C
    pub temperature: f32,
}

pub struct Ba111Tds<U> {
    uart: U,
    ntc_resistance: u32,
    ntc_b_value: u16,
    last: Option<Reading>,
}

impl<U: Read + Write + ReadReady> Ba111Tds<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            ntc_resistance: 10_000,
            ntc_b_value: 3950,
            last: None,
        }
    }

    pub fn detect<D: DelayNs>(&mut self, delay: &mut D) -> Result<Reading, U::Error> {
        let frame = build_frame(cmd::READ_TDS_TEMPERATURE, [0; 4]);
        let resp = self.transact(&frame, delay)?;
        if resp[0] != DATA_HEADER {
            return Err(Error::InvalidResponse);
        }
        let crc = checksum(&resp[..5]);
        if crc != resp[5] {
            return Err(Error::Checksum {
                expected: crc,
                actual: resp[5],
            });
        }

        let reading = Reading {
            tds: u16::from_be_bytes([resp[1], resp[2]]) as f32,
            temperature: u16::from_be_bytes([resp[3], resp[4]]) as f32 / 100.0,
        };
        log::debug!("BA111: {} ppm, {} C", reading.tds, reading.temperature);
        self.last = Some(reading);
        Ok(reading)
    }

    /// Baseline calibration; the sensor head must sit in pure water.
    pub fn calibrate<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.configure(cmd::BASELINE_CALIBRATION, [0; 4], delay)
    }

    /// NTC thermistor nominal resistance in ohms.
    pub fn set_ntc_resistance<D: DelayNs>(&mut self, ohms: u32, delay: &mut D) -> Result<(), U::Error> {
        self.configure(cmd::SET_NTC_RESISTANCE, ohms.to_be_bytes(), delay)?;
        self.ntc_resistance = ohms;
        Ok(())
    }

    pub fn set_ntc_b_value<D: DelayNs>(&mut self, b: u16, delay: &mut D) -> Result<(), U::Error> {
        let [hi, lo] = b.to_be_bytes();
        self.configure(cmd::SET_NTC_B, [hi, lo, 0, 0], delay)?;
        self.ntc_b_value = b;
        Ok(())
    }

    pub fn ntc_resistance(&self) -> u32 {
        self.ntc_resistance
    }

    pub fn ntc_b_value(&self) -> u16 {
        self.ntc_b_value
    }

    pub fn last_reading(&self) -> Option<Reading> {
        self.last
    }

    pub fn release(self) -> U {
        self.uart
    }

    fn configure<D: DelayNs>(
        &mut self,
        command: u8,
        params: [u8; 4],
        delay: &mut D,
    ) -> Result<(), U::Error> {
        let resp = self.transact(&build_frame(command, params), delay)?;
        if resp == SUCCESS {
            return Ok(());
        }
        if resp[0] == ACK_HEADER && resp[5] == ERROR_TRAILER {
            log::warn!(
                "BA111 command {:#04x} failed: {}",
                command,
                error_message(resp[1])
            );
            return Err(Error::Device(resp[1]));
        }
        Err(Error::InvalidResponse)
    }

    fn transact<D: DelayNs>(
        &mut self,
        frame: &[u8; FRAME_LEN],
        delay: &mut D,
    ) -> Result<[u8; FRAME_LEN], U::Error> {
        // drop stale bytes
        let mut scratch = [0u8; 16];
        while self.uart.read_ready().map_err(Error::Bus)? {
            if self.uart.read(&mut scratch).map_err(Error::Bus)? == 0 {
                break;
            }
        }
        delay.delay_ms(SETTLE_MS);

        self.uart.write_all(frame).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;

        let mut resp = [0u8; FRAME_LEN];
        let mut got = 0;
        let mut waited = 0;
        while got < FRAME_LEN {
            if waited > RESPONSE_TIMEOUT_MS {
                return Err(Error::Timeout);
            }
            if self.uart.read_ready().map_err(Error::Bus)? {
                got += self.uart.read(&mut resp[got..]).map_err(Error::Bus)?;
            } else {
                delay.delay_ms(POLL_MS);
                waited += POLL_MS;
            }
        }
        Ok(resp)
    }
}
