// HC-14 LoRa transceiver, UART
//
// Transparent by default: bytes written are sent over the air in
// packets whose size limit depends on the air-rate setting S1..S8.
// Configuration goes through AT commands answered `OK+<k>:<value>`;
// a rejected command answers `ORDER ERROR`.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use super::at::{self, Reply, Timing};
use crate::error::{Error, Result};

pub const BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];
pub const CHANNEL_MIN: u8 = 1;
pub const CHANNEL_MAX: u8 = 50;
pub const RATE_MIN: u8 = 1;
pub const RATE_MAX: u8 = 8;
pub const POWER_MIN_DBM: u8 = 6;
pub const POWER_MAX_DBM: u8 = 20;

const DEFAULT_RATE: u8 = 3;
const RX_POLL_MS: u32 = 5;

const TIMING: Timing = Timing {
    settle_ms: 50,
    quiet_ms: 20,
    timeout_ms: 3000,
};

/// Largest over-the-air packet at air rate S1..S8.
pub const fn max_payload(rate: u8) -> usize {
    match rate {
        1 | 2 => 40,
        3 | 4 => 80,
        5 | 6 => 160,
        7 | 8 => 250,
        _ => 80,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub baud: u32,
    pub channel: u8,
    pub rate: u8,
    pub power_dbm: u8,
}

pub struct Hc14<U> {
    uart: U,
    rate: u8,
}

impl<U: Read + Write + ReadReady> Hc14<U> {
    /// Assumes factory air rate S3 until told otherwise.
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            rate: DEFAULT_RATE,
        }
    }

    pub fn check<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.expect_reply(format_args!("AT"), "OK", delay)
    }

    pub fn reset_defaults<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.expect_reply(format_args!("AT+DEFAULT"), "OK+DEFAULT", delay)?;
        self.rate = DEFAULT_RATE;
        Ok(())
    }

    pub fn baud<D: DelayNs>(&mut self, delay: &mut D) -> Result<u32, U::Error> {
        let reply = self.query(format_args!("AT+B?"), delay)?;
        parse(reply.value())
    }

    /// Takes effect after the module restarts.
    pub fn set_baud<D: DelayNs>(&mut self, baud: u32, delay: &mut D) -> Result<(), U::Error> {
        if !BAUD_RATES.contains(&baud) {
            return Err(Error::InvalidArgument("unsupported HC-14 baud rate"));
        }
        self.query(format_args!("AT+B{}", baud), delay)?;
        Ok(())
    }

    pub fn channel<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, U::Error> {
        let reply = self.query(format_args!("AT+C?"), delay)?;
        parse(reply.value())
    }

    pub fn set_channel<D: DelayNs>(&mut self, channel: u8, delay: &mut D) -> Result<(), U::Error> {
        if !(CHANNEL_MIN..=CHANNEL_MAX).contains(&channel) {
            return Err(Error::InvalidArgument("HC-14 channel must be 1..=50"));
        }
        self.query(format_args!("AT+C{:03}", channel), delay)?;
        Ok(())
    }

    pub fn rate<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, U::Error> {
        let reply = self.query(format_args!("AT+S?"), delay)?;
        let rate = parse::<u8, U::Error>(reply.value())?;
        self.rate = rate;
        Ok(rate)
    }

    pub fn set_rate<D: DelayNs>(&mut self, rate: u8, delay: &mut D) -> Result<(), U::Error> {
        if !(RATE_MIN..=RATE_MAX).contains(&rate) {
            return Err(Error::InvalidArgument("HC-14 air rate must be 1..=8"));
        }
        self.query(format_args!("AT+S{}", rate), delay)?;
        self.rate = rate;
        Ok(())
    }

    pub fn power<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, U::Error> {
        let reply = self.query(format_args!("AT+P?"), delay)?;
        parse(reply.value())
    }

    pub fn set_power<D: DelayNs>(&mut self, dbm: u8, delay: &mut D) -> Result<(), U::Error> {
        if !(POWER_MIN_DBM..=POWER_MAX_DBM).contains(&dbm) {
            return Err(Error::InvalidArgument("HC-14 power must be 6..=20 dBm"));
        }
        self.query(format_args!("AT+P{}", dbm), delay)?;
        Ok(())
    }

    pub fn version<D: DelayNs>(&mut self, delay: &mut D) -> Result<Reply, U::Error> {
        self.query(format_args!("AT+V?"), delay)
    }

    /// All four settings from one `AT+RX`, in the order the module
    /// prints them.
    pub fn params<D: DelayNs>(&mut self, delay: &mut D) -> Result<Params, U::Error> {
        let reply = self.query(format_args!("AT+RX"), delay)?;
        let mut values = reply.values();
        let mut next = || values.next().ok_or(Error::<U::Error>::InvalidResponse);
        let params = Params {
            baud: parse::<_, U::Error>(next()?)?,
            channel: parse::<_, U::Error>(next()?)?,
            rate: parse::<_, U::Error>(next()?)?,
            power_dbm: parse::<_, U::Error>(next()?)?,
        };
        self.rate = params.rate;
        Ok(params)
    }

    /// Transparent send, split into packets the current air rate allows.
    /// Returns the number of packets.
    pub fn send<D: DelayNs>(&mut self, data: &[u8], gap_ms: u32, delay: &mut D) -> Result<usize, U::Error> {
        let mut packets = 0;
        for packet in data.chunks(max_payload(self.rate)) {
            self.uart.write_all(packet).map_err(Error::Bus)?;
            self.uart.flush().map_err(Error::Bus)?;
            delay.delay_ms(gap_ms);
            packets += 1;
        }
        log::debug!("hc14: {} bytes in {} packets", data.len(), packets);
        Ok(packets)
    }

    /// Transparent receive. Stops when `buf` is full, when the line has
    /// been quiet for `quiet_ms` after some data, or at `timeout_ms`.
    /// Nothing at all by the timeout is `Timeout`.
    pub fn receive<D: DelayNs>(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u32,
        quiet_ms: u32,
        delay: &mut D,
    ) -> Result<usize, U::Error> {
        let mut got = 0;
        let mut waited = 0;
        let mut quiet = 0;
        while got < buf.len() {
            if self.uart.read_ready().map_err(Error::Bus)? {
                let n = self.uart.read(&mut buf[got..]).map_err(Error::Bus)?;
                if n > 0 {
                    got += n;
                    quiet = 0;
                    continue;
                }
            }
            if got > 0 && quiet >= quiet_ms {
                break;
            }
            if waited >= timeout_ms {
                break;
            }
            delay.delay_ms(RX_POLL_MS);
            waited += RX_POLL_MS;
            quiet += RX_POLL_MS;
        }
        if got == 0 {
            return Err(Error::Timeout);
        }
        Ok(got)
    }

    pub fn release(self) -> U {
        self.uart
    }

    fn query<D: DelayNs>(&mut self, args: core::fmt::Arguments<'_>, delay: &mut D) -> Result<Reply, U::Error> {
        let reply = at::command(&mut self.uart, args, &TIMING, delay)?;
        if reply.text() == "ORDER ERROR" {
            log::warn!("hc14: command rejected");
            return Err(Error::InvalidResponse);
        }
        Ok(reply)
    }

    fn expect_reply<D: DelayNs>(
        &mut self,
        args: core::fmt::Arguments<'_>,
        expected: &str,
        delay: &mut D,
    ) -> Result<(), U::Error> {
        let reply = self.query(args, delay)?;
        if reply.text() != expected {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }
}

fn parse<T: core::str::FromStr, E>(text: &str) -> Result<T, E> {
    text.trim().parse().map_err(|_| Error::InvalidResponse)
}
