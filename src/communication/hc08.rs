// HC-08 Bluetooth LE serial module
//
// Transparent UART once connected; AT commands while idle. Settings are
// queried with `AT+<KEY>=?` and set with `AT+<KEY>=<value>`. `AT+RX`
// prints every basic setting as `Key:Value` lines.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use super::at::{self, Reply, Timing};
use crate::error::{Error, Result};

pub const BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];
pub const NAME_MAX: usize = 12;
pub const ADDRESS_LEN: usize = 12;

const DEFAULT_SETTLE_MS: u32 = 200;
const RX_POLL_MS: u32 = 10;
const WAKE_BYTES: [u8; 10] = [0xFF; 10];

const TIMING: Timing = Timing {
    settle_ms: 50,
    quiet_ms: 20,
    timeout_ms: 600,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Slave,
    Master,
}

/// Radio output power steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPower {
    Dbm4 = 0,
    Dbm0 = 1,
    DbmMinus6 = 2,
    DbmMinus23 = 3,
}

impl TxPower {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TxPower::Dbm4),
            1 => Some(TxPower::Dbm0),
            2 => Some(TxPower::DbmMinus6),
            3 => Some(TxPower::DbmMinus23),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

/// Twelve upper-case hex digits.
pub fn valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN
        && address
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

pub struct Hc08<U> {
    uart: U,
}

impl<U: Read + Write + ReadReady> Hc08<U> {
    pub fn new(uart: U) -> Self {
        Self { uart }
    }

    pub fn check<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        let reply = self.command(format_args!("AT"), delay)?;
        if reply.text() != "OK" {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    /// Every basic setting; look fields up with `Reply::field`, e.g.
    /// `field("Name")`.
    pub fn settings<D: DelayNs>(&mut self, delay: &mut D) -> Result<Reply, U::Error> {
        self.command(format_args!("AT+RX"), delay)
    }

    pub fn factory_default<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.command(format_args!("AT+DEFAULT"), delay)?;
        delay.delay_ms(DEFAULT_SETTLE_MS);
        Ok(())
    }

    pub fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.command(format_args!("AT+RESET"), delay)?;
        Ok(())
    }

    /// Forget the paired master address.
    pub fn clear_pairing<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.command(format_args!("AT+CLEAR"), delay)?;
        Ok(())
    }

    pub fn version<D: DelayNs>(&mut self, delay: &mut D) -> Result<Reply, U::Error> {
        self.command(format_args!("AT+VERSION"), delay)
    }

    pub fn role<D: DelayNs>(&mut self, delay: &mut D) -> Result<Role, U::Error> {
        let reply = self.command(format_args!("AT+ROLE=?"), delay)?;
        Ok(if reply.value().contains('M') { Role::Master } else { Role::Slave })
    }

    pub fn set_role<D: DelayNs>(&mut self, role: Role, delay: &mut D) -> Result<(), U::Error> {
        let letter = if role == Role::Master { 'M' } else { 'S' };
        self.command(format_args!("AT+ROLE={}", letter), delay)?;
        Ok(())
    }

    pub fn name<D: DelayNs>(&mut self, delay: &mut D) -> Result<Reply, U::Error> {
        self.command(format_args!("AT+NAME=?"), delay)
    }

    pub fn set_name<D: DelayNs>(&mut self, name: &str, delay: &mut D) -> Result<(), U::Error> {
        if name.is_empty() || name.len() > NAME_MAX {
            return Err(Error::InvalidArgument("HC-08 name must be 1..=12 bytes"));
        }
        self.command(format_args!("AT+NAME={}", name), delay)?;
        Ok(())
    }

    pub fn address<D: DelayNs>(&mut self, delay: &mut D) -> Result<Reply, U::Error> {
        self.command(format_args!("AT+ADDR=?"), delay)
    }

    pub fn set_address<D: DelayNs>(&mut self, address: &str, delay: &mut D) -> Result<(), U::Error> {
        if !valid_address(address) {
            return Err(Error::InvalidArgument("address must be 12 upper-case hex digits"));
        }
        self.command(format_args!("AT+ADDR={}", address), delay)?;
        Ok(())
    }

    pub fn tx_power<D: DelayNs>(&mut self, delay: &mut D) -> Result<TxPower, U::Error> {
        let reply = self.command(format_args!("AT+RFPM=?"), delay)?;
        reply
            .value()
            .parse::<u8>()
            .ok()
            .and_then(TxPower::from_code)
            .ok_or(Error::InvalidResponse)
    }

    pub fn set_tx_power<D: DelayNs>(&mut self, power: TxPower, delay: &mut D) -> Result<(), U::Error> {
        self.command(format_args!("AT+RFPM={}", power as u8), delay)?;
        Ok(())
    }

    /// Baud rate from a `9600,N` style reply.
    pub fn baud<D: DelayNs>(&mut self, delay: &mut D) -> Result<u32, U::Error> {
        let reply = self.command(format_args!("AT+BAUD=?"), delay)?;
        let rate = reply.value().split(',').next().unwrap_or("");
        rate.trim().parse().map_err(|_| Error::InvalidResponse)
    }

    pub fn set_baud<D: DelayNs>(&mut self, baud: u32, parity: Parity, delay: &mut D) -> Result<(), U::Error> {
        if !BAUD_RATES.contains(&baud) {
            return Err(Error::InvalidArgument("unsupported HC-08 baud rate"));
        }
        self.command(format_args!("AT+BAUD={},{}", baud, parity.letter()), delay)?;
        Ok(())
    }

    pub fn send(&mut self, data: &[u8]) -> Result<(), U::Error> {
        self.uart.write_all(data).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)
    }

    /// Waits up to `timeout_ms` for at least one byte, then returns
    /// whatever is buffered.
    pub fn receive<D: DelayNs>(&mut self, buf: &mut [u8], timeout_ms: u32, delay: &mut D) -> Result<usize, U::Error> {
        let mut waited = 0;
        loop {
            if self.uart.read_ready().map_err(Error::Bus)? {
                let n = self.uart.read(buf).map_err(Error::Bus)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            if waited >= timeout_ms {
                return Err(Error::Timeout);
            }
            delay.delay_ms(RX_POLL_MS);
            waited += RX_POLL_MS;
        }
    }

    /// Reads until `terminator` (inclusive) or `buf` is full.
    pub fn receive_until<D: DelayNs>(
        &mut self,
        buf: &mut [u8],
        terminator: u8,
        timeout_ms: u32,
        delay: &mut D,
    ) -> Result<usize, U::Error> {
        let mut got = 0;
        let mut waited = 0;
        while got < buf.len() {
            if self.uart.read_ready().map_err(Error::Bus)?
                && self.uart.read(&mut buf[got..got + 1]).map_err(Error::Bus)? == 1
            {
                got += 1;
                if buf[got - 1] == terminator {
                    return Ok(got);
                }
                continue;
            }
            if waited >= timeout_ms {
                return Err(Error::Timeout);
            }
            delay.delay_ms(RX_POLL_MS);
            waited += RX_POLL_MS;
        }
        Ok(got)
    }

    /// A burst of 0xFF brings the module out of low-power sleep.
    pub fn wake(&mut self) -> Result<(), U::Error> {
        self.send(&WAKE_BYTES)
    }

    pub fn release(self) -> U {
        self.uart
    }

    fn command<D: DelayNs>(&mut self, args: core::fmt::Arguments<'_>, delay: &mut D) -> Result<Reply, U::Error> {
        at::command(&mut self.uart, args, &TIMING, delay)
    }
}
