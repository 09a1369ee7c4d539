// AT-command plumbing shared by the UART radio modules
//
// A command is formatted into a fixed buffer and written in one piece.
// The reply is collected until the line has been quiet for `quiet_ms`;
// nothing at all within `timeout_ms` is a `Timeout`. Replies are short
// ASCII such as `OK`, `OK+B:9600` or several `Key:Value` lines.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use crate::error::{Error, Result};

pub const COMMAND_LEN: usize = 128;
pub const REPLY_LEN: usize = 128;

const POLL_MS: u32 = 5;

/// Fixed byte buffer with `fmt::Write`. Unlike a display buffer it
/// refuses to truncate, so a command never goes out cut short.
pub struct LineBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> LineBuf<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Lossy: invalid UTF-8 reads as empty.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends all of `bytes` or nothing.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > N - self.len {
            return false;
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }
}

impl<const N: usize> Default for LineBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for LineBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.push(s.as_bytes()) { Ok(()) } else { Err(fmt::Error) }
    }
}

pub type Reply = LineBuf<REPLY_LEN>;

impl Reply {
    /// Whole reply without surrounding whitespace.
    pub fn text(&self) -> &str {
        self.as_str().trim()
    }

    /// Text after the first `:`, or the whole reply when there is none.
    /// `OK+C:028` gives `028`.
    pub fn value(&self) -> &str {
        let text = self.text();
        match text.split_once(':') {
            Some((_, value)) => value.trim(),
            None => text,
        }
    }

    /// Value of a `key:value` line in a multi-line reply.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.text().lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    /// Values of every `key:value` line, in order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.text()
            .lines()
            .filter_map(|line| line.split_once(':').map(|(_, v)| v.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause after writing before looking for a reply.
    pub settle_ms: u32,
    pub quiet_ms: u32,
    pub timeout_ms: u32,
}

/// Throw away whatever is waiting on the line.
pub fn drain<U: Read + ReadReady>(uart: &mut U) -> Result<(), U::Error> {
    let mut scratch = [0u8; 16];
    while uart.read_ready().map_err(Error::Bus)? {
        if uart.read(&mut scratch).map_err(Error::Bus)? == 0 {
            break;
        }
    }
    Ok(())
}

/// Send one command and collect its reply.
pub fn command<U, D>(
    uart: &mut U,
    args: fmt::Arguments<'_>,
    timing: &Timing,
    delay: &mut D,
) -> Result<Reply, U::Error>
where
    U: Read + Write + ReadReady,
    D: DelayNs,
{
    let mut line = LineBuf::<COMMAND_LEN>::new();
    fmt::Write::write_fmt(&mut line, args)
        .map_err(|_| Error::<U::Error>::InvalidArgument("AT command too long"))?;
    drain(uart)?;
    uart.write_all(line.as_bytes()).map_err(Error::Bus)?;
    uart.flush().map_err(Error::Bus)?;
    log::trace!("at: > {}", line.as_str());
    delay.delay_ms(timing.settle_ms);
    let reply = read_reply(uart, timing, delay)?;
    log::trace!("at: < {}", reply.text());
    Ok(reply)
}

/// Collect bytes until the line goes quiet. A reply longer than
/// `REPLY_LEN` is `InvalidResponse`.
pub fn read_reply<U, D>(uart: &mut U, timing: &Timing, delay: &mut D) -> Result<Reply, U::Error>
where
    U: Read + ReadReady,
    D: DelayNs,
{
    let mut reply = Reply::new();
    let mut chunk = [0u8; 32];
    let mut waited = 0;
    let mut quiet = 0;
    loop {
        if uart.read_ready().map_err(Error::Bus)? {
            let n = uart.read(&mut chunk).map_err(Error::Bus)?;
            if n > 0 {
                if !reply.push(&chunk[..n]) {
                    return Err(Error::InvalidResponse);
                }
                quiet = 0;
                continue;
            }
        }
        if !reply.is_empty() && quiet >= timing.quiet_ms {
            return Ok(reply);
        }
        if reply.is_empty() && waited >= timing.timeout_ms {
            return Err(Error::Timeout);
        }
        delay.delay_ms(POLL_MS);
        waited += POLL_MS;
        quiet += POLL_MS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockSerial};

    const TIMING: Timing = Timing {
        settle_ms: 50,
        quiet_ms: 20,
        timeout_ms: 100,
    };

    #[test]
    fn test_line_buf_refuses_overflow() {
        let mut line = LineBuf::<4>::new();
        assert!(fmt::Write::write_str(&mut line, "AT+B").is_ok());
        assert!(fmt::Write::write_str(&mut line, "9").is_err());
        assert_eq!(line.as_str(), "AT+B");
    }

    #[test]
    fn test_reply_value() {
        let mut reply = Reply::new();
        reply.push(b"  OK+B:9600\r\n");
        assert_eq!(reply.value(), "9600");
        let mut bare = Reply::new();
        bare.push(b"OK\r\n");
        assert_eq!(bare.value(), "OK");
    }

    #[test]
    fn test_reply_fields() {
        let mut reply = Reply::new();
        reply.push(b"OK+B:9600\r\nOK+C:028\r\nOK+S:3\r\n");
        assert_eq!(reply.field("OK+C"), Some("028"));
        assert_eq!(reply.field("OK+P"), None);
        let mut values = reply.values();
        assert_eq!(values.next(), Some("9600"));
        assert_eq!(values.nth(1), Some("3"));
    }

    #[test]
    fn test_command_round_trip() {
        let uart = MockSerial::new();
        uart.inject(b"junk");
        uart.queue_reply(b"OK+C:005\r\n");
        let mut port = uart.clone();
        let mut delay = MockDelay::new();
        let reply = command(&mut port, format_args!("AT+C{:03}", 5), &TIMING, &mut delay).unwrap();
        assert_eq!(reply.value(), "005");
        assert_eq!(uart.sent(), b"AT+C005");
        assert_eq!(delay.elapsed_ms(), 50 + 20);
    }

    #[test]
    fn test_silence_times_out() {
        let mut uart = MockSerial::new();
        let mut delay = MockDelay::new();
        assert!(matches!(
            command(&mut uart, format_args!("AT"), &TIMING, &mut delay),
            Err(Error::Timeout)
        ));
        assert_eq!(delay.elapsed_ms(), 50 + 100);
    }
}
