// CC2530/CC2531 ZigBee UART bridge
//
// Configuration and addressed sends travel as binary frames:
// `02 A8 79 C3 <cmd> <payload>`. Replies repeat the header and carry a
// tag byte; query commands return their data after the tag, setters
// answer `OK` or `ER`. Anything without the header is transparent data.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use crate::error::{Error, Result};

pub const PREFIX: [u8; 4] = [0x02, 0xA8, 0x79, 0xC3];
pub const MAX_PAYLOAD: usize = 32;
pub const SHORT_ADDR_COORDINATOR: u16 = 0x0000;
pub const SHORT_ADDR_NOT_JOINED: u16 = 0xFFFE;
pub const CHANNELS: core::ops::RangeInclusive<u8> = 11..=25;

const REPLY_WAIT_MS: u32 = 50;
const TX_SETTLE_MS: u32 = 100;
const FRAME_LEN: usize = 64;

mod cmd {
    pub const STATUS: u8 = 0x01;
    pub const QUERY_INTERVAL: u8 = 0x02;
    pub const FACTORY_RESET: u8 = 0x03;
    pub const PANID: u8 = 0x04;
    pub const PANID_CHANNEL: u8 = 0x05;
    pub const BAUD: u8 = 0x06;
    pub const LOW_POWER: u8 = 0x07;
    pub const SEEK_TIME: u8 = 0x08;
    pub const CHANNEL: u8 = 0x09;
    pub const NODE_TO_COORD: u8 = 0x0A;
    pub const COORD_TO_NODE: u8 = 0x0B;
    pub const MAC: u8 = 0x0C;
    pub const SHORT_ADDR: u8 = 0x0D;
    pub const READ_SHORT_ADDR: u8 = 0x0E;
    pub const NODE_TO_NODE: u8 = 0x0F;
}

// Tags whose replies carry data rather than OK/ER.
const DATA_TAGS: [u8; 7] = [
    cmd::STATUS,
    cmd::PANID_CHANNEL,
    cmd::MAC,
    cmd::COORD_TO_NODE,
    cmd::READ_SHORT_ADDR,
    cmd::NODE_TO_NODE,
    cmd::NODE_TO_COORD,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    NotJoined,
    EndDeviceJoined,
    RouterJoined,
    CoordinatorStarting,
    CoordinatorStarted,
}

impl JoinStatus {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(JoinStatus::NotJoined),
            0x06 => Some(JoinStatus::EndDeviceJoined),
            0x07 => Some(JoinStatus::RouterJoined),
            0x08 => Some(JoinStatus::CoordinatorStarting),
            0x09 => Some(JoinStatus::CoordinatorStarted),
            _ => None,
        }
    }

    pub fn is_joined(self) -> bool {
        !matches!(self, JoinStatus::NotJoined | JoinStatus::CoordinatorStarting)
    }
}

/// Incoming traffic, borrowed from the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received<'a> {
    Transparent(&'a [u8]),
    FromNode { source: u16, data: &'a [u8] },
    FromCoordinator(&'a [u8]),
    NodeToNode { source: u16, target: u16, data: &'a [u8] },
}

/// Parse one frame as it arrived on the wire.
pub fn parse_frame<E>(frame: &[u8]) -> Result<Received<'_>, E> {
    if frame.len() < PREFIX.len() + 1 || frame[..PREFIX.len()] != PREFIX {
        return Ok(Received::Transparent(frame));
    }
    let body = &frame[PREFIX.len() + 1..];
    let word = |i: usize| u16::from_be_bytes([body[i], body[i + 1]]);
    match frame[PREFIX.len()] {
        cmd::NODE_TO_NODE if body.len() >= 4 => Ok(Received::NodeToNode {
            source: word(0),
            target: word(2),
            data: &body[4..],
        }),
        cmd::NODE_TO_COORD if body.len() >= 2 => Ok(Received::FromNode {
            source: word(0),
            data: &body[2..],
        }),
        cmd::COORD_TO_NODE => Ok(Received::FromCoordinator(body)),
        _ => Err(Error::InvalidResponse),
    }
}

pub struct Cc253x<U> {
    uart: U,
    frame: [u8; FRAME_LEN],
}

impl<U: Read + Write + ReadReady> Cc253x<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            frame: [0; FRAME_LEN],
        }
    }

    pub fn status<D: DelayNs>(&mut self, delay: &mut D) -> Result<JoinStatus, U::Error> {
        let data = self.query(cmd::STATUS, &[], delay)?;
        data.first()
            .copied()
            .and_then(JoinStatus::from_code)
            .ok_or(Error::InvalidResponse)
    }

    pub fn set_query_interval<D: DelayNs>(&mut self, ms: u16, delay: &mut D) -> Result<(), U::Error> {
        self.set(cmd::QUERY_INTERVAL, &ms.to_be_bytes(), delay)
    }

    pub fn factory_reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.set(cmd::FACTORY_RESET, &[], delay)
    }

    pub fn set_panid<D: DelayNs>(&mut self, panid: u16, delay: &mut D) -> Result<(), U::Error> {
        self.set(cmd::PANID, &panid.to_be_bytes(), delay)
    }

    pub fn panid_channel<D: DelayNs>(&mut self, delay: &mut D) -> Result<(u16, u8), U::Error> {
        let data = self.query(cmd::PANID_CHANNEL, &[], delay)?;
        match data {
            [hi, lo, channel, ..] => Ok((u16::from_be_bytes([*hi, *lo]), *channel)),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Baud table index 0..=4 as the module numbers it.
    pub fn set_baud_index<D: DelayNs>(&mut self, index: u8, delay: &mut D) -> Result<(), U::Error> {
        if index > 4 {
            return Err(Error::InvalidArgument("baud index must be 0..=4"));
        }
        self.set(cmd::BAUD, &[index], delay)
    }

    pub fn enter_low_power<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.set(cmd::LOW_POWER, &[], delay)
    }

    pub fn set_seek_time<D: DelayNs>(&mut self, seconds: u8, delay: &mut D) -> Result<(), U::Error> {
        if !(1..=65).contains(&seconds) {
            return Err(Error::InvalidArgument("seek time must be 1..=65 s"));
        }
        self.set(cmd::SEEK_TIME, &[seconds], delay)
    }

    pub fn set_channel<D: DelayNs>(&mut self, channel: u8, delay: &mut D) -> Result<(), U::Error> {
        if !CHANNELS.contains(&channel) {
            return Err(Error::InvalidArgument("ZigBee channel must be 11..=25"));
        }
        self.set(cmd::CHANNEL, &[channel], delay)
    }

    pub fn mac<D: DelayNs>(&mut self, delay: &mut D) -> Result<[u8; 8], U::Error> {
        let data = self.query(cmd::MAC, &[], delay)?;
        data.get(..8)
            .and_then(|mac| mac.try_into().ok())
            .ok_or(Error::InvalidResponse)
    }

    pub fn set_short_addr<D: DelayNs>(&mut self, addr: u16, delay: &mut D) -> Result<(), U::Error> {
        self.set(cmd::SHORT_ADDR, &addr.to_be_bytes(), delay)
    }

    pub fn short_addr<D: DelayNs>(&mut self, delay: &mut D) -> Result<u16, U::Error> {
        let data = self.query(cmd::READ_SHORT_ADDR, &[], delay)?;
        match data {
            [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(Error::InvalidResponse),
        }
    }

    pub fn send_transparent(&mut self, data: &[u8]) -> Result<(), U::Error> {
        self.uart.write_all(data).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)
    }

    pub fn send_to_coordinator<D: DelayNs>(&mut self, data: &[u8], delay: &mut D) -> Result<(), U::Error> {
        self.send_addressed(cmd::NODE_TO_COORD, &[], data, delay)
    }

    pub fn send_to_node<D: DelayNs>(&mut self, target: u16, data: &[u8], delay: &mut D) -> Result<(), U::Error> {
        self.send_addressed(cmd::COORD_TO_NODE, &target.to_be_bytes(), data, delay)
    }

    pub fn send_node_to_node<D: DelayNs>(
        &mut self,
        source: u16,
        target: u16,
        data: &[u8],
        delay: &mut D,
    ) -> Result<(), U::Error> {
        let [s0, s1] = source.to_be_bytes();
        let [t0, t1] = target.to_be_bytes();
        self.send_addressed(cmd::NODE_TO_NODE, &[s0, s1, t0, t1], data, delay)
    }

    /// Whatever is buffered, split into transparent or addressed data.
    /// `None` when the line is idle.
    pub fn receive<'a>(&mut self, buf: &'a mut [u8]) -> Result<Option<Received<'a>>, U::Error> {
        let n = self.read_available(buf)?;
        if n == 0 {
            return Ok(None);
        }
        parse_frame::<U::Error>(&buf[..n]).map(Some)
    }

    pub fn release(self) -> U {
        self.uart
    }

    fn send_addressed<D: DelayNs>(
        &mut self,
        command: u8,
        header: &[u8],
        data: &[u8],
        delay: &mut D,
    ) -> Result<(), U::Error> {
        if data.is_empty() || data.len() > MAX_PAYLOAD {
            return Err(Error::InvalidArgument("ZigBee payload must be 1..=32 bytes"));
        }
        let len = self.write_frame(command, &[header, data])?;
        log::debug!("cc253x: cmd {:#04x}, {} byte frame", command, len);
        delay.delay_ms(TX_SETTLE_MS);
        Ok(())
    }

    fn set<D: DelayNs>(&mut self, command: u8, payload: &[u8], delay: &mut D) -> Result<(), U::Error> {
        let data = self.query(command, payload, delay)?;
        match data {
            b"OK" => Ok(()),
            b"ER" => Err(Error::Device(command)),
            _ => Err(Error::InvalidResponse),
        }
    }

    fn query<D: DelayNs>(&mut self, command: u8, payload: &[u8], delay: &mut D) -> Result<&[u8], U::Error> {
        let mut stale = [0u8; 16];
        while self.read_available(&mut stale)? > 0 {}
        self.write_frame(command, &[payload])?;
        delay.delay_ms(REPLY_WAIT_MS);

        let mut frame = [0u8; FRAME_LEN];
        let n = self.read_available(&mut frame)?;
        if n == 0 {
            return Err(Error::Timeout);
        }
        if n <= PREFIX.len() || frame[..PREFIX.len()] != PREFIX {
            return Err(Error::InvalidResponse);
        }
        let tag = frame[PREFIX.len()];
        let body = &frame[PREFIX.len() + 1..n];
        if !DATA_TAGS.contains(&tag) && body != b"OK" && body != b"ER" {
            log::warn!("cc253x: unexpected reply tag {:#04x}", tag);
            return Err(Error::InvalidResponse);
        }
        self.frame = frame;
        Ok(&self.frame[PREFIX.len() + 1..n])
    }

    fn write_frame(&mut self, command: u8, parts: &[&[u8]]) -> Result<usize, U::Error> {
        let mut frame = [0u8; FRAME_LEN];
        frame[..PREFIX.len()].copy_from_slice(&PREFIX);
        frame[PREFIX.len()] = command;
        let mut len = PREFIX.len() + 1;
        for part in parts {
            frame[len..len + part.len()].copy_from_slice(part);
            len += part.len();
        }
        self.uart.write_all(&frame[..len]).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;
        Ok(len)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, U::Error> {
        let mut got = 0;
        while got < buf.len() && self.uart.read_ready().map_err(Error::Bus)? {
            let n = self.uart.read(&mut buf[got..]).map_err(Error::Bus)?;
            if n == 0 {
                break;
            }
            got += n;
        }
        Ok(got)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::mock::{MockDelay, MockSerial};

    fn reply(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&PREFIX);
        frame.push(tag);
        frame.extend_from_slice(body);
        frame
    }

    fn radio() -> (Cc253x<MockSerial>, MockSerial, MockDelay) {
        let uart = MockSerial::new();
        (Cc253x::new(uart.clone()), uart, MockDelay::new())
    }

    #[test]
    fn test_status_query() {
        let (mut zb, uart, mut delay) = radio();
        uart.queue_reply(&reply(cmd::STATUS, &[0x09]));
        assert_eq!(zb.status(&mut delay).unwrap(), JoinStatus::CoordinatorStarted);
        assert_eq!(uart.sent(), [0x02, 0xA8, 0x79, 0xC3, 0x01]);
        assert_eq!(delay.elapsed_ms(), 50);
    }

    #[test]
    fn test_setters_read_ok_or_er() {
        let (mut zb, uart, mut delay) = radio();
        uart.queue_reply(&reply(0x00, b"OK"));
        zb.set_channel(0x0B, &mut delay).unwrap();
        assert_eq!(uart.sent(), [0x02, 0xA8, 0x79, 0xC3, 0x09, 0x0B]);

        uart.queue_reply(&reply(0x00, b"ER"));
        assert_eq!(zb.set_query_interval(3000, &mut delay), Err(Error::Device(cmd::QUERY_INTERVAL)));
        assert!(zb.set_channel(26, &mut delay).is_err());
        assert!(zb.set_seek_time(0, &mut delay).is_err());
    }

    #[test]
    fn test_panid_channel_and_mac() {
        let (mut zb, uart, mut delay) = radio();
        uart.queue_reply(&reply(cmd::PANID_CHANNEL, &[0x12, 0x34, 0x0F]));
        uart.queue_reply(&reply(cmd::MAC, &[1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(zb.panid_channel(&mut delay).unwrap(), (0x1234, 0x0F));
        assert_eq!(zb.mac(&mut delay).unwrap(), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_silence_and_garbage() {
        let (mut zb, uart, mut delay) = radio();
        assert_eq!(zb.short_addr(&mut delay), Err(Error::Timeout));
        uart.queue_reply(b"hello");
        assert_eq!(zb.short_addr(&mut delay), Err(Error::InvalidResponse));
    }

    #[test]
    fn test_addressed_send_frames() {
        let (mut zb, uart, mut delay) = radio();
        zb.send_to_node(0x1A2B, b"hi", &mut delay).unwrap();
        assert_eq!(uart.sent(), [0x02, 0xA8, 0x79, 0xC3, 0x0B, 0x1A, 0x2B, b'h', b'i']);
        assert_eq!(delay.elapsed_ms(), 100);
        assert!(zb.send_to_coordinator(&[0u8; 33], &mut delay).is_err());
    }

    #[test]
    fn test_receive_classifies_frames() {
        let (mut zb, uart, _) = radio();
        let mut buf = [0u8; 32];
        assert_eq!(zb.receive(&mut buf).unwrap(), None);

        uart.inject(&reply(cmd::NODE_TO_NODE, &[0x00, 0x01, 0x00, 0x02, b'x']));
        assert_eq!(
            zb.receive(&mut buf).unwrap(),
            Some(Received::NodeToNode { source: 1, target: 2, data: b"x" })
        );

        uart.inject(b"plain");
        assert_eq!(zb.receive(&mut buf).unwrap(), Some(Received::Transparent(b"plain")));
    }
}
