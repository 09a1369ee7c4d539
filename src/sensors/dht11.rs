// DHT11 temperature/humidity sensor, single open-drain data line
//
// Host start: line high 50 ms, low 18 ms, release. The sensor answers
// with an 80 µs low/high preamble and 40 bits, each a 50 µs low followed
// by a high of ~27 µs (0) or ~70 µs (1). The line is sampled every
// microsecond and each level's width recorded; the first four widths
// belong to the handshake.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::{Error, Result};

const EXPECTED_PULSES: usize = 84;
const HANDSHAKE_PULSES: usize = 4;
// polls without a level change that end the capture
const MAX_UNCHANGED: u32 = 100;
// high widths above this many µs are 1 bits
const HIGH_LEVEL_US: u16 = 50;

pub const MIN_INTERVAL_MS: u32 = 200;

/// One reading: °C and %RH.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub temperature: f32,
    pub humidity: f32,
}

pub struct Dht11<P> {
    pin: P,
    last: Option<(u32, Reading)>,
}

impl<P: InputPin + OutputPin> Dht11<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, last: None }
    }

    /// Take a reading. Within MIN_INTERVAL_MS of the previous good one
    /// (by the caller's millisecond clock) the cached value is returned.
    pub fn measure<D: DelayNs>(&mut self, now_ms: u32, delay: &mut D) -> Result<Reading> {
        if let Some((at, reading)) = self.last {
            if now_ms.wrapping_sub(at) < MIN_INTERVAL_MS {
                return Ok(reading);
            }
        }

        let frame = read_frame(&mut self.pin, delay)?;
        let reading = Reading {
            humidity: frame[0] as f32 + frame[1] as f32 / 10.0,
            temperature: frame[2] as f32 + frame[3] as f32 / 10.0,
        };
        self.last = Some((now_ms, reading));
        Ok(reading)
    }

    /// Last good reading's temperature.
    pub fn temperature(&self) -> Option<f32> {
        self.last.map(|(_, r)| r.temperature)
    }

    pub fn humidity(&self) -> Option<f32> {
        self.last.map(|(_, r)| r.humidity)
    }

    pub fn release(self) -> P {
        self.pin
    }
}

/// Run the start handshake and return the checked 5-byte frame. Shared by
/// the DHT11 and DHT22, which differ only in how the bytes are scaled.
pub(crate) fn read_frame<P, D>(pin: &mut P, delay: &mut D) -> Result<[u8; 5]>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    send_start(pin, delay)?;
    let mut pulses = [0u16; EXPECTED_PULSES];
    let n = capture(pin, &mut pulses, delay)?;
    if n != EXPECTED_PULSES {
        log::warn!("DHT: expected {} pulses, got {}", EXPECTED_PULSES, n);
        return Err(Error::InvalidResponse);
    }

    let frame = decode_pulses(&pulses[HANDSHAKE_PULSES..]);
    let sum = frame[..4].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    if sum != frame[4] {
        return Err(Error::Checksum {
            expected: sum,
            actual: frame[4],
        });
    }
    Ok(frame)
}

fn send_start<P: OutputPin, D: DelayNs>(pin: &mut P, delay: &mut D) -> Result<()> {
    pin.set_high().map_err(Error::pin)?;
    delay.delay_ms(50);
    pin.set_low().map_err(Error::pin)?;
    delay.delay_ms(18);
    pin.set_high().map_err(Error::pin)
}

fn capture<P: InputPin, D: DelayNs>(pin: &mut P, pulses: &mut [u16], delay: &mut D) -> Result<usize> {
    let mut level = true;
    let mut idx = 0;
    let mut width = 0u16;
    let mut unchanged = 0;

    while unchanged < MAX_UNCHANGED {
        let now = pin.is_high().map_err(Error::pin)?;
        width = width.saturating_add(1);
        if now != level {
            if idx >= pulses.len() {
                return Err(Error::InvalidResponse);
            }
            pulses[idx] = width;
            idx += 1;
            width = 0;
            level = now;
            unchanged = 0;
        } else {
            unchanged += 1;
        }
        delay.delay_us(1);
    }
    Ok(idx)
}

// Even entries are the high widths of the 40 data bits.
fn decode_pulses(pulses: &[u16]) -> [u8; 5] {
    let mut bits = 0u64;
    for w in pulses.iter().step_by(2) {
        bits = (bits << 1) | (*w > HIGH_LEVEL_US) as u64;
    }
    let mut frame = [0u8; 5];
    for (i, b) in frame.iter_mut().enumerate() {
        *b = (bits >> ((4 - i) * 8)) as u8;
    }
    frame
}

#[cfg(test)]
pub(crate) mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{MockDelay, MockPin};
    use std::vec::Vec;

    // Line levels the sensor produces for `frame`, one per µs poll.
    pub(crate) fn waveform(frame: &[u8; 5]) -> Vec<bool> {
        let mut w = Vec::new();
        let mut seg = |level: bool, us: usize| w.extend(std::iter::repeat_n(level, us));
        seg(true, 20);
        seg(false, 80);
        seg(true, 80);
        seg(false, 50);
        for byte in frame {
            for i in (0..8).rev() {
                let one = byte & (1 << i) != 0;
                seg(true, if one { 70 } else { 27 });
                seg(false, 50);
            }
        }
        w
    }

    #[test]
    fn test_measure_decodes_frame() {
        let pin = MockPin::new();
        let frame = [55, 0, 24, 3, 82];
        pin.script(&waveform(&frame));

        let mut dht = Dht11::new(pin);
        let mut delay = MockDelay::new();
        let r = dht.measure(1000, &mut delay).unwrap();
        assert!((r.humidity - 55.0).abs() < 1e-4);
        assert!((r.temperature - 24.3).abs() < 1e-4);
        assert_eq!(dht.temperature(), Some(r.temperature));
    }

    #[test]
    fn test_cached_within_interval() {
        let pin = MockPin::new();
        pin.script(&waveform(&[40, 0, 20, 0, 60]));
        let mut dht = Dht11::new(pin.clone());
        let mut delay = MockDelay::new();
        dht.measure(0, &mut delay).unwrap();

        let reads = pin.reads();
        let r = dht.measure(150, &mut delay).unwrap();
        assert_eq!(pin.reads(), reads);
        assert!((r.humidity - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_checksum_mismatch() {
        let pin = MockPin::new();
        pin.script(&waveform(&[40, 0, 20, 0, 61]));
        let mut dht = Dht11::new(pin);
        let mut delay = MockDelay::new();
        assert_eq!(
            dht.measure(0, &mut delay),
            Err(Error::Checksum {
                expected: 60,
                actual: 61
            })
        );
        assert_eq!(dht.humidity(), None);
    }

    #[test]
    fn test_no_response() {
        // line never moves
        let mut dht = Dht11::new(MockPin::new());
        let mut delay = MockDelay::new();
        assert_eq!(dht.measure(0, &mut delay), Err(Error::InvalidResponse));
    }
}
