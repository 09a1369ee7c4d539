// DHT22 (AM2302) temperature/humidity sensor
//
// Same single-wire handshake and 40-bit frame as the DHT11. Humidity and
// temperature are 16-bit big-endian tenths; temperature is sign-magnitude
// with bit 15 as the sign. The part needs 2 s between conversions.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::dht11::{Reading, read_frame};
use crate::error::Result;

pub const MIN_INTERVAL_MS: u32 = 2000;

pub struct Dht22<P> {
    pin: P,
    last: Option<(u32, Reading)>,
}

impl<P: InputPin + OutputPin> Dht22<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, last: None }
    }

    /// Take a reading, or return the cached one inside MIN_INTERVAL_MS.
    pub fn measure<D: DelayNs>(&mut self, now_ms: u32, delay: &mut D) -> Result<Reading> {
        if let Some((at, reading)) = self.last {
            if now_ms.wrapping_sub(at) < MIN_INTERVAL_MS {
                return Ok(reading);
            }
        }
        let reading = decode(&read_frame(&mut self.pin, delay)?);
        log::debug!("DHT22: {:.1} °C {:.1} %RH", reading.temperature, reading.humidity);
        self.last = Some((now_ms, reading));
        Ok(reading)
    }

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

fn decode(frame: &[u8; 5]) -> Reading {
    let humidity = u16::from_be_bytes([frame[0], frame[1]]);
    let raw_temp = u16::from_be_bytes([frame[2] & 0x7F, frame[3]]);
    let mut temperature = raw_temp as f32 / 10.0;
    if frame[2] & 0x80 != 0 {
        temperature = -temperature;
    }
    Reading {
        temperature,
        humidity: humidity as f32 / 10.0,
    }
}
