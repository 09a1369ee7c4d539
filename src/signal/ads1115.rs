// ADS1115 16-bit delta-sigma ADC
//
// Four inputs, single-ended or as differential pairs, through a PGA. All
// registers are 16-bit big-endian. Single-shot reads write the config with
// OS set and poll OS until the conversion is done. The pipelined variant
// (`set_conversion` + `read_rev`) returns the previous result and starts
// the next conversion in the same call. The ALERT/RDY pin is not owned
// here; callers poll it or wire it to their own interrupt.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS_MIN: u8 = 0x48;
pub const ADDRESS_MAX: u8 = 0x4B;

// longest conversion is 125 ms at 8 SPS
const CONVERSION_TIMEOUT_MS: u32 = 200;

mod reg {
    pub const CONVERSION: u8 = 0x00;
    pub const CONFIG: u8 = 0x01;
    pub const LO_THRESH: u8 = 0x02;
    pub const HI_THRESH: u8 = 0x03;
}

mod cfg {
    pub const OS_SINGLE: u16 = 0x8000;
    pub const MODE_SINGLE: u16 = 0x0100;
    pub const MODE_CONTINUOUS: u16 = 0x0000;
    pub const COMP_LATCH: u16 = 0x0004;
    pub const COMP_QUE_1: u16 = 0x0000;
    pub const COMP_QUE_NONE: u16 = 0x0003;
}

/// Programmable gain, named by full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// ±6.144 V
    TwoThirds,
    /// ±4.096 V
    One,
    /// ±2.048 V
    #[default]
    Two,
    /// ±1.024 V
    Four,
    /// ±0.512 V
    Eight,
    /// ±0.256 V
    Sixteen,
}

impl Gain {
    const fn bits(self) -> u16 {
        (self as u16) << 9
    }

    pub const fn full_scale(self) -> f32 {
        match self {
            Gain::TwoThirds => 6.144,
            Gain::One => 4.096,
            Gain::Two => 2.048,
            Gain::Four => 1.024,
            Gain::Eight => 0.512,
            Gain::Sixteen => 0.256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rate {
    Sps8,
    Sps16,
    Sps32,
    Sps64,
    #[default]
    Sps128,
    Sps250,
    Sps475,
    Sps860,
}

impl Rate {
    const fn bits(self) -> u16 {
        (self as u16) << 5
    }
}

/// Input multiplexer setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    Diff01,
    Diff03,
    Diff13,
    Diff23,
    #[default]
    A0,
    A1,
    A2,
    A3,
}

impl Channel {
    const fn bits(self) -> u16 {
        (self as u16) << 12
    }

    /// `(channel, None)` single-ended or `(p, Some(n))` differential.
    /// Pairs the mux cannot route are `None`.
    pub fn from_pair(p: u8, n: Option<u8>) -> Option<Self> {
        Some(match (p, n) {
            (0, None) => Channel::A0,
            (1, None) => Channel::A1,
            (2, None) => Channel::A2,
            (3, None) => Channel::A3,
            (0, Some(1)) => Channel::Diff01,
            (0, Some(3)) => Channel::Diff03,
            (1, Some(3)) => Channel::Diff13,
            (2, Some(3)) => Channel::Diff23,
            _ => return None,
        })
    }
}

pub struct Ads1115<I2C> {
    i2c: I2C,
    address: u8,
    gain: Gain,
    pending: (Rate, Channel),
}

impl<I2C: I2c> Ads1115<I2C> {
    pub fn new(i2c: I2C, address: u8, gain: Gain) -> Result<Self, I2C::Error> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
            return Err(Error::InvalidArgument("ADS1115 address must be 0x48..=0x4B"));
        }
        Ok(Self {
            i2c,
            address,
            gain,
            pending: (Rate::default(), Channel::default()),
        })
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn set_gain(&mut self, gain: Gain) {
        self.gain = gain;
    }

    /// Start a single conversion and wait for it.
    pub fn read<D: DelayNs>(&mut self, rate: Rate, channel: Channel, delay: &mut D) -> Result<i16, I2C::Error> {
        self.write_reg(reg::CONFIG, single_shot(self.gain, rate, channel))?;
        let mut waited = 0;
        while self.read_reg(reg::CONFIG)? & cfg::OS_SINGLE == 0 {
            if waited >= CONVERSION_TIMEOUT_MS {
                return Err(Error::Timeout);
            }
            delay.delay_ms(1);
            waited += 1;
        }
        Ok(self.read_reg(reg::CONVERSION)? as i16)
    }

    /// Rate and input used by the next `read_rev`, at whatever gain is
    /// current when it runs.
    pub fn set_conversion(&mut self, rate: Rate, channel: Channel) {
        self.pending = (rate, channel);
    }

    /// Previous conversion result; starts the configured conversion.
    pub fn read_rev(&mut self) -> Result<i16, I2C::Error> {
        let raw = self.read_reg(reg::CONVERSION)? as i16;
        let (rate, channel) = self.pending;
        self.write_reg(reg::CONFIG, single_shot(self.gain, rate, channel))?;
        Ok(raw)
    }

    /// Continuous conversion with the comparator asserting ALERT when a
    /// result leaves `low..=high`.
    pub fn alert_start(
        &mut self,
        rate: Rate,
        channel: Channel,
        high: i16,
        low: i16,
        latched: bool,
    ) -> Result<(), I2C::Error> {
        if high < low {
            return Err(Error::InvalidArgument("high threshold below low threshold"));
        }
        self.write_reg(reg::LO_THRESH, low as u16)?;
        self.write_reg(reg::HI_THRESH, high as u16)?;
        let latch = if latched { cfg::COMP_LATCH } else { 0 };
        self.write_reg(
            reg::CONFIG,
            continuous(self.gain, rate, channel) | latch,
        )
    }

    /// Continuous conversion with ALERT/RDY pulsing after each result.
    pub fn conversion_start(&mut self, rate: Rate, channel: Channel) -> Result<(), I2C::Error> {
        // Hi_thresh MSB set and Lo_thresh MSB clear turns ALERT into RDY
        self.write_reg(reg::LO_THRESH, 0x0000)?;
        self.write_reg(reg::HI_THRESH, 0x8000)?;
        self.write_reg(reg::CONFIG, continuous(self.gain, rate, channel))
    }

    /// Latest continuous-mode result.
    pub fn alert_read(&mut self) -> Result<i16, I2C::Error> {
        Ok(self.read_reg(reg::CONVERSION)? as i16)
    }

    pub fn raw_to_voltage(&self, raw: i16) -> f32 {
        raw as f32 * self.gain.full_scale() / 32768.0
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_reg(&mut self, reg: u8, value: u16) -> Result<(), I2C::Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[reg, hi, lo])
            .map_err(Error::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }
}

fn single_shot(gain: Gain, rate: Rate, channel: Channel) -> u16 {
    cfg::OS_SINGLE
        | channel.bits()
        | gain.bits()
        | cfg::MODE_SINGLE
        | rate.bits()
        | cfg::COMP_QUE_NONE
}

fn continuous(gain: Gain, rate: Rate, channel: Channel) -> u16 {
    channel.bits() | gain.bits() | cfg::MODE_CONTINUOUS | rate.bits() | cfg::COMP_QUE_1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockI2c};

    fn adc() -> (Ads1115<MockI2c>, MockI2c) {
        let bus = MockI2c::new();
        (Ads1115::new(bus.clone(), 0x48, Gain::One).unwrap(), bus)
    }

    #[test]
    fn test_config_word() {
        // datasheet default-ish: AIN0 single-ended, ±4.096 V, single shot, 128 SPS
        assert_eq!(single_shot(Gain::One, Rate::Sps128, Channel::A0), 0xC383);
        assert_eq!(single_shot(Gain::Two, Rate::Sps860, Channel::Diff01), 0x85E3);
        assert_eq!(continuous(Gain::Sixteen, Rate::Sps8, Channel::A3), 0x7A00);
    }

    #[test]
    fn test_single_shot_polls_until_ready() {
        let (mut adc, bus) = adc();
        let mut delay = MockDelay::new();
        bus.queue_read(&[0x43, 0x83]); // busy
        bus.queue_read(&[0x43, 0x83]); // busy
        bus.queue_read(&[0xC3, 0x83]); // done
        bus.queue_read(&[0xFF, 0xF0]); // -16
        let raw = adc.read(Rate::Sps128, Channel::A0, &mut delay).unwrap();
        assert_eq!(raw, -16);
        assert_eq!(delay.elapsed_ms(), 2);
        assert_eq!(bus.written()[0], [reg::CONFIG, 0xC3, 0x83]);
    }

    #[test]
    fn test_single_shot_timeout() {
        let (mut adc, bus) = adc();
        let mut delay = MockDelay::new();
        for _ in 0..=CONVERSION_TIMEOUT_MS {
            bus.queue_read(&[0x00, 0x00]);
        }
        assert!(matches!(
            adc.read(Rate::Sps8, Channel::A1, &mut delay),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn test_pipelined_read() {
        let (mut adc, bus) = adc();
        adc.set_conversion(Rate::Sps250, Channel::A2);
        bus.queue_read(&[0x12, 0x34]);
        assert_eq!(adc.read_rev().unwrap(), 0x1234);
        let expected = single_shot(Gain::One, Rate::Sps250, Channel::A2).to_be_bytes();
        assert_eq!(bus.last_write().unwrap(), [reg::CONFIG, expected[0], expected[1]]);
    }

    #[test]
    fn test_pipelined_read_follows_gain_change() {
        let (mut adc, bus) = adc();
        adc.set_conversion(Rate::Sps64, Channel::A1);
        adc.set_gain(Gain::Sixteen);
        adc.read_rev().unwrap();
        let expected = single_shot(Gain::Sixteen, Rate::Sps64, Channel::A1).to_be_bytes();
        assert_eq!(bus.last_write().unwrap(), [reg::CONFIG, expected[0], expected[1]]);
        assert_eq!(expected[0] & 0x0E, 0x0A);
    }

    #[test]
    fn test_alert_thresholds() {
        let (mut adc, bus) = adc();
        assert!(adc.alert_start(Rate::Sps8, Channel::A0, 10, 20, false).is_err());
        adc.alert_start(Rate::Sps8, Channel::A0, 0x4000, -5, true)
            .unwrap();
        let w = bus.written();
        assert_eq!(w[0], [reg::LO_THRESH, 0xFF, 0xFB]);
        assert_eq!(w[1], [reg::HI_THRESH, 0x40, 0x00]);
        assert_eq!(w[2][2] & 0x07, 0x04);
    }

    #[test]
    fn test_voltage_scaling() {
        let (adc, _) = adc();
        assert!((adc.raw_to_voltage(16384) - 2.048).abs() < 1e-4);
        assert!((adc.raw_to_voltage(-32768) + 4.096).abs() < 1e-4);
    }

    #[test]
    fn test_channel_pairs() {
        assert_eq!(Channel::from_pair(1, Some(3)), Some(Channel::Diff13));
        assert_eq!(Channel::from_pair(1, Some(2)), None);
        assert_eq!(Channel::from_pair(4, None), None);
    }
}
