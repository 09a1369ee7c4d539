// PCA9685 16-channel 12-bit PWM controller
//
// All channels share one frequency set by the prescaler, which only
// latches while the oscillator sleeps: sleep, write PRE_SCALE, restore
// MODE1, wait 500 µs, then set RESTART. Each channel has ON and OFF
// counter values; bit 12 of either forces the output fully on or off.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x40;
pub const CHANNELS: u8 = 16;
pub const DUTY_MAX: u16 = 4095;

const OSC_HZ: f32 = 25_000_000.0;
const FULL: u16 = 4096;
const PRESCALE_MIN: u8 = 3;

mod reg {
    pub const MODE1: u8 = 0x00;
    pub const LED0_ON_L: u8 = 0x06;
    pub const PRE_SCALE: u8 = 0xFE;
}

mod mode1 {
    pub const RESTART: u8 = 0x80;
    pub const AI: u8 = 0x20;
    pub const SLEEP: u8 = 0x10;
    pub const ALLCALL: u8 = 0x01;
}

/// PRE_SCALE value for `freq_hz`, `None` outside 24..=1526 Hz.
pub fn prescale_for(freq_hz: u32) -> Option<u8> {
    if freq_hz == 0 {
        return None;
    }
    let value = (OSC_HZ / 4096.0 / freq_hz as f32 + 0.5) as i32 - 1;
    if !(PRESCALE_MIN as i32..=255).contains(&value) {
        return None;
    }
    Some(value as u8)
}

pub struct Pca9685<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Pca9685<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Oscillator running with register auto-increment, which the
    /// four-byte channel writes in `set_pwm` rely on.
    pub fn reset(&mut self) -> Result<(), I2C::Error> {
        self.write_reg(reg::MODE1, mode1::AI | mode1::ALLCALL)
    }

    pub fn set_frequency<D: DelayNs>(&mut self, freq_hz: u32, delay: &mut D) -> Result<(), I2C::Error> {
        let prescale =
            prescale_for(freq_hz).ok_or(Error::<I2C::Error>::InvalidArgument("frequency must be 24..=1526 Hz"))?;
        let old = self.read_reg(reg::MODE1)?;
        self.write_reg(reg::MODE1, (old & !mode1::RESTART) | mode1::SLEEP)?;
        self.write_reg(reg::PRE_SCALE, prescale)?;
        self.write_reg(reg::MODE1, old & !mode1::SLEEP)?;
        delay.delay_us(500);
        self.write_reg(
            reg::MODE1,
            (old & !mode1::SLEEP) | mode1::RESTART | mode1::AI | mode1::ALLCALL,
        )?;
        log::debug!("pca9685: {} Hz, prescale {}", freq_hz, prescale);
        Ok(())
    }

    /// Frequency the current prescaler produces.
    pub fn frequency(&mut self) -> Result<u32, I2C::Error> {
        let prescale = self.read_reg(reg::PRE_SCALE)?;
        Ok((OSC_HZ / 4096.0 / (prescale as f32 + 1.0)) as u32)
    }

    /// Raw ON/OFF counter values, 0..=4096 each.
    pub fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<(), I2C::Error> {
        let base = channel_base::<I2C::Error>(channel)?;
        if on > FULL || off > FULL {
            return Err(Error::InvalidArgument("PWM counter must be 0..=4096"));
        }
        let [on_l, on_h] = on.to_le_bytes();
        let [off_l, off_h] = off.to_le_bytes();
        self.i2c
            .write(self.address, &[base, on_l, on_h, off_l, off_h])
            .map_err(Error::Bus)
    }

    pub fn pwm(&mut self, channel: u8) -> Result<(u16, u16), I2C::Error> {
        let base = channel_base::<I2C::Error>(channel)?;
        let mut buf = [0u8; 4];
        self.i2c
            .write_read(self.address, &[base], &mut buf)
            .map_err(Error::Bus)?;
        Ok((
            u16::from_le_bytes([buf[0], buf[1]]),
            u16::from_le_bytes([buf[2], buf[3]]),
        ))
    }

    /// 0 switches the channel fully off and 4095 fully on.
    pub fn set_duty(&mut self, channel: u8, duty: u16) -> Result<(), I2C::Error> {
        match duty {
            0 => self.set_pwm(channel, 0, FULL),
            DUTY_MAX => self.set_pwm(channel, FULL, 0),
            d if d < DUTY_MAX => self.set_pwm(channel, 0, d),
            _ => Err(Error::InvalidArgument("duty must be 0..=4095")),
        }
    }

    pub fn duty(&mut self, channel: u8) -> Result<u16, I2C::Error> {
        let (on, off) = self.pwm(channel)?;
        Ok(match (on, off) {
            (FULL, _) => DUTY_MAX,
            (_, FULL) => 0,
            (_, off) => off,
        })
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(Error::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }
}

fn channel_base<E>(channel: u8) -> Result<u8, E> {
    if channel >= CHANNELS {
        return Err(Error::InvalidArgument("PCA9685 channel must be 0..=15"));
    }
    Ok(reg::LED0_ON_L + 4 * channel)
}
