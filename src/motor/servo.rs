// Hobby servos on a PCA9685
//
// Channels must be attached with a pulse range before use. Positional
// servos map 0..=180° linearly onto min..max µs; continuous servos map
// speed -1..=1 onto min..neutral..max. A servo marked reversed mirrors
// its angle or speed. Angles are tracked per channel so a speed-limited
// move can sweep from the last commanded position.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use micromath::F32Ext;

use super::pca9685::{CHANNELS, DUTY_MAX, Pca9685};
use crate::error::{Error, Result};

pub const DEFAULT_FREQ_HZ: u32 = 50;

const SWEEP_PERIOD_MS: u32 = 20;
const MIN_SWEEP_STEP: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoKind {
    /// 180° position servo
    Positional,
    /// 360° continuous-rotation servo
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoConfig {
    pub min_us: u32,
    pub max_us: u32,
    /// Stop pulse for continuous servos; `None` means midpoint.
    pub neutral_us: Option<u32>,
    pub reversed: bool,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_us: 500,
            max_us: 2500,
            neutral_us: Some(1500),
            reversed: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    kind: ServoKind,
    config: ServoConfig,
    angle: Option<f32>,
}

pub struct ServoController<I2C> {
    pca: Pca9685<I2C>,
    freq_hz: u32,
    slots: [Option<Slot>; CHANNELS as usize],
}

impl<I2C: I2c> ServoController<I2C> {
    /// Resets the PCA9685 and sets the servo frame rate.
    pub fn new<D: DelayNs>(mut pca: Pca9685<I2C>, freq_hz: u32, delay: &mut D) -> Result<Self, I2C::Error> {
        pca.reset()?;
        pca.set_frequency(freq_hz, delay)?;
        Ok(Self {
            pca,
            freq_hz,
            slots: [None; CHANNELS as usize],
        })
    }

    pub fn attach(&mut self, channel: u8, kind: ServoKind, config: ServoConfig) -> Result<(), I2C::Error> {
        check_channel::<I2C::Error>(channel)?;
        if config.min_us == 0 || config.min_us >= config.max_us {
            return Err(Error::InvalidArgument("servo needs 0 < min_us < max_us"));
        }
        if let Some(n) = config.neutral_us {
            if !(config.min_us..=config.max_us).contains(&n) {
                return Err(Error::InvalidArgument("neutral_us must lie in min_us..=max_us"));
            }
        }
        self.slots[channel as usize] = Some(Slot {
            kind,
            config,
            angle: None,
        });
        Ok(())
    }

    /// Switch the output off and forget the channel.
    pub fn detach(&mut self, channel: u8) -> Result<(), I2C::Error> {
        check_channel::<I2C::Error>(channel)?;
        self.pca.set_duty(channel, 0)?;
        match self.slots[channel as usize].take() {
            Some(_) => Ok(()),
            None => Err(Error::InvalidArgument("channel not attached")),
        }
    }

    pub fn is_attached(&self, channel: u8) -> bool {
        self.slots
            .get(channel as usize)
            .is_some_and(|s| s.is_some())
    }

    /// Last commanded angle of a positional servo.
    pub fn angle(&self, channel: u8) -> Option<f32> {
        self.slots.get(channel as usize).copied().flatten()?.angle
    }

    /// Move a positional servo; `angle` is clamped to 0..=180. With a speed,
    /// and a known previous angle, the move is swept in 20 ms steps.
    pub fn set_angle<D: DelayNs>(
        &mut self,
        channel: u8,
        angle: f32,
        speed_deg_per_s: Option<f32>,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        let slot = self.slot(channel, ServoKind::Positional)?;
        let target = angle.clamp(0.0, 180.0);
        let cfg = slot.config;

        match (speed_deg_per_s, slot.angle) {
            (Some(speed), Some(current)) if speed > 0.0 && current != target => {
                let step = (speed * SWEEP_PERIOD_MS as f32 / 1000.0).max(MIN_SWEEP_STEP);
                let dir = if target > current { 1.0 } else { -1.0 };
                let mut a = current;
                while (dir > 0.0 && a < target) || (dir < 0.0 && a > target) {
                    a = (a + dir * step).clamp(0.0, 180.0);
                    self.write_pulse(channel, angle_to_pulse(&cfg, a))?;
                    delay.delay_ms(SWEEP_PERIOD_MS);
                }
            }
            _ => {}
        }

        self.write_pulse(channel, angle_to_pulse(&cfg, target))?;
        if let Some(s) = self.slots[channel as usize].as_mut() {
            s.angle = Some(target);
        }
        Ok(())
    }

    /// Drive a continuous servo; `speed` is clamped to -1..=1.
    pub fn set_speed(&mut self, channel: u8, speed: f32) -> Result<(), I2C::Error> {
        let cfg = self.slot(channel, ServoKind::Continuous)?.config;
        let mut speed = speed.clamp(-1.0, 1.0);
        if cfg.reversed {
            speed = -speed;
        }
        let neutral = neutral_of(&cfg) as f32;
        let pulse = if speed > 0.0 {
            neutral + (cfg.max_us as f32 - neutral) * speed
        } else {
            neutral + (neutral - cfg.min_us as f32) * speed
        };
        self.write_pulse(channel, pulse.round() as u32)
    }

    /// Raw pulse width, clamped to the channel's min..=max.
    pub fn set_pulse_us(&mut self, channel: u8, pulse_us: u32) -> Result<(), I2C::Error> {
        let cfg = self.attached(channel)?.config;
        if pulse_us == 0 {
            return Err(Error::InvalidArgument("pulse must be positive"));
        }
        self.write_pulse(channel, pulse_us.clamp(cfg.min_us, cfg.max_us))
    }

    /// Neutral pulse if configured, otherwise output off.
    pub fn stop(&mut self, channel: u8) -> Result<(), I2C::Error> {
        match self.attached(channel)?.config.neutral_us {
            Some(n) => self.write_pulse(channel, n),
            None => self.pca.set_duty(channel, 0),
        }
    }

    /// Pulse width in µs to 12-bit counter ticks at the current frequency.
    pub fn to_ticks(&self, pulse_us: u32) -> u16 {
        let period_us = 1_000_000.0 / self.freq_hz as f32;
        let duty = (pulse_us as f32 / period_us).clamp(0.0, 1.0);
        ((duty * DUTY_MAX as f32).round() as u16).min(DUTY_MAX)
    }

    pub fn release(self) -> Pca9685<I2C> {
        self.pca
    }

    fn write_pulse(&mut self, channel: u8, pulse_us: u32) -> Result<(), I2C::Error> {
        let ticks = self.to_ticks(pulse_us);
        self.pca.set_duty(channel, ticks)
    }

    fn attached(&self, channel: u8) -> Result<Slot, I2C::Error> {
        check_channel::<I2C::Error>(channel)?;
        self.slots[channel as usize].ok_or(Error::InvalidArgument("channel not attached"))
    }

    fn slot(&self, channel: u8, kind: ServoKind) -> Result<Slot, I2C::Error> {
        let slot = self.attached(channel)?;
        if slot.kind != kind {
            return Err(Error::InvalidArgument("wrong servo kind for this operation"));
        }
        Ok(slot)
    }
}

fn check_channel<E>(channel: u8) -> Result<(), E> {
    if channel >= CHANNELS {
        return Err(Error::InvalidArgument("servo channel must be 0..=15"));
    }
    Ok(())
}

fn neutral_of(cfg: &ServoConfig) -> u32 {
    cfg.neutral_us.unwrap_or((cfg.min_us + cfg.max_us) / 2)
}

fn angle_to_pulse(cfg: &ServoConfig, angle: f32) -> u32 {
    let phys = if cfg.reversed { 180.0 - angle } else { angle };
    let span = (cfg.max_us - cfg.min_us) as f32;
    (cfg.min_us as f32 + span * phys / 180.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockI2c};

    const CH0_OFF_L: usize = 0x08;

    fn controller() -> (ServoController<MockI2c>, MockI2c, MockDelay) {
        let bus = MockI2c::new();
        let mut delay = MockDelay::new();
        let pca = Pca9685::new(bus.clone(), 0x40);
        let servo = ServoController::new(pca, DEFAULT_FREQ_HZ, &mut delay).unwrap();
        (servo, bus, delay)
    }

    fn off_ticks(bus: &MockI2c, channel: usize) -> u16 {
        let r = bus.regs(CH0_OFF_L + 4 * channel, 2);
        u16::from_le_bytes([r[0], r[1]])
    }

    #[test]
    fn test_to_ticks() {
        let (servo, _, _) = controller();
        // 1500 µs of a 20 ms frame
        assert_eq!(servo.to_ticks(1500), 307);
        assert_eq!(servo.to_ticks(500), 102);
        assert_eq!(servo.to_ticks(40_000), 4095);
    }

    #[test]
    fn test_angle_maps_to_pulse() {
        let (mut servo, bus, mut delay) = controller();
        servo
            .attach(0, ServoKind::Positional, ServoConfig::default())
            .unwrap();
        servo.set_angle(0, 90.0, None, &mut delay).unwrap();
        assert_eq!(off_ticks(&bus, 0), servo.to_ticks(1500));
        servo.set_angle(0, 270.0, None, &mut delay).unwrap();
        assert_eq!(off_ticks(&bus, 0), servo.to_ticks(2500));
        assert_eq!(servo.angle(0), Some(180.0));
    }

    #[test]
    fn test_reversed_mirrors() {
        let (mut servo, bus, mut delay) = controller();
        let cfg = ServoConfig {
            reversed: true,
            ..ServoConfig::default()
        };
        servo.attach(1, ServoKind::Positional, cfg).unwrap();
        servo.set_angle(1, 0.0, None, &mut delay).unwrap();
        assert_eq!(off_ticks(&bus, 1), servo.to_ticks(2500));
    }

    #[test]
    fn test_sweep_steps_every_20ms() {
        let (mut servo, bus, mut delay) = controller();
        servo
            .attach(2, ServoKind::Positional, ServoConfig::default())
            .unwrap();
        servo.set_angle(2, 0.0, None, &mut delay).unwrap();
        let before = delay.elapsed_ms();
        bus.clear_writes();
        // 500 °/s → 10° per step, 9 steps to 90°
        servo.set_angle(2, 90.0, Some(500.0), &mut delay).unwrap();
        assert_eq!(delay.elapsed_ms() - before, 9 * 20);
        assert_eq!(bus.written().len(), 10);
        assert_eq!(off_ticks(&bus, 2), servo.to_ticks(1500));
    }

    #[test]
    fn test_continuous_speed() {
        let (mut servo, bus, _) = controller();
        servo
            .attach(3, ServoKind::Continuous, ServoConfig::default())
            .unwrap();
        servo.set_speed(3, 1.0).unwrap();
        assert_eq!(off_ticks(&bus, 3), servo.to_ticks(2500));
        servo.set_speed(3, -0.5).unwrap();
        assert_eq!(off_ticks(&bus, 3), servo.to_ticks(1000));
        servo.stop(3).unwrap();
        assert_eq!(off_ticks(&bus, 3), servo.to_ticks(1500));
    }

    #[test]
    fn test_kind_and_attachment_checks() {
        let (mut servo, _, mut delay) = controller();
        assert!(servo.set_pulse_us(4, 1500).is_err());
        servo
            .attach(4, ServoKind::Continuous, ServoConfig::default())
            .unwrap();
        assert!(servo.set_angle(4, 10.0, None, &mut delay).is_err());
        let bad = ServoConfig {
            min_us: 2000,
            max_us: 1000,
            ..ServoConfig::default()
        };
        assert!(servo.attach(5, ServoKind::Positional, bad).is_err());
        servo.detach(4).unwrap();
        assert!(!servo.is_attached(4));
        assert!(servo.detach(4).is_err());
    }

    #[test]
    fn test_pulse_clamped_to_range() {
        let (mut servo, bus, _) = controller();
        servo
            .attach(6, ServoKind::Positional, ServoConfig::default())
            .unwrap();
        servo.set_pulse_us(6, 100).unwrap();
        assert_eq!(off_ticks(&bus, 6), servo.to_ticks(500));
    }
}
