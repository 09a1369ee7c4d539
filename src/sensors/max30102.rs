// MAX30102 pulse oximeter / heart-rate front end
//
// Samples land in a 32-deep on-chip FIFO, 3 bytes (18 significant bits)
// per active LED per sample. `check()` drains whatever the chip has
// queued into a local ring of the same depth; callers then `pop()` at
// their own pace. `HeartRateMonitor` turns a stream of IR samples into
// beats per minute.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS: u8 = 0x57;
const PART_ID: u8 = 0x15;

const FIFO_DEPTH: usize = 32;
const SAMPLE_MASK: u32 = 0x3_FFFF;
const POLL_LIMIT: u32 = 100;

mod reg {
    pub const INT_STATUS1: u8 = 0x00;
    pub const INT_STATUS2: u8 = 0x01;
    pub const INT_ENABLE1: u8 = 0x02;
    pub const INT_ENABLE2: u8 = 0x03;
    pub const FIFO_WR_PTR: u8 = 0x04;
    pub const FIFO_OVERFLOW: u8 = 0x05;
    pub const FIFO_RD_PTR: u8 = 0x06;
    pub const FIFO_DATA: u8 = 0x07;
    pub const FIFO_CONFIG: u8 = 0x08;
    pub const MODE_CONFIG: u8 = 0x09;
    pub const SPO2_CONFIG: u8 = 0x0A;
    pub const LED1_PA: u8 = 0x0C;
    pub const LED2_PA: u8 = 0x0D;
    pub const LED3_PA: u8 = 0x0E;
    pub const PILOT_PA: u8 = 0x10;
    pub const SLOTS_1_2: u8 = 0x11;
    pub const SLOTS_3_4: u8 = 0x12;
    pub const DIE_TEMP_INT: u8 = 0x1F;
    pub const DIE_TEMP_FRAC: u8 = 0x20;
    pub const DIE_TEMP_CONFIG: u8 = 0x21;
    pub const PART_ID: u8 = 0xFF;
}

mod mode {
    pub const SHUTDOWN: u8 = 0x80;
    pub const RESET: u8 = 0x40;
    pub const MASK: u8 = 0x07;
}

const ROLLOVER: u8 = 0x10;
const DIE_TEMP_RDY: u8 = 0x02;

// LED drive current presets, 0.2 mA per step.
pub const AMPLITUDE_LOWEST: u8 = 0x02;
pub const AMPLITUDE_LOW: u8 = 0x1F;
pub const AMPLITUDE_MEDIUM: u8 = 0x7F;
pub const AMPLITUDE_HIGH: u8 = 0xFF;

const ADC_RANGES: [u16; 4] = [2048, 4096, 8192, 16384];
const SAMPLE_RATES: [u16; 8] = [50, 100, 200, 400, 800, 1000, 1600, 3200];
const PULSE_WIDTHS: [u16; 4] = [69, 118, 215, 411];
const FIFO_AVERAGES: [u8; 6] = [1, 2, 4, 8, 16, 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Red = 0x02,
    RedIr = 0x03,
    MultiLed = 0x07,
}

impl LedMode {
    pub fn active_leds(self) -> usize {
        match self {
            LedMode::Red => 1,
            LedMode::RedIr => 2,
            LedMode::MultiLed => 3,
        }
    }
}

/// What a multi-LED time slot fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLed {
    None = 0,
    Red = 1,
    Ir = 2,
    Green = 3,
    RedPilot = 5,
    IrPilot = 6,
    GreenPilot = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    AlmostFull,
    DataReady,
    AmbientLightOverflow,
    ProximityThreshold,
    DieTempReady,
}

impl Interrupt {
    fn location(self) -> (u8, u8) {
        match self {
            Interrupt::AlmostFull => (reg::INT_ENABLE1, 0x80),
            Interrupt::DataReady => (reg::INT_ENABLE1, 0x40),
            Interrupt::AmbientLightOverflow => (reg::INT_ENABLE1, 0x20),
            Interrupt::ProximityThreshold => (reg::INT_ENABLE1, 0x10),
            Interrupt::DieTempReady => (reg::INT_ENABLE2, 0x02),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub amplitude: u8,
    pub sample_average: u8,
    pub led_mode: LedMode,
    pub sample_rate: u16,
    pub pulse_width: u16,
    pub adc_range: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            amplitude: AMPLITUDE_MEDIUM,
            sample_average: 8,
            led_mode: LedMode::RedIr,
            sample_rate: 400,
            pulse_width: 411,
            adc_range: 16384,
        }
    }
}

/// One FIFO entry. Channels not enabled by the LED mode read 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample {
    pub red: u32,
    pub ir: u32,
    pub green: u32,
}

pub struct Max30102<I2C> {
    i2c: I2C,
    address: u8,
    active_leds: usize,
    ring: [Sample; FIFO_DEPTH],
    head: usize,
    len: usize,
}

impl<I2C: I2c> Max30102<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, I2C::Error> {
        let mut dev = Self {
            i2c,
            address,
            active_leds: LedMode::RedIr.active_leds(),
            ring: [Sample::default(); FIFO_DEPTH],
            head: 0,
            len: 0,
        };
        let id = dev.read_reg(reg::PART_ID)?;
        if id != PART_ID {
            log::warn!("MAX30102: unexpected part id {:#04x}", id);
            return Err(Error::InvalidResponse);
        }
        Ok(dev)
    }

    /// Full bring-up: reset, FIFO averaging with rollover, mode, SpO2
    /// config, LED currents and slot assignment.
    pub fn setup<D: DelayNs>(&mut self, config: &Config, delay: &mut D) -> Result<(), I2C::Error> {
        self.soft_reset(delay)?;
        self.set_fifo_average(config.sample_average)?;
        self.set_fifo_rollover(true)?;
        self.set_led_mode(config.led_mode)?;
        self.set_adc_range(config.adc_range)?;
        self.set_sample_rate(config.sample_rate)?;
        self.set_pulse_width(config.pulse_width)?;

        self.write_reg(reg::LED1_PA, config.amplitude)?;
        self.write_reg(reg::LED2_PA, config.amplitude)?;
        self.write_reg(reg::LED3_PA, config.amplitude)?;
        self.write_reg(reg::PILOT_PA, config.amplitude)?;

        self.set_slot(1, SlotLed::Red)?;
        if config.led_mode.active_leds() > 1 {
            self.set_slot(2, SlotLed::Ir)?;
        }
        if config.led_mode.active_leds() > 2 {
            self.set_slot(3, SlotLed::Green)?;
        }
        self.clear_fifo()
    }

    /// Reset bit self-clears once the part has reloaded its defaults.
    pub fn soft_reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::RESET, mode::RESET)?;
        for _ in 0..POLL_LIMIT {
            if self.read_reg(reg::MODE_CONFIG)? & mode::RESET == 0 {
                return Ok(());
            }
            delay.delay_ms(1);
        }
        Err(Error::Timeout)
    }

    pub fn shutdown(&mut self) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::SHUTDOWN, mode::SHUTDOWN)
    }

    pub fn wake_up(&mut self) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::SHUTDOWN, 0)
    }

    pub fn set_led_mode(&mut self, led_mode: LedMode) -> Result<(), I2C::Error> {
        self.modify(reg::MODE_CONFIG, mode::MASK, led_mode as u8)?;
        self.active_leds = led_mode.active_leds();
        Ok(())
    }

    /// Full-scale range in nA: 2048, 4096, 8192 or 16384.
    pub fn set_adc_range(&mut self, range: u16) -> Result<(), I2C::Error> {
        let index = lookup::<I2C::Error>(&ADC_RANGES, range, "ADC range must be 2048, 4096, 8192 or 16384")?;
        self.modify(reg::SPO2_CONFIG, 0x60, (index as u8) << 5)
    }

    /// Samples per second: 50, 100, 200, 400, 800, 1000, 1600 or 3200.
    pub fn set_sample_rate(&mut self, rate: u16) -> Result<(), I2C::Error> {
        let index = lookup::<I2C::Error>(&SAMPLE_RATES, rate, "unsupported sample rate")?;
        self.modify(reg::SPO2_CONFIG, 0x1C, (index as u8) << 2)
    }

    /// LED pulse width in µs: 69, 118, 215 or 411.
    pub fn set_pulse_width(&mut self, width: u16) -> Result<(), I2C::Error> {
        let index = lookup::<I2C::Error>(&PULSE_WIDTHS, width, "pulse width must be 69, 118, 215 or 411")?;
        self.modify(reg::SPO2_CONFIG, 0x03, index as u8)
    }

    pub fn set_pulse_amplitude(&mut self, led: SlotLed, amplitude: u8) -> Result<(), I2C::Error> {
        let reg = match led {
            SlotLed::Red => reg::LED1_PA,
            SlotLed::Ir => reg::LED2_PA,
            SlotLed::Green => reg::LED3_PA,
            SlotLed::None => return Err(Error::InvalidArgument("no LED selected")),
            _ => reg::PILOT_PA,
        };
        self.write_reg(reg, amplitude)
    }

    /// Samples averaged per FIFO entry: 1, 2, 4, 8, 16 or 32.
    pub fn set_fifo_average(&mut self, samples: u8) -> Result<(), I2C::Error> {
        let index = FIFO_AVERAGES
            .iter()
            .position(|&a| a == samples)
            .ok_or(Error::<I2C::Error>::InvalidArgument("FIFO average must be a power of two up to 32"))?;
        self.modify(reg::FIFO_CONFIG, 0xE0, (index as u8) << 5)
    }

    pub fn set_fifo_rollover(&mut self, on: bool) -> Result<(), I2C::Error> {
        self.modify(reg::FIFO_CONFIG, ROLLOVER, if on { ROLLOVER } else { 0 })
    }

    /// Slots 1..=4 in multi-LED mode.
    pub fn set_slot(&mut self, slot: u8, led: SlotLed) -> Result<(), I2C::Error> {
        let (reg, shift) = match slot {
            1 => (reg::SLOTS_1_2, 0),
            2 => (reg::SLOTS_1_2, 4),
            3 => (reg::SLOTS_3_4, 0),
            4 => (reg::SLOTS_3_4, 4),
            _ => return Err(Error::InvalidArgument("slot must be 1..=4")),
        };
        self.modify(reg, 0x07 << shift, (led as u8) << shift)
    }

    pub fn clear_fifo(&mut self) -> Result<(), I2C::Error> {
        self.write_reg(reg::FIFO_WR_PTR, 0)?;
        self.write_reg(reg::FIFO_OVERFLOW, 0)?;
        self.write_reg(reg::FIFO_RD_PTR, 0)?;
        self.head = 0;
        self.len = 0;
        Ok(())
    }

    pub fn set_interrupt(&mut self, interrupt: Interrupt, on: bool) -> Result<(), I2C::Error> {
        let (reg, bit) = interrupt.location();
        self.modify(reg, bit, if on { bit } else { 0 })
    }

    /// Both status registers; reading clears them.
    pub fn interrupt_status(&mut self) -> Result<(u8, u8), I2C::Error> {
        let mut buf = [0u8; 2];
        self.read_regs(reg::INT_STATUS1, &mut buf)?;
        Ok((buf[0], buf[1]))
    }

    /// Die temperature in °C, 0.0625 °C resolution.
    pub fn die_temperature<D: DelayNs>(&mut self, delay: &mut D) -> Result<f32, I2C::Error> {
        self.write_reg(reg::DIE_TEMP_CONFIG, 0x01)?;
        let mut polls = 0;
        while self.read_reg(reg::INT_STATUS2)? & DIE_TEMP_RDY == 0 {
            if polls >= POLL_LIMIT {
                return Err(Error::Timeout);
            }
            delay.delay_ms(1);
            polls += 1;
        }
        let whole = self.read_reg(reg::DIE_TEMP_INT)? as i8;
        let frac = self.read_reg(reg::DIE_TEMP_FRAC)? & 0x0F;
        Ok(whole as f32 + frac as f32 * 0.0625)
    }

    /// Move every sample the chip has queued into the local ring.
    /// Returns how many were read. When the ring is full the oldest
    /// entries are dropped.
    pub fn check(&mut self) -> Result<usize, I2C::Error> {
        let mut ptrs = [0u8; 3];
        self.read_regs(reg::FIFO_WR_PTR, &mut ptrs)?;
        let (write, read) = (ptrs[0], ptrs[2]);
        let count = (write.wrapping_sub(read) & 0x1F) as usize;

        let width = self.active_leds * 3;
        let mut raw = [0u8; 9];
        for _ in 0..count {
            self.read_regs(reg::FIFO_DATA, &mut raw[..width])?;
            let channel = |i: usize| {
                if i < self.active_leds {
                    u32::from_be_bytes([0, raw[i * 3], raw[i * 3 + 1], raw[i * 3 + 2]]) & SAMPLE_MASK
                } else {
                    0
                }
            };
            let sample = Sample {
                red: channel(0),
                ir: channel(1),
                green: channel(2),
            };
            self.push(sample);
        }
        Ok(count)
    }

    pub fn available(&self) -> usize {
        self.len
    }

    /// Oldest buffered sample.
    pub fn pop(&mut self) -> Option<Sample> {
        if self.len == 0 {
            return None;
        }
        let tail = (self.head + FIFO_DEPTH - self.len) % FIFO_DEPTH;
        self.len -= 1;
        Some(self.ring[tail])
    }

    /// Newest buffered sample, left in place.
    pub fn latest(&self) -> Option<Sample> {
        if self.len == 0 {
            return None;
        }
        Some(self.ring[(self.head + FIFO_DEPTH - 1) % FIFO_DEPTH])
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn push(&mut self, sample: Sample) {
        self.ring[self.head] = sample;
        self.head = (self.head + 1) % FIFO_DEPTH;
        self.len = (self.len + 1).min(FIFO_DEPTH);
    }

    fn modify(&mut self, reg: u8, mask: u8, value: u8) -> Result<(), I2C::Error> {
        let current = self.read_reg(reg)?;
        self.write_reg(reg, (current & !mask) | (value & mask))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.read_regs(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.i2c
            .write_read(self.address, &[reg], buf)
            .map_err(Error::Bus)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(Error::Bus)
    }
}

fn lookup<E>(table: &[u16], value: u16, msg: &'static str) -> Result<usize, E> {
    table
        .iter()
        .position(|&v| v == value)
        .ok_or(Error::InvalidArgument(msg))
}

// ── heart rate ──────────────────────────────────────────────────────

const SMOOTHING: usize = 5;

/// Beat detector over the last `N` IR samples.
///
/// The signal is smoothed with a 5-sample moving average; beats are local
/// maxima above the midpoint of the window's range.
pub struct HeartRateMonitor<const N: usize> {
    values: [f32; N],
    times: [u32; N],
    head: usize,
    len: usize,
}

impl<const N: usize> Default for HeartRateMonitor<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> HeartRateMonitor<N> {
    pub const fn new() -> Self {
        Self {
            values: [0.0; N],
            times: [0; N],
            head: 0,
            len: 0,
        }
    }

    pub fn add_sample(&mut self, ir: u32, now_ms: u32) {
        if N == 0 {
            return;
        }
        self.values[self.head] = ir as f32;
        self.times[self.head] = now_ms;
        self.head = (self.head + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Beats per minute, or `None` until two beats are in the window.
    pub fn heart_rate(&self) -> Option<f32> {
        if self.len < SMOOTHING + 2 {
            return None;
        }
        let start = (self.head + N - self.len) % N;
        let at = |i: usize| (start + i) % N;

        // trailing moving average, stamped with the newest sample in the window
        let n = self.len - SMOOTHING + 1;
        let mut smooth = [0.0f32; N];
        for (i, slot) in smooth.iter_mut().enumerate().take(n) {
            *slot = (i..i + SMOOTHING).map(|j| self.values[at(j)]).sum::<f32>() / SMOOTHING as f32;
        }
        let smooth = &smooth[..n];

        let (min, max) = smooth
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if max <= min {
            return None;
        }
        let threshold = min + (max - min) * 0.5;

        let mut first: Option<u32> = None;
        let mut last = 0u32;
        let mut beats = 0u32;
        for i in 1..n - 1 {
            let v = smooth[i];
            if v > threshold && v > smooth[i - 1] && v >= smooth[i + 1] {
                let t = self.times[at(i + SMOOTHING - 1)];
                first.get_or_insert(t);
                last = t;
                beats += 1;
            }
        }

        let first = first?;
        if beats < 2 || last <= first {
            return None;
        }
        let mean_interval = (last - first) as f32 / (beats - 1) as f32;
        Some(60_000.0 / mean_interval)
    }
}
