// BMP280 pressure/temperature sensor (BME280-compatible humidity path)
//
// Forced-mode conversions only: every read triggers one measurement,
// waits for the busy bit to clear, then burst-reads the 8 data bytes.
// Compensation follows the datasheet's floating-point formulas, computed
// in f64 so the calibration products keep their precision.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use micromath::F32Ext;

use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x76;
pub const SEA_LEVEL_PA: f32 = 101_325.0;

const BUSY_POLLS: u32 = 100;
const BUSY_POLL_MS: u32 = 10;

mod reg {
    pub const CALIB_T_P: u8 = 0x88; // 26 bytes, 0x88..=0xA1
    pub const CALIB_H: u8 = 0xE1; // 7 bytes, 0xE1..=0xE7
    pub const CTRL_HUM: u8 = 0xF2;
    pub const STATUS: u8 = 0xF3;
    pub const CTRL_MEAS: u8 = 0xF4;
    pub const DATA: u8 = 0xF7; // press[3] temp[3] hum[2]
}

const STATUS_MEASURING: u8 = 0x08;

const MODE_SLEEP: u8 = 0;
const MODE_FORCED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    X1 = 1,
    X2 = 2,
    X4 = 3,
    #[default]
    X8 = 4,
    X16 = 5,
}

/// Per-channel oversampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub humidity: Oversampling,
    pub temperature: Oversampling,
    pub pressure: Oversampling,
}

impl From<Oversampling> for Config {
    fn from(os: Oversampling) -> Self {
        Config {
            humidity: os,
            temperature: os,
            pressure: os,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawData {
    pub temperature: i32,
    pub pressure: i32,
    pub humidity: i32,
}

/// Compensated reading: °C, Pa, %RH.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    pub temperature: f32,
    pub pressure: f32,
    pub humidity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    t1: u16,
    t2: i16,
    t3: i16,
    p1: u16,
    p2: i16,
    p3: i16,
    p4: i16,
    p5: i16,
    p6: i16,
    p7: i16,
    p8: i16,
    p9: i16,
    h1: u8,
    h2: i16,
    h3: u8,
    h4: i16,
    h5: i16,
    h6: i8,
}

impl Calibration {
    pub fn parse(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        // 0xE4/0xE5/0xE6 pack H4 and H5 as 12-bit values sharing a nibble
        let e4 = h[3] as i8 as i16;
        let e5 = h[4] as i16;
        let e6 = h[5] as i8 as i16;

        Calibration {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
            h1: tp[25],
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            h4: (e4 << 4) | (e5 & 0x0F),
            h5: (e6 << 4) | (e5 >> 4),
            h6: h[6] as i8,
        }
    }

    pub fn compensate(&self, raw: RawData) -> Measurement {
        let adc_t = raw.temperature as f64;
        let adc_p = raw.pressure as f64;
        let adc_h = raw.humidity as f64;

        let mut var1 = (adc_t / 16384.0 - self.t1 as f64 / 1024.0) * self.t2 as f64;
        let mut var2 = adc_t / 131072.0 - self.t1 as f64 / 8192.0;
        var2 = var2 * var2 * self.t3 as f64;
        let t_fine = (var1 + var2) as i32 as f64;
        let temperature = ((var1 + var2) / 5120.0).clamp(-40.0, 85.0);

        var1 = t_fine / 2.0 - 64000.0;
        var2 = var1 * var1 * self.p6 as f64 / 32768.0 + var1 * self.p5 as f64 * 2.0;
        var2 = var2 / 4.0 + self.p4 as f64 * 65536.0;
        var1 = (self.p3 as f64 * var1 * var1 / 524288.0 + self.p2 as f64 * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * self.p1 as f64;
        let pressure = if var1 == 0.0 {
            30000.0
        } else {
            let p = (1048576.0 - adc_p - var2 / 4096.0) * 6250.0 / var1;
            let v1 = self.p9 as f64 * p * p / 2147483648.0;
            let v2 = p * self.p8 as f64 / 32768.0;
            (p + (v1 + v2 + self.p7 as f64) / 16.0).clamp(30000.0, 110000.0)
        };

        let h = t_fine - 76800.0;
        let h = (adc_h - (self.h4 as f64 * 64.0 + self.h5 as f64 / 16384.0 * h))
            * (self.h2 as f64 / 65536.0
                * (1.0 + self.h6 as f64 / 67108864.0 * h * (1.0 + self.h3 as f64 / 67108864.0 * h)));
        let humidity = (h * (1.0 - self.h1 as f64 * h / 524288.0)).clamp(0.0, 100.0);

        Measurement {
            temperature: temperature as f32,
            pressure: pressure as f32,
            humidity: humidity as f32,
        }
    }
}

pub struct Bmp280<I2C> {
    i2c: I2C,
    address: u8,
    config: Config,
    calib: Calibration,
    sea_level: f32,
}

impl<I2C: I2c> Bmp280<I2C> {
    /// Reads calibration and parks the sensor in sleep mode.
    pub fn new(i2c: I2C, address: u8, config: impl Into<Config>) -> Result<Self, I2C::Error> {
        let mut dev = Self {
            i2c,
            address,
            config: config.into(),
            calib: Calibration::default(),
            sea_level: SEA_LEVEL_PA,
        };

        let mut tp = [0u8; 26];
        let mut h = [0u8; 7];
        dev.read_regs(reg::CALIB_T_P, &mut tp)?;
        dev.read_regs(reg::CALIB_H, &mut h)?;
        dev.calib = Calibration::parse(&tp, &h);
        log::debug!("BMP280 at {:#04x}: calibration loaded", address);

        let ctrl = dev.ctrl_meas(MODE_SLEEP);
        dev.write_reg(reg::CTRL_MEAS, ctrl)?;
        Ok(dev)
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calib
    }

    /// Trigger one forced conversion and return the raw ADC words.
    pub fn read_raw<D: DelayNs>(&mut self, delay: &mut D) -> Result<RawData, I2C::Error> {
        self.write_reg(reg::CTRL_HUM, self.config.humidity as u8)?;
        let ctrl = self.ctrl_meas(MODE_FORCED);
        self.write_reg(reg::CTRL_MEAS, ctrl)?;

        // give the conversion a moment to raise the busy bit
        for _ in 0..5 {
            if self.read_reg(reg::STATUS)? & STATUS_MEASURING != 0 {
                break;
            }
            delay.delay_ms(1);
        }

        let mut ready = false;
        for _ in 0..BUSY_POLLS {
            if self.read_reg(reg::STATUS)? & STATUS_MEASURING == 0 {
                ready = true;
                break;
            }
            delay.delay_ms(BUSY_POLL_MS);
        }
        if !ready {
            log::warn!("BMP280 at {:#04x} stuck measuring", self.address);
            return Err(Error::Timeout);
        }

        let mut d = [0u8; 8];
        self.read_regs(reg::DATA, &mut d)?;
        Ok(RawData {
            pressure: ((d[0] as i32) << 12) | ((d[1] as i32) << 4) | ((d[2] as i32) >> 4),
            temperature: ((d[3] as i32) << 12) | ((d[4] as i32) << 4) | ((d[5] as i32) >> 4),
            humidity: ((d[6] as i32) << 8) | d[7] as i32,
        })
    }

    pub fn read_compensated<D: DelayNs>(&mut self, delay: &mut D) -> Result<Measurement, I2C::Error> {
        let raw = self.read_raw(delay)?;
        Ok(self.calib.compensate(raw))
    }

    pub fn sea_level(&self) -> f32 {
        self.sea_level
    }

    /// Reference pressure for `altitude`, 30 kPa..120 kPa exclusive.
    pub fn set_sea_level(&mut self, pa: f32) -> Result<(), I2C::Error> {
        if !(pa > 30_000.0 && pa < 120_000.0) {
            return Err(Error::InvalidArgument("sea level pressure out of range"));
        }
        self.sea_level = pa;
        Ok(())
    }

    /// Barometric altitude in metres.
    pub fn altitude<D: DelayNs>(&mut self, delay: &mut D) -> Result<f32, I2C::Error> {
        let m = self.read_compensated(delay)?;
        Ok(altitude(m.pressure, self.sea_level))
    }

    /// Dew point in °C; `None` when the part reports no humidity.
    pub fn dew_point<D: DelayNs>(&mut self, delay: &mut D) -> Result<Option<f32>, I2C::Error> {
        let m = self.read_compensated(delay)?;
        Ok(dew_point(m.temperature, m.humidity))
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn ctrl_meas(&self, mode: u8) -> u8 {
        ((self.config.temperature as u8) << 5) | ((self.config.pressure as u8) << 2) | mode
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut b = [0u8; 1];
        self.read_regs(reg, &mut b)?;
        Ok(b[0])
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

pub fn altitude(pressure: f32, sea_level: f32) -> f32 {
    44330.0 * (1.0 - (pressure / sea_level).powf(0.1903))
}

/// Magnus formula.
pub fn dew_point(temperature: f32, humidity: f32) -> Option<f32> {
    if humidity <= 0.0 {
        return None;
    }
    let h = (humidity.log10() - 2.0) / 0.4343 + 17.62 * temperature / (243.12 + temperature);
    Some(243.12 * h / (17.62 - h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockI2c};

    // Datasheet example trimming values.
    fn load_calibration(bus: &MockI2c) {
        let words: [i32; 12] = [
            27504, 26435, -1000, 36477, -10685, 3024, 2855, 140, -7, 15500, -14600, 6000,
        ];
        let mut tp = [0u8; 26];
        for (i, w) in words.iter().enumerate() {
            tp[i * 2..i * 2 + 2].copy_from_slice(&(*w as u16).to_le_bytes());
        }
        bus.set_regs(0x88, &tp);
    }

    fn load_sample(bus: &MockI2c) {
        // adc_P = 415148, adc_T = 519888
        bus.set_regs(0xF7, &[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_new_parks_in_sleep() {
        let bus = MockI2c::new();
        load_calibration(&bus);
        let dev = Bmp280::new(bus.clone(), DEFAULT_ADDRESS, Oversampling::X8).unwrap();
        // osrs_t = osrs_p = 4, sleep
        assert_eq!(bus.reg(0xF4), 0b100_100_00);
        assert_eq!(dev.calibration().t1, 27504);
        assert_eq!(dev.calibration().p9, 6000);
    }

    #[test]
    fn test_datasheet_compensation() {
        let bus = MockI2c::new();
        load_calibration(&bus);
        load_sample(&bus);
        let mut dev = Bmp280::new(bus.clone(), DEFAULT_ADDRESS, Oversampling::X1).unwrap();
        let mut delay = MockDelay::new();

        let raw = dev.read_raw(&mut delay).unwrap();
        assert_eq!(raw.pressure, 415148);
        assert_eq!(raw.temperature, 519888);
        // forced mode written
        assert_eq!(bus.reg(0xF4), 0b001_001_01);

        let m = dev.read_compensated(&mut delay).unwrap();
        assert!((m.temperature - 25.08).abs() < 0.01);
        assert!((m.pressure - 100653.27).abs() < 0.5);
        assert_eq!(m.humidity, 0.0);
    }

    #[test]
    fn test_busy_timeout() {
        let bus = MockI2c::new();
        load_calibration(&bus);
        let mut dev = Bmp280::new(bus.clone(), DEFAULT_ADDRESS, Oversampling::X1).unwrap();
        bus.set_regs(0xF3, &[STATUS_MEASURING]);
        let mut delay = MockDelay::new();
        assert_eq!(dev.read_raw(&mut delay), Err(Error::Timeout));
    }

    #[test]
    fn test_sea_level_bounds() {
        let mut dev = Bmp280::new(MockI2c::new(), DEFAULT_ADDRESS, Oversampling::X1).unwrap();
        assert!(dev.set_sea_level(30_000.0).is_err());
        assert!(dev.set_sea_level(120_000.0).is_err());
        dev.set_sea_level(100_000.0).unwrap();
        assert_eq!(dev.sea_level(), 100_000.0);
    }

    #[test]
    fn test_altitude_and_dew_point() {
        assert!(altitude(SEA_LEVEL_PA, SEA_LEVEL_PA).abs() < 5.0);
        let a = altitude(89_875.0, SEA_LEVEL_PA);
        assert!((a - 1000.0).abs() < 25.0);

        assert_eq!(dew_point(20.0, 0.0), None);
        let dp = dew_point(25.0, 60.0).unwrap();
        assert!((dp - 16.7).abs() < 0.3);
    }

    #[test]
    fn test_humidity_calibration_nibbles() {
        let tp = [0u8; 26];
        // H2 = 362, H3 = 0, E4 = 0x14, E5 = 0x0B, E6 = 0x00, H6 = 30
        let h = [0x6A, 0x01, 0x00, 0x14, 0x0B, 0x00, 0x1E];
        let c = Calibration::parse(&tp, &h);
        assert_eq!(c.h2, 362);
        assert_eq!(c.h4, (0x14 << 4) | 0x0B);
        assert_eq!(c.h5, 0);
        assert_eq!(c.h6, 30);
    }
}
