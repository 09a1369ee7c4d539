// MPU6050 6-axis IMU: accelerometer, gyroscope, die temperature
//
// Burst reads of the 3-axis output registers are retried (the part
// occasionally NACKs right after waking). Range changes update the cached
// scaler used for unit conversion.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use micromath::F32Ext;

use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x68;
pub const GRAVITY_MS2: f32 = 9.80665;

const MAX_TRIES: u8 = 3;

mod reg {
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const TEMP_OUT_H: u8 = 0x41;
    pub const GYRO_XOUT_H: u8 = 0x43;
    pub const PWR_MGMT_1: u8 = 0x6B;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelRange {
    #[default]
    G2 = 0x00,
    G4 = 0x08,
    G8 = 0x10,
    G16 = 0x18,
}

impl AccelRange {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(AccelRange::G2),
            0x08 => Some(AccelRange::G4),
            0x10 => Some(AccelRange::G8),
            0x18 => Some(AccelRange::G16),
            _ => None,
        }
    }

    /// LSB per g
    pub const fn scaler(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }

    pub const fn g(self) -> u8 {
        match self {
            AccelRange::G2 => 2,
            AccelRange::G4 => 4,
            AccelRange::G8 => 8,
            AccelRange::G16 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GyroRange {
    #[default]
    Deg250 = 0x00,
    Deg500 = 0x08,
    Deg1000 = 0x10,
    Deg2000 = 0x18,
}

impl GyroRange {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(GyroRange::Deg250),
            0x08 => Some(GyroRange::Deg500),
            0x10 => Some(GyroRange::Deg1000),
            0x18 => Some(GyroRange::Deg2000),
            _ => None,
        }
    }

    /// LSB per °/s
    pub const fn scaler(self) -> f32 {
        match self {
            GyroRange::Deg250 => 131.0,
            GyroRange::Deg500 => 65.5,
            GyroRange::Deg1000 => 32.8,
            GyroRange::Deg2000 => 16.4,
        }
    }

    pub const fn degrees_per_second(self) -> u16 {
        match self {
            GyroRange::Deg250 => 250,
            GyroRange::Deg500 => 500,
            GyroRange::Deg1000 => 1000,
            GyroRange::Deg2000 => 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelUnit {
    G,
    #[default]
    MetersPerSecond2,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

pub struct Mpu6050<I2C> {
    i2c: I2C,
    address: u8,
    accel_range: AccelRange,
    gyro_range: GyroRange,
    failures: u32,
}

impl<I2C: I2c> Mpu6050<I2C> {
    /// Wake the device and pick up its configured ranges.
    pub fn new<D: DelayNs>(i2c: I2C, address: u8, delay: &mut D) -> Result<Self, I2C::Error> {
        let mut dev = Self {
            i2c,
            address,
            accel_range: AccelRange::default(),
            gyro_range: GyroRange::default(),
            failures: 0,
        };
        if let Err(e) = dev.write_reg(reg::PWR_MGMT_1, 0) {
            log::warn!("MPU6050 not answering at {:#04x}", address);
            return Err(e);
        }
        delay.delay_ms(5);

        dev.accel_range = dev.accel_range()?.unwrap_or_else(|| {
            log::warn!("MPU6050: unknown accel range, scaling as ±2 g");
            AccelRange::G2
        });
        dev.gyro_range = dev.gyro_range()?.unwrap_or_else(|| {
            log::warn!("MPU6050: unknown gyro range, scaling as ±250 °/s");
            GyroRange::Deg250
        });
        Ok(dev)
    }

    pub fn set_accel_range(&mut self, range: AccelRange) -> Result<(), I2C::Error> {
        self.write_reg(reg::ACCEL_CONFIG, range as u8)?;
        self.accel_range = range;
        Ok(())
    }

    /// Range as read back from the device; `None` for self-test or
    /// unexpected bits.
    pub fn accel_range(&mut self) -> Result<Option<AccelRange>, I2C::Error> {
        Ok(AccelRange::from_bits(self.read_reg(reg::ACCEL_CONFIG)?))
    }

    pub fn set_gyro_range(&mut self, range: GyroRange) -> Result<(), I2C::Error> {
        self.write_reg(reg::GYRO_CONFIG, range as u8)?;
        self.gyro_range = range;
        Ok(())
    }

    pub fn gyro_range(&mut self) -> Result<Option<GyroRange>, I2C::Error> {
        Ok(GyroRange::from_bits(self.read_reg(reg::GYRO_CONFIG)?))
    }

    /// Die temperature in °C.
    pub fn read_temperature(&mut self) -> Result<f32, I2C::Error> {
        let mut buf = [0u8; 2];
        self.read_regs(reg::TEMP_OUT_H, &mut buf)?;
        Ok(i16::from_be_bytes(buf) as f32 / 340.0 + 36.53)
    }

    pub fn read_accel<D: DelayNs>(
        &mut self,
        unit: AccelUnit,
        delay: &mut D,
    ) -> Result<Vector3, I2C::Error> {
        let [x, y, z] = self.read_axes(reg::ACCEL_XOUT_H, delay)?;
        let scale = match unit {
            AccelUnit::G => 1.0 / self.accel_range.scaler(),
            AccelUnit::MetersPerSecond2 => GRAVITY_MS2 / self.accel_range.scaler(),
        };
        Ok(Vector3 {
            x: x as f32 * scale,
            y: y as f32 * scale,
            z: z as f32 * scale,
        })
    }

    pub fn read_accel_abs<D: DelayNs>(
        &mut self,
        unit: AccelUnit,
        delay: &mut D,
    ) -> Result<f32, I2C::Error> {
        Ok(self.read_accel(unit, delay)?.magnitude())
    }

    /// Angular rate in °/s.
    pub fn read_gyro<D: DelayNs>(&mut self, delay: &mut D) -> Result<Vector3, I2C::Error> {
        let [x, y, z] = self.read_axes(reg::GYRO_XOUT_H, delay)?;
        let s = self.gyro_range.scaler();
        Ok(Vector3 {
            x: x as f32 / s,
            y: y as f32 / s,
            z: z as f32 / s,
        })
    }

    /// Static tilt from gravity, radians: (about x, about y).
    pub fn read_angle<D: DelayNs>(&mut self, delay: &mut D) -> Result<(f32, f32), I2C::Error> {
        let a = self.read_accel(AccelUnit::MetersPerSecond2, delay)?;
        Ok((a.y.atan2(a.z), (-a.x).atan2(a.z)))
    }

    /// Burst reads that needed a retry, over the driver's lifetime.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_axes<D: DelayNs>(&mut self, start: u8, delay: &mut D) -> Result<[i16; 3], I2C::Error> {
        let mut buf = [0u8; 6];
        let mut tries = 0;
        loop {
            delay.delay_ms(10);
            match self.read_regs(start, &mut buf) {
                Ok(()) => break,
                Err(e) => {
                    tries += 1;
                    self.failures += 1;
                    if tries >= MAX_TRIES {
                        log::warn!("MPU6050 at {:#04x}: read {:#04x} failed", self.address, start);
                        return Err(e);
                    }
                }
            }
        }
        Ok([
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[2], buf[3]]),
            i16::from_be_bytes([buf[4], buf[5]]),
        ])
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

/// One-axis angle estimator fusing accelerometer angle and gyro rate.
///
/// `update_kalman` tracks angle and gyro bias; `update_complementary` is the
/// cheap alternative. Both take radians, radians/s and seconds.
#[derive(Debug, Clone, Copy)]
pub struct KalmanFilter {
    pub gyro_weight: f32,
    pub q_angle: f32,
    pub q_bias: f32,
    pub r_measure: f32,
    angle: f32,
    bias: f32,
    p: [[f32; 2]; 2],
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self {
            gyro_weight: 0.98,
            q_angle: 0.001,
            q_bias: 0.003,
            r_measure: 0.003,
            angle: 0.0,
            bias: 0.0,
            p: [[0.0; 2]; 2],
        }
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn update_complementary(&mut self, accel_angle: f32, gyro_rate: f32, dt: f32) -> f32 {
        if dt > 0.0 {
            let gyro_angle = self.angle + gyro_rate * dt;
            self.angle = self.gyro_weight * gyro_angle + (1.0 - self.gyro_weight) * accel_angle;
        }
        self.angle
    }

    pub fn update_kalman(&mut self, accel_angle: f32, gyro_rate: f32, dt: f32) -> f32 {
        if dt <= 0.0 {
            return self.angle;
        }

        // predict
        self.angle += (gyro_rate - self.bias) * dt;
        let p = &mut self.p;
        p[0][0] += dt * (dt * p[1][1] - p[0][1] - p[1][0] + self.q_angle);
        p[0][1] -= dt * p[1][1];
        p[1][0] -= dt * p[1][1];
        p[1][1] += self.q_bias * dt;

        // correct
        let s = p[0][0] + self.r_measure;
        let k0 = p[0][0] / s;
        let k1 = p[1][0] / s;
        let y = accel_angle - self.angle;
        self.angle += k0 * y;
        self.bias += k1 * y;

        let p00 = p[0][0];
        let p01 = p[0][1];
        p[0][0] -= k0 * p00;
        p[0][1] -= k0 * p01;
        p[1][0] -= k1 * p00;
        p[1][1] -= k1 * p01;

        self.angle
    }
}

/// Roll/pitch estimate from IMU samples, one Kalman filter per axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attitude {
    pub roll: KalmanFilter,
    pub pitch: KalmanFilter,
}

impl Attitude {
    /// `accel` in any unit, `gyro` in °/s. Returns (roll, pitch) radians.
    pub fn update(&mut self, accel: Vector3, gyro: Vector3, dt: f32) -> (f32, f32) {
        let accel_roll = accel.y.atan2((accel.x * accel.x + accel.z * accel.z).sqrt());
        let accel_pitch = (-accel.x).atan2((accel.y * accel.y + accel.z * accel.z).sqrt());
        let roll = self
            .roll
            .update_kalman(accel_roll, gyro.y.to_radians(), dt);
        let pitch = self
            .pitch
            .update_kalman(accel_pitch, gyro.x.to_radians(), dt);
        (roll, pitch)
    }

    pub fn degrees(&self) -> (f32, f32) {
        (self.roll.angle().to_degrees(), self.pitch.angle().to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockI2c};

    fn device(bus: &MockI2c) -> Mpu6050<MockI2c> {
        let mut delay = MockDelay::new();
        Mpu6050::new(bus.clone(), DEFAULT_ADDRESS, &mut delay).unwrap()
    }

    #[test]
    fn test_wake_and_ranges() {
        let bus = MockI2c::new();
        bus.set_regs(0x6B, &[0x40]); // asleep
        bus.set_regs(0x1C, &[0x08]);
        bus.set_regs(0x1B, &[0x18]);
        let mut dev = device(&bus);
        assert_eq!(bus.reg(0x6B), 0);
        assert_eq!(dev.accel_range().unwrap(), Some(AccelRange::G4));
        assert_eq!(dev.gyro_range().unwrap(), Some(GyroRange::Deg2000));

        dev.set_accel_range(AccelRange::G16).unwrap();
        assert_eq!(bus.reg(0x1C), 0x18);
    }

    #[test]
    fn test_accel_scaling() {
        let bus = MockI2c::new();
        // x = 0, y = -8192, z = 16384 at ±2 g
        bus.set_regs(0x3B, &[0x00, 0x00, 0xE0, 0x00, 0x40, 0x00]);
        let mut dev = device(&bus);
        let mut delay = MockDelay::new();

        let g = dev.read_accel(AccelUnit::G, &mut delay).unwrap();
        assert!((g.y + 0.5).abs() < 1e-6);
        assert!((g.z - 1.0).abs() < 1e-6);

        let ms2 = dev.read_accel(AccelUnit::MetersPerSecond2, &mut delay).unwrap();
        assert!((ms2.z - GRAVITY_MS2).abs() < 1e-4);

        let abs = dev.read_accel_abs(AccelUnit::G, &mut delay).unwrap();
        assert!((abs - 1.118).abs() < 0.01);
    }

    #[test]
    fn test_gyro_and_temperature() {
        let bus = MockI2c::new();
        bus.set_regs(0x1B, &[0x08]); // ±500 °/s
        bus.set_regs(0x41, &[0xFF, 0x0C]); // -244
        bus.set_regs(0x43, &[0x00, 0x83, 0xFF, 0x7D, 0x00, 0x00]); // 131, -131
        let mut dev = device(&bus);
        let mut delay = MockDelay::new();

        let t = dev.read_temperature().unwrap();
        assert!((t - (-244.0 / 340.0 + 36.53)).abs() < 1e-4);

        let w = dev.read_gyro(&mut delay).unwrap();
        assert!((w.x - 2.0).abs() < 1e-4);
        assert!((w.y + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_burst_read_gives_up() {
        let bus = MockI2c::new();
        let mut dev = device(&bus);
        bus.set_fail(true);
        let mut delay = MockDelay::new();
        assert!(dev.read_gyro(&mut delay).is_err());
        assert_eq!(dev.failures(), 3);
        assert_eq!(delay.elapsed_ms(), 30);
    }

    #[test]
    fn test_kalman_converges_on_static_angle() {
        let mut f = KalmanFilter::new();
        for _ in 0..500 {
            f.update_kalman(0.3, 0.0, 0.01);
        }
        assert!((f.angle() - 0.3).abs() < 0.01);
    }

    #[test]
    fn test_complementary_weighting() {
        let mut f = KalmanFilter::new();
        let a = f.update_complementary(1.0, 0.0, 0.01);
        assert!((a - 0.02).abs() < 1e-6);
        assert_eq!(f.update_complementary(5.0, 0.0, 0.0), a);
    }

    #[test]
    fn test_attitude_level() {
        let mut att = Attitude::default();
        let accel = Vector3 {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        };
        let (roll, pitch) = att.update(accel, Vector3::default(), 0.01);
        assert!(roll.abs() < 1e-3);
        assert!(pitch.abs() < 1e-3);
    }
}
