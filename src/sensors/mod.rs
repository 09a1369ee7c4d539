// Environmental, motion, distance, optical, biometric and water-quality
// sensors.

pub mod ba111;
pub mod bh1750;
pub mod bmp280;
pub mod dht11;
pub mod dht22;
pub mod ds18x20;
pub mod flame;
pub mod gl5516;
pub mod guva_s12sd;
pub mod hall;
pub mod jedm_gas;
pub mod max30100;
pub mod max30102;
pub mod mems_gas;
pub mod mlx90614;
pub mod mpu6050;
pub mod mqx;
pub mod pir;
pub mod rcwl9623;
pub mod soil_moisture;
pub mod tcr5000;
pub mod tcs34725;
pub mod vibration;
pub mod vl53l0x;

pub use ba111::Ba111Tds;
pub use bh1750::Bh1750;
pub use bmp280::Bmp280;
pub use dht11::Dht11;
pub use dht22::Dht22;
pub use ds18x20::Ds18x20;
pub use flame::FlameSensor;
pub use gl5516::Gl5516;
pub use guva_s12sd::GuvaS12sd;
pub use hall::HallSensor;
pub use jedm_gas::JedmGas;
pub use max30100::Max30100;
pub use max30102::{HeartRateMonitor, Max30102};
pub use mems_gas::MemsAirQuality;
pub use mlx90614::Mlx9061x;
pub use mpu6050::{Attitude, KalmanFilter, Mpu6050};
pub use mqx::{GasSensor, Mqx};
pub use pir::PirSensor;
pub use rcwl9623::{Rcwl9623Gpio, Rcwl9623I2c};
pub use soil_moisture::{MoistureLevel, SoilMoisture};
pub use tcr5000::Tcr5000;
pub use tcs34725::Tcs34725;
pub use vibration::{VibrationSensor, VibrationStatus};
pub use vl53l0x::Vl53l0x;
