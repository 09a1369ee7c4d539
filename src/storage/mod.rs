// Non-volatile storage: I2C EEPROM and SPI SD card.

pub mod at24cxx;
pub mod sdcard;

pub use at24cxx::{At24cxx, ChipSize};
pub use sdcard::{DummyTimeSource, FileInfo, SdBlocks, SdStorage};
