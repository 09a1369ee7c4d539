// Link protocols: bit-level 1-Wire and NEC infrared, plus the
// serial link modules (HC-14 LoRa, HC-08 BLE, CC253x ZigBee, TAS-755C
// Ethernet).

pub mod at;
pub mod cc253x;
pub mod hc08;
pub mod hc14;
pub mod nec;
pub mod onewire;
pub mod tas755c;

pub use cc253x::Cc253x;
pub use hc08::Hc08;
pub use hc14::Hc14;
pub use nec::{DecoderMode, NecCommand, NecDecoder, NecError, NecFrame, NecTransmitter, Variant};
pub use onewire::{OneWire, Rom, crc8};
pub use tas755c::Tas755c;
