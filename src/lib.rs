// Peripheral driver catalog for microcontroller boards.
//
// One small blocking wrapper per sensor, actuator or bus peripheral. Drivers
// are board-independent: they take embedded-hal bus/pin handles by value and
// hand them back through `release()`. No driver knows about any other.

#![no_std]

pub mod analog;
pub mod bcd;
pub mod communication;
pub mod error;
pub mod input;
pub mod lighting;
pub mod misc;
pub mod motor;
pub mod sensors;
pub mod signal;
pub mod storage;

#[cfg(test)]
mod mock;

pub use analog::AdcChannel;
pub use error::{Error, Result};
