//! Error type shared by every driver in the catalog.
//!
//! Bus failures keep the underlying HAL error; pin failures collapse to
//! [`Error::Pin`] since pin error types carry nothing actionable.

/// Result alias; pin-only drivers use the default `E = ()`.
pub type Result<T, E = ()> = core::result::Result<T, Error<E>>;

/// Driver error
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error<E = ()> {
    /// I2C/SPI/UART transfer failed
    #[error("bus error: {0:?}")]
    Bus(E),

    /// GPIO or PWM channel access failed
    #[error("pin error")]
    Pin,

    /// Device did not answer before the polling deadline
    #[error("timed out waiting for device")]
    Timeout,

    /// Argument outside the range the device accepts
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Integrity check over a received frame failed
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum {
        /// Checksum computed over the payload
        expected: u8,
        /// Checksum carried by the frame
        actual: u8,
    },

    /// Response had the wrong shape (length, header, pulse count)
    #[error("unexpected response from device")]
    InvalidResponse,

    /// Nothing acknowledged at the configured address
    #[error("device not present")]
    NotPresent,

    /// Device reported an error code of its own
    #[error("device error code {0:#04x}")]
    Device(u8),
}

impl<E> Error<E> {
    /// Wrap a bus error; handy as `map_err(Error::bus)`.
    pub fn bus(e: E) -> Self {
        Error::Bus(e)
    }

    /// Discard a pin error.
    pub fn pin<P>(_: P) -> Self {
        Error::Pin
    }
}
