// PCA9546A 4-channel I2C switch
//
// One control register, no pointer byte: bits 0..=3 enable the downstream
// channels, several may be on at once. The upstream bus usually also
// carries other devices, so the driver is normally handed a shared device
// (`SharedI2c`) rather than the bus itself.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: u8 = 0x70;
pub const CHANNELS: u8 = 4;

const CHANNEL_MASK: u8 = 0x0F;

/// Upstream bus shared between the mux and other devices.
pub type SharedI2c<'a, I2C> = embedded_hal_bus::i2c::RefCellDevice<'a, I2C>;

pub struct Pca9546<I2C> {
    i2c: I2C,
    address: u8,
    mask: u8,
}

impl<I2C: I2c> Pca9546<I2C> {
    /// No traffic until the first channel change; power-on state is all off.
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            mask: 0,
        }
    }

    /// Enable exactly the channels set in `mask`; upper bits are dropped.
    pub fn write_control(&mut self, mask: u8) -> Result<(), I2C::Error> {
        let mask = mask & CHANNEL_MASK;
        self.i2c.write(self.address, &[mask]).map_err(Error::Bus)?;
        self.mask = mask;
        log::debug!("pca9546: channels {:#06b}", mask);
        Ok(())
    }

    /// Route the bus to one channel, disabling the rest.
    pub fn select_channel(&mut self, channel: u8) -> Result<(), I2C::Error> {
        if channel >= CHANNELS {
            return Err(Error::InvalidArgument("PCA9546 channel must be 0..=3"));
        }
        self.write_control(1 << channel)
    }

    pub fn disable_all(&mut self) -> Result<(), I2C::Error> {
        self.write_control(0)
    }

    /// Control register as the chip reports it; refreshes the cached mask.
    pub fn read_status(&mut self) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        self.mask = buf[0] & CHANNEL_MASK;
        Ok(self.mask)
    }

    /// Last mask written or read.
    pub fn current_mask(&self) -> u8 {
        self.mask
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;

    use super::*;
    use crate::mock::MockI2c;

    #[test]
    fn test_select_channel() {
        let bus = MockI2c::raw();
        let mut mux = Pca9546::new(bus.clone(), DEFAULT_ADDRESS);
        mux.select_channel(2).unwrap();
        assert_eq!(bus.last_write().unwrap(), [0x04]);
        assert_eq!(mux.current_mask(), 0x04);
        assert!(matches!(mux.select_channel(4), Err(Error::InvalidArgument(_))));
        assert_eq!(mux.current_mask(), 0x04);
    }

    #[test]
    fn test_write_control_masks_upper_bits() {
        let bus = MockI2c::raw();
        let mut mux = Pca9546::new(bus.clone(), DEFAULT_ADDRESS);
        mux.write_control(0xF5).unwrap();
        assert_eq!(bus.last_write().unwrap(), [0x05]);
        mux.disable_all().unwrap();
        assert_eq!(mux.current_mask(), 0);
    }

    #[test]
    fn test_read_status_resyncs_mask() {
        let bus = MockI2c::raw();
        let mut mux = Pca9546::new(bus.clone(), DEFAULT_ADDRESS);
        bus.queue_read(&[0xF9]);
        assert_eq!(mux.read_status().unwrap(), 0x09);
        assert_eq!(mux.current_mask(), 0x09);
    }

    #[test]
    fn test_shared_bus() {
        let bus = MockI2c::raw();
        let shared = RefCell::new(bus.clone());
        let mut mux = Pca9546::new(SharedI2c::new(&shared), DEFAULT_ADDRESS);
        let mut other = SharedI2c::new(&shared);
        mux.select_channel(1).unwrap();
        other.write(0x3C, &[0x80, 0xAF]).unwrap();
        let writes = bus.writes();
        assert_eq!(writes[0].0, DEFAULT_ADDRESS);
        assert_eq!(writes[0].1, [0x02]);
        assert_eq!(writes[1].0, 0x3C);
    }
}
