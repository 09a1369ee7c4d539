// GT911 capacitive touch controller
//
// 16-bit register addresses, little-endian values. The I2C address is
// picked at power-up by the INT level while RST rises: low for 0x5D,
// high for 0x14. After that INT is released and the controller pulls it
// low when a new touch report is ready. Config writes only take effect
// once the checksum over 0x8047..=0x80FE is rewritten and CONFIG_FRESH
// is set.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS_PRIMARY: u8 = 0x5D;
pub const ADDRESS_ALTERNATE: u8 = 0x14;
pub const MAX_POINTS: usize = 5;

const CONFIG_LEN: usize = 184;
const POINT_LEN: usize = 8;
const BUFFER_READY: u8 = 0x80;

mod reg {
    pub const COMMAND: u16 = 0x8040;
    pub const CONFIG_START: u16 = 0x8047;
    pub const RESOLUTION_X: u16 = 0x8048;
    pub const RESOLUTION_Y: u16 = 0x804A;
    pub const TOUCH_POINTS: u16 = 0x804C;
    pub const MODULE_SWITCH1: u16 = 0x804D;
    pub const REFRESH_RATE: u16 = 0x8056;
    pub const CONFIG_CHKSUM: u16 = 0x80FF;
    pub const CONFIG_FRESH: u16 = 0x8100;
    pub const PRODUCT_ID: u16 = 0x8140;
    pub const POINT_INFO: u16 = 0x814E;
    pub const POINT_1: u16 = 0x814F;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub width: u16,
    pub height: u16,
    /// 1..=5
    pub touch_points: u8,
    pub reverse_x: bool,
    pub reverse_y: bool,
    pub reverse_axis: bool,
    pub swap_xy: bool,
    pub refresh_hz: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 240,
            height: 320,
            touch_points: 2,
            reverse_x: false,
            reverse_y: false,
            reverse_axis: false,
            swap_xy: false,
            refresh_hz: 240,
        }
    }
}

impl Config {
    fn module_switch(&self) -> u8 {
        (u8::from(self.reverse_y) << 7)
            | (u8::from(self.reverse_x) << 6)
            | (u8::from(self.reverse_axis) << 3)
            | (u8::from(self.swap_xy) << 2)
            | 0x01
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchPoint {
    pub id: u8,
    pub x: u16,
    pub y: u16,
    pub size: u16,
}

/// Two's-complement checksum the controller expects after the config
/// block.
pub fn config_checksum(config: &[u8]) -> u8 {
    config
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

pub struct Gt911<I2C, INT, RST> {
    i2c: I2C,
    int: INT,
    rst: RST,
    address: u8,
    points: [TouchPoint; MAX_POINTS],
    count: usize,
}

impl<I2C, INT, RST> Gt911<I2C, INT, RST>
where
    I2C: I2c,
    INT: InputPin + OutputPin,
    RST: OutputPin,
{
    /// Resets into `address`, writes `config` and commits it.
    pub fn new<D: DelayNs>(
        i2c: I2C,
        int: INT,
        rst: RST,
        address: u8,
        config: &Config,
        delay: &mut D,
    ) -> Result<Self, I2C::Error> {
        if address != ADDRESS_PRIMARY && address != ADDRESS_ALTERNATE {
            return Err(Error::InvalidArgument("GT911 address must be 0x5D or 0x14"));
        }
        if !(1..=MAX_POINTS as u8).contains(&config.touch_points) {
            return Err(Error::InvalidArgument("GT911 touch points must be 1..=5"));
        }
        if config.refresh_hz == 0 {
            return Err(Error::InvalidArgument("refresh rate must be non-zero"));
        }
        let mut dev = Self {
            i2c,
            int,
            rst,
            address,
            points: [TouchPoint::default(); MAX_POINTS],
            count: 0,
        };
        dev.reset(delay)?;
        dev.write_reg(reg::RESOLUTION_X, &config.width.to_le_bytes())?;
        dev.write_reg(reg::RESOLUTION_Y, &config.height.to_le_bytes())?;
        dev.write_reg(reg::TOUCH_POINTS, &[config.touch_points])?;
        dev.write_reg(reg::MODULE_SWITCH1, &[config.module_switch()])?;
        let period = 1_000_000 / (config.refresh_hz as u32 * 250);
        dev.write_reg(reg::REFRESH_RATE, &[period.min(0xFF) as u8])?;
        dev.write_reg(reg::COMMAND, &[0x00])?;
        dev.refresh_config()?;
        log::info!(
            "gt911: {}x{} at {:#04x}, {} points",
            config.width,
            config.height,
            address,
            config.touch_points
        );
        Ok(dev)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Power-up address selection. INT is driven during the RST edge and
    /// released afterwards.
    pub fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), I2C::Error> {
        self.rst.set_low().map_err(Error::pin)?;
        if self.address == ADDRESS_PRIMARY {
            self.int.set_low().map_err(Error::pin)?;
        } else {
            self.int.set_high().map_err(Error::pin)?;
        }
        delay.delay_ms(11);
        self.rst.set_high().map_err(Error::pin)?;
        delay.delay_ms(55);
        self.int.set_high().map_err(Error::pin)?;
        delay.delay_ms(100);
        self.count = 0;
        Ok(())
    }

    /// Recompute the config checksum and tell the controller to reload.
    pub fn refresh_config(&mut self) -> Result<(), I2C::Error> {
        let mut config = [0u8; CONFIG_LEN];
        self.read_reg(reg::CONFIG_START, &mut config)?;
        self.write_reg(reg::CONFIG_CHKSUM, &[config_checksum(&config)])?;
        self.write_reg(reg::CONFIG_FRESH, &[0x01])
    }

    /// INT low means a report is waiting.
    pub fn available(&mut self) -> Result<bool, I2C::Error> {
        self.int.is_low().map_err(Error::pin)
    }

    /// Current touches. The status register is acknowledged on every
    /// call; a report that is not flagged ready yields no points.
    pub fn read_touch(&mut self) -> Result<&[TouchPoint], I2C::Error> {
        let mut status = [0u8; 1];
        self.read_reg(reg::POINT_INFO, &mut status)?;
        let ready = status[0] & BUFFER_READY != 0;
        let count = if ready {
            ((status[0] & 0x0F) as usize).min(MAX_POINTS)
        } else {
            0
        };
        for i in 0..count {
            let mut raw = [0u8; POINT_LEN];
            self.read_reg(reg::POINT_1 + (i * POINT_LEN) as u16, &mut raw)?;
            self.points[i] = TouchPoint {
                id: raw[0],
                x: u16::from_le_bytes([raw[1], raw[2]]),
                y: u16::from_le_bytes([raw[3], raw[4]]),
                size: u16::from_le_bytes([raw[5], raw[6]]),
            };
        }
        self.write_reg(reg::POINT_INFO, &[0])?;
        self.count = count;
        Ok(&self.points[..count])
    }

    /// Four ASCII bytes, "911\0" on a genuine part.
    pub fn product_id(&mut self) -> Result<[u8; 4], I2C::Error> {
        let mut id = [0u8; 4];
        self.read_reg(reg::PRODUCT_ID, &mut id)?;
        Ok(id)
    }

    pub fn release(self) -> (I2C, INT, RST) {
        (self.i2c, self.int, self.rst)
    }

    fn read_reg(&mut self, reg: u16, buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), buf)
            .map_err(Error::Bus)
    }

    fn write_reg(&mut self, reg: u16, data: &[u8]) -> Result<(), I2C::Error> {
        let mut frame = [0u8; 4];
        let [hi, lo] = reg.to_be_bytes();
        frame[0] = hi;
        frame[1] = lo;
        frame[2..2 + data.len()].copy_from_slice(data);
        self.i2c
            .write(self.address, &frame[..2 + data.len()])
            .map_err(Error::Bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockI2c, MockPin};

    struct Rig {
        bus: MockI2c,
        int: MockPin,
        rst: MockPin,
        delay: MockDelay,
    }

    fn rig() -> Rig {
        Rig {
            bus: MockI2c::wide(),
            int: MockPin::new(),
            rst: MockPin::new(),
            delay: MockDelay::new(),
        }
    }

    fn touch(r: &mut Rig) -> Gt911<MockI2c, MockPin, MockPin> {
        Gt911::new(
            r.bus.clone(),
            r.int.clone(),
            r.rst.clone(),
            ADDRESS_PRIMARY,
            &Config::default(),
            &mut r.delay,
        )
        .unwrap()
    }

    #[test]
    fn test_config_written_and_committed() {
        let mut r = rig();
        touch(&mut r);
        let bus = &r.bus;
        assert_eq!(bus.regs(0x8048, 4), [240, 0, 0x40, 0x01]);
        assert_eq!(bus.reg(0x804C), 2);
        assert_eq!(bus.reg(0x804D), 0x01);
        assert_eq!(bus.reg(0x8056), 16);
        // 240 + 0x40 + 1 + 2 + 1 + 16 = 0x144
        assert_eq!(bus.reg(0x80FF), 0xBC);
        assert_eq!(bus.reg(0x8100), 0x01);
    }

    #[test]
    fn test_reset_selects_address() {
        let mut r = rig();
        touch(&mut r);
        assert_eq!(r.rst.history(), [false, true]);
        assert_eq!(r.int.history(), [false, true]);
        assert_eq!(r.delay.elapsed_ms(), 166);

        let mut r = rig();
        Gt911::new(
            r.bus.clone(),
            r.int.clone(),
            r.rst.clone(),
            ADDRESS_ALTERNATE,
            &Config::default(),
            &mut r.delay,
        )
        .unwrap();
        assert_eq!(r.int.history(), [true, true]);
    }

    #[test]
    fn test_module_switch_bits() {
        let config = Config {
            reverse_x: true,
            swap_xy: true,
            ..Config::default()
        };
        assert_eq!(config.module_switch(), 0x45);
    }

    #[test]
    fn test_rejects_bad_setup() {
        let mut r = rig();
        let bad = Config {
            touch_points: 6,
            ..Config::default()
        };
        assert!(matches!(
            Gt911::new(r.bus.clone(), r.int.clone(), r.rst.clone(), ADDRESS_PRIMARY, &bad, &mut r.delay),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Gt911::new(r.bus.clone(), r.int.clone(), r.rst.clone(), 0x38, &Config::default(), &mut r.delay),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_read_two_points() {
        let mut r = rig();
        let mut gt = touch(&mut r);
        r.bus.set_regs(0x814E, &[0x82]);
        r.bus.set_regs(0x814F, &[1, 0x10, 0x00, 0x20, 0x01, 0x05, 0x00, 0]);
        r.bus.set_regs(0x8157, &[2, 0xEF, 0x00, 0x3F, 0x01, 0x09, 0x00, 0]);

        let points = gt.read_touch().unwrap();
        assert_eq!(
            points,
            [
                TouchPoint { id: 1, x: 16, y: 288, size: 5 },
                TouchPoint { id: 2, x: 239, y: 319, size: 9 },
            ]
        );
        assert_eq!(r.bus.reg(0x814E), 0);
    }

    #[test]
    fn test_report_not_ready() {
        let mut r = rig();
        let mut gt = touch(&mut r);
        r.bus.set_regs(0x814E, &[0x03]);
        assert!(gt.read_touch().unwrap().is_empty());
        assert_eq!(r.bus.reg(0x814E), 0);
    }

    #[test]
    fn test_available_and_product_id() {
        let mut r = rig();
        let mut gt = touch(&mut r);
        r.int.set_idle(false);
        assert!(gt.available().unwrap());
        r.int.set_idle(true);
        assert!(!gt.available().unwrap());

        r.bus.set_regs(0x8140, b"911\0");
        assert_eq!(gt.product_id().unwrap(), *b"911\0");
    }

    #[test]
    fn test_checksum() {
        assert_eq!(config_checksum(&[0x01, 0xFF]), 0x00);
        assert_eq!(config_checksum(&[0x10]), 0xF0);
    }
}
