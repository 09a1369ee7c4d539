// 5-way navigation switch + two keys + status LED on a PCF8574
//
// The key map ties each logical key to an expander pin; bit 6 drives the
// LED (active low). Keys are debounced per key: a level change is
// accepted only if more than DEBOUNCE_MS passed since that key's last
// accepted change.

use embedded_hal::i2c::I2c;

use super::pcf8574::Pcf8574;
use crate::error::{Error, Result};

pub const DEBOUNCE_MS: u32 = 20;

const LED_OFF: u8 = 0x40;
const LED_ON: u8 = 0x00;

/// All keys on the pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Center,
    Sw1,
    Sw2,
}

impl Key {
    pub const COUNT: usize = 7;

    pub const ALL: [Key; Key::COUNT] = [
        Key::Up,
        Key::Down,
        Key::Left,
        Key::Right,
        Key::Center,
        Key::Sw1,
        Key::Sw2,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Key::Up => "UP",
            Key::Down => "DOWN",
            Key::Left => "LEFT",
            Key::Right => "RIGHT",
            Key::Center => "CENTER",
            Key::Sw1 => "SW1",
            Key::Sw2 => "SW2",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// (key, expander pin)
pub const DEFAULT_KEYMAP: &[(Key, u8)] = &[
    (Key::Up, 0),
    (Key::Down, 3),
    (Key::Left, 1),
    (Key::Right, 2),
    (Key::Center, 4),
    (Key::Sw1, 5),
    (Key::Sw2, 7),
];

/// Accepted level change of one key; `level` is the pin level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub level: bool,
}

struct EventQueue {
    buf: [Option<KeyEvent>; Key::COUNT],
}

impl EventQueue {
    const fn new() -> Self {
        Self {
            buf: [None; Key::COUNT],
        }
    }

    fn push(&mut self, ev: KeyEvent) {
        for slot in self.buf.iter_mut() {
            if slot.is_none() {
                *slot = Some(ev);
                return;
            }
        }
    }

    fn pop(&mut self) -> Option<KeyEvent> {
        for slot in self.buf.iter_mut() {
            if let Some(ev) = slot.take() {
                return Some(ev);
            }
        }
        None
    }

    fn is_empty(&self) -> bool {
        self.buf.iter().all(|s| s.is_none())
    }
}

pub struct Pcf8574Keys<I2C> {
    pcf: Pcf8574<I2C>,
    keymap: &'static [(Key, u8)],
    state: [bool; Key::COUNT],
    last_change_ms: [u32; Key::COUNT],
    queue: EventQueue,
}

impl<I2C: I2c> Pcf8574Keys<I2C> {
    pub fn new(mut pcf: Pcf8574<I2C>, keymap: &'static [(Key, u8)]) -> Result<Self, I2C::Error> {
        if keymap.is_empty() {
            return Err(Error::InvalidArgument("key map is empty"));
        }
        if keymap.iter().any(|&(_, pin)| pin > 7) {
            return Err(Error::InvalidArgument("key map pin must be 0..=7"));
        }
        pcf.set_port(LED_OFF)?;
        Ok(Self {
            pcf,
            keymap,
            state: [false; Key::COUNT],
            last_change_ms: [0; Key::COUNT],
            queue: EventQueue::new(),
        })
    }

    pub fn led_on(&mut self) -> Result<(), I2C::Error> {
        self.pcf.set_port(LED_ON)
    }

    pub fn led_off(&mut self) -> Result<(), I2C::Error> {
        self.pcf.set_port(LED_OFF)
    }

    /// Sample the port once and return the next debounced change, if any.
    /// `now_ms` is a wrapping millisecond counter.
    pub fn scan(&mut self, now_ms: u32) -> Result<Option<KeyEvent>, I2C::Error> {
        if !self.queue.is_empty() {
            return Ok(self.queue.pop());
        }

        let port = self.pcf.port()?;
        for &(key, pin) in self.keymap {
            let i = key.index();
            let raw = (port >> pin) & 1 != 0;
            if raw == self.state[i] {
                continue;
            }
            if now_ms.wrapping_sub(self.last_change_ms[i]) > DEBOUNCE_MS {
                self.state[i] = raw;
                self.last_change_ms[i] = now_ms;
                log::debug!("key {} -> {}", key, raw);
                self.queue.push(KeyEvent { key, level: raw });
            }
        }

        Ok(self.queue.pop())
    }

    /// Debounced level of one key.
    pub fn read_key(&self, key: Key) -> Result<bool, I2C::Error> {
        if !self.keymap.iter().any(|&(k, _)| k == key) {
            return Err(Error::InvalidArgument("key not in key map"));
        }
        Ok(self.state[key.index()])
    }

    /// Debounced levels of every key, indexed by `Key as usize`.
    pub fn read_all(&self) -> [bool; Key::COUNT] {
        self.state
    }

    pub fn release(self) -> Pcf8574<I2C> {
        self.pcf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockI2c;

    fn keys(bus: &MockI2c) -> Pcf8574Keys<MockI2c> {
        let pcf = Pcf8574::new(bus.clone(), 0x20).unwrap();
        Pcf8574Keys::new(pcf, DEFAULT_KEYMAP).unwrap()
    }

    #[test]
    fn test_new_turns_led_off() {
        let bus = MockI2c::raw();
        let mut k = keys(&bus);
        assert_eq!(bus.last_write().unwrap(), [LED_OFF]);
        k.led_on().unwrap();
        assert_eq!(bus.last_write().unwrap(), [LED_ON]);
    }

    #[test]
    fn test_debounce_per_key() {
        let bus = MockI2c::raw();
        let mut k = keys(&bus);

        // DOWN is pin 3
        bus.queue_read(&[0b0000_1000]);
        assert_eq!(
            k.scan(100).unwrap(),
            Some(KeyEvent {
                key: Key::Down,
                level: true
            })
        );
        assert!(k.read_key(Key::Down).unwrap());

        // bounce back inside the window is ignored
        bus.queue_read(&[0b0000_0000]);
        assert_eq!(k.scan(110).unwrap(), None);
        assert!(k.read_key(Key::Down).unwrap());

        bus.queue_read(&[0b0000_0000]);
        assert_eq!(
            k.scan(130).unwrap(),
            Some(KeyEvent {
                key: Key::Down,
                level: false
            })
        );
    }

    #[test]
    fn test_simultaneous_changes_are_queued() {
        let bus = MockI2c::raw();
        let mut k = keys(&bus);

        bus.queue_read(&[0b1000_0001]);
        let first = k.scan(50).unwrap().unwrap();
        let second = k.scan(50).unwrap().unwrap();
        assert_eq!(first.key, Key::Up);
        assert_eq!(second.key, Key::Sw2);
        assert!(k.read_all()[Key::Sw2 as usize]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        static MAP: &[(Key, u8)] = &[(Key::Up, 0)];
        let bus = MockI2c::raw();
        let pcf = Pcf8574::new(bus, 0x20).unwrap();
        let k = Pcf8574Keys::new(pcf, MAP).unwrap();
        assert!(matches!(k.read_key(Key::Sw1), Err(Error::InvalidArgument(_))));
    }
}
