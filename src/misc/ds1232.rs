// DS1232 MicroMonitor watchdog
//
// The chip resets the board unless WDI sees an edge within its timeout
// (TD pin: 150 ms, 600 ms or 1.2 s). The feed interval is how often the
// caller intends to kick, capped below the longest timeout. There is no
// timer here; call `poll` from the main loop or `kick` directly.

use embedded_hal::digital::StatefulOutputPin;

use crate::error::{Error, Result};

pub const MAX_FEED_INTERVAL_MS: u32 = 1000;

pub struct Ds1232<P> {
    wdi: P,
    feed_interval_ms: u32,
    last_kick_ms: Option<u64>,
}

impl<P: StatefulOutputPin> Ds1232<P> {
    pub fn new(mut wdi: P, feed_interval_ms: u32) -> Result<Self> {
        if feed_interval_ms == 0 || feed_interval_ms > MAX_FEED_INTERVAL_MS {
            return Err(Error::InvalidArgument("feed interval must be 1..=1000 ms"));
        }
        wdi.set_low().map_err(Error::pin)?;
        Ok(Self {
            wdi,
            feed_interval_ms,
            last_kick_ms: None,
        })
    }

    pub fn feed_interval_ms(&self) -> u32 {
        self.feed_interval_ms
    }

    /// Toggle WDI; either edge restarts the chip's timeout.
    pub fn kick(&mut self) -> Result<()> {
        self.wdi.toggle().map_err(Error::pin)
    }

    /// Kick if a feed interval has passed since the last `poll` kick.
    /// Returns whether it kicked.
    pub fn poll(&mut self, now_ms: u64) -> Result<bool> {
        let due = match self.last_kick_ms {
            Some(last) => now_ms.wrapping_sub(last) >= self.feed_interval_ms as u64,
            None => true,
        };
        if due {
            self.kick()?;
            self.last_kick_ms = Some(now_ms);
        }
        Ok(due)
    }

    /// Stop feeding and hold WDI low. The watchdog will fire.
    pub fn stop(&mut self) -> Result<()> {
        self.last_kick_ms = None;
        log::warn!("ds1232: feeding stopped");
        self.wdi.set_low().map_err(Error::pin)
    }

    pub fn release(self) -> P {
        self.wdi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPin;

    #[test]
    fn test_interval_validation() {
        assert!(Ds1232::new(MockPin::new(), 1001).is_err());
        assert!(Ds1232::new(MockPin::new(), 0).is_err());
        let wd = Ds1232::new(MockPin::new(), 500).unwrap();
        assert_eq!(wd.feed_interval_ms(), 500);
    }

    #[test]
    fn test_kick_toggles() {
        let pin = MockPin::new();
        let mut wd = Ds1232::new(pin.clone(), 500).unwrap();
        wd.kick().unwrap();
        assert!(pin.level());
        wd.kick().unwrap();
        assert!(!pin.level());
    }

    #[test]
    fn test_poll_respects_interval() {
        let pin = MockPin::new();
        let mut wd = Ds1232::new(pin.clone(), 500).unwrap();
        assert!(wd.poll(0).unwrap());
        assert!(!wd.poll(499).unwrap());
        assert!(wd.poll(500).unwrap());
        assert!(!wd.poll(600).unwrap());
        wd.stop().unwrap();
        assert!(!pin.level());
        assert!(wd.poll(601).unwrap());
    }
}
