// EC11 rotary encoder with push button
//
// A and B form a 2-bit gray code. Every valid transition adds or
// removes a quarter step; the count moves by one when the encoder
// settles in its detent (both lines high) after at least half a cycle.
// Swap A and B to flip the counting direction.

use embedded_hal::digital::InputPin;

use super::NoButton;
use crate::error::{Error, Result};

// indexed by (prev << 2) | curr, state = (a << 1) | b
const QUARTER_STEPS: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

const DETENT: u8 = 0b11;

pub struct Ec11Encoder<A, B, SW = NoButton> {
    pin_a: A,
    pin_b: B,
    sw: SW,
    state: u8,
    quarter: i8,
    count: i32,
}

impl<A: InputPin, B: InputPin> Ec11Encoder<A, B, NoButton> {
    pub fn new(pin_a: A, pin_b: B) -> Result<Self> {
        Self::with_button(pin_a, pin_b, NoButton)
    }
}

impl<A: InputPin, B: InputPin, SW: InputPin> Ec11Encoder<A, B, SW> {
    pub fn with_button(mut pin_a: A, mut pin_b: B, sw: SW) -> Result<Self> {
        let state = read_state(&mut pin_a, &mut pin_b)?;
        Ok(Self {
            pin_a,
            pin_b,
            sw,
            state,
            quarter: 0,
            count: 0,
        })
    }

    /// Sample both lines; returns the count change (-1, 0 or 1).
    pub fn poll(&mut self) -> Result<i32> {
        let curr = read_state(&mut self.pin_a, &mut self.pin_b)?;
        if curr == self.state {
            return Ok(0);
        }

        let idx = ((self.state << 2) | curr) as usize;
        self.quarter += QUARTER_STEPS[idx];
        self.state = curr;

        if curr != DETENT {
            return Ok(0);
        }

        let delta = if self.quarter >= 2 {
            1
        } else if self.quarter <= -2 {
            -1
        } else {
            0
        };
        self.quarter = 0;
        self.count += delta;
        Ok(delta)
    }

    pub fn rotation_count(&self) -> i32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.quarter = 0;
    }

    pub fn is_button_pressed(&mut self) -> Result<bool> {
        self.sw.is_low().map_err(Error::pin)
    }

    pub fn release(self) -> (A, B, SW) {
        (self.pin_a, self.pin_b, self.sw)
    }
}

fn read_state<A: InputPin, B: InputPin>(a: &mut A, b: &mut B) -> Result<u8> {
    let a = a.is_high().map_err(Error::pin)? as u8;
    let b = b.is_high().map_err(Error::pin)? as u8;
    Ok((a << 1) | b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPin;

    fn step(a: &MockPin, b: &MockPin, enc: &mut Ec11Encoder<MockPin, MockPin>, seq: &[u8]) -> i32 {
        let mut total = 0;
        for &s in seq {
            a.set_idle(s & 0b10 != 0);
            b.set_idle(s & 0b01 != 0);
            total += enc.poll().unwrap();
        }
        total
    }

    #[test]
    fn test_full_cycle_counts_one() {
        let a = MockPin::high();
        let b = MockPin::high();
        let mut enc = Ec11Encoder::new(a.clone(), b.clone()).unwrap();

        assert_eq!(step(&a, &b, &mut enc, &[0b01, 0b00, 0b10, 0b11]), 1);
        assert_eq!(step(&a, &b, &mut enc, &[0b01, 0b00, 0b10, 0b11]), 1);
        assert_eq!(enc.rotation_count(), 2);

        assert_eq!(step(&a, &b, &mut enc, &[0b10, 0b00, 0b01, 0b11]), -1);
        assert_eq!(enc.rotation_count(), 1);
    }

    #[test]
    fn test_jitter_at_detent_does_not_count() {
        let a = MockPin::high();
        let b = MockPin::high();
        let mut enc = Ec11Encoder::new(a.clone(), b.clone()).unwrap();

        assert_eq!(step(&a, &b, &mut enc, &[0b01, 0b11, 0b01, 0b11]), 0);
        assert_eq!(enc.rotation_count(), 0);

        step(&a, &b, &mut enc, &[0b01, 0b00, 0b10, 0b11]);
        enc.reset();
        assert_eq!(enc.rotation_count(), 0);
    }

    #[test]
    fn test_button_active_low() {
        let sw = MockPin::low();
        let mut enc = Ec11Encoder::with_button(MockPin::high(), MockPin::high(), sw.clone()).unwrap();
        assert!(enc.is_button_pressed().unwrap());
        sw.set_idle(true);
        assert!(!enc.is_button_pressed().unwrap());
    }
}
