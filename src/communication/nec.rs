// NEC infrared remote protocol, transmit and receive
//
// A frame is a 9 ms mark and 4.5 ms space leader, 32 pulse-distance bits
// LSB first (address, address complement, command, command complement)
// and a closing burst. Every bit is a 563 µs mark followed by a 563 µs
// space for 0 or a 1687 µs space for 1. A held key sends repeat frames
// (9 ms mark, 2.25 ms space, burst). Samsung shortens the leader mark to
// 4.5 ms and repeats the address byte instead of complementing it.
//
// Extended NEC carries a 16-bit address in place of address + complement.
//
// Receiving is edge-timestamp based: the host feeds `push_edge` from a pin
// change interrupt or a fast poll loop, and calls `decode` once the block
// time has passed since the first edge.

use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::SetDutyCycle;

pub const CARRIER_HZ: u32 = 38_000;

/// Time to wait after the first edge before a frame is decoded.
pub const BLOCK_US: u32 = 80_000;

/// Edges in a full data frame: leader (3) + 32 bits (64) + closing burst (1).
pub const FRAME_EDGES: usize = 68;

const T_BURST: u16 = 563;
const T_ONE: u16 = 1687;
const LEADER_MARK: u16 = 9000;
const SAMSUNG_LEADER_MARK: u16 = 4500;
const LEADER_SPACE: u16 = 4500;
const REPEAT_SPACE: u16 = 2250;

// receive thresholds
const MIN_LEADER_NEC: u32 = 4000;
const MIN_LEADER_SAMSUNG: u32 = 2500;
const MIN_DATA_SPACE: u32 = 3000;
const MIN_REPEAT_SPACE: u32 = 1700;
const ONE_THRESHOLD: u32 = 1120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    #[default]
    Nec,
    Samsung,
}

// ── encoding ────────────────────────────────────────────────────────

/// Alternating mark/space durations in µs, starting with a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NecFrame {
    durations: [u16; FRAME_EDGES - 1],
    len: usize,
}

impl NecFrame {
    /// Data frame. An address below 256 gets its check byte appended
    /// (complement for NEC, copy for Samsung); larger addresses are sent
    /// as extended 16-bit addresses.
    pub fn encode(address: u16, command: u8, variant: Variant) -> Self {
        let mut frame = Self::empty();
        match variant {
            Variant::Nec => frame.push(&[LEADER_MARK, LEADER_SPACE]),
            Variant::Samsung => frame.push(&[SAMSUNG_LEADER_MARK, LEADER_SPACE]),
        }

        let mut addr = address;
        if addr < 256 {
            let check = match variant {
                Variant::Nec => addr ^ 0xFF,
                Variant::Samsung => addr,
            };
            addr |= check << 8;
        }
        let data = command as u16 | ((command as u16 ^ 0xFF) << 8);

        for word in [addr, data] {
            for bit in 0..16 {
                let space = if (word >> bit) & 1 != 0 { T_ONE } else { T_BURST };
                frame.push(&[T_BURST, space]);
            }
        }
        frame.push(&[T_BURST]);
        frame
    }

    /// Repeat frame sent while a key stays held.
    pub fn repeat_code() -> Self {
        let mut frame = Self::empty();
        frame.push(&[LEADER_MARK, REPEAT_SPACE, T_BURST]);
        frame
    }

    pub fn durations(&self) -> &[u16] {
        &self.durations[..self.len]
    }

    /// Total on-air time in µs.
    pub fn duration_us(&self) -> u32 {
        self.durations().iter().map(|&d| d as u32).sum()
    }

    const fn empty() -> Self {
        Self {
            durations: [0; FRAME_EDGES - 1],
            len: 0,
        }
    }

    fn push(&mut self, times: &[u16]) {
        for &t in times {
            if self.len < self.durations.len() {
                self.durations[self.len] = t;
                self.len += 1;
            }
        }
    }
}

/// IR LED driver: the PWM channel must already run at [`CARRIER_HZ`].
/// Marks gate the carrier on at 1/3 duty, spaces switch it fully off.
pub struct NecTransmitter<PWM> {
    pwm: PWM,
}

impl<PWM: SetDutyCycle> NecTransmitter<PWM> {
    pub fn new(mut pwm: PWM) -> Result<Self, PWM::Error> {
        pwm.set_duty_cycle_fully_off()?;
        Ok(Self { pwm })
    }

    /// Blocking send; takes about 68 ms for a data frame.
    pub fn send<D: DelayNs>(&mut self, frame: &NecFrame, delay: &mut D) -> Result<(), PWM::Error> {
        for (i, &t) in frame.durations().iter().enumerate() {
            if i % 2 == 0 {
                self.pwm.set_duty_cycle_fraction(1, 3)?;
            } else {
                self.pwm.set_duty_cycle_fully_off()?;
            }
            delay.delay_us(t as u32);
        }
        self.pwm.set_duty_cycle_fully_off()
    }

    pub fn transmit<D: DelayNs>(
        &mut self,
        address: u16,
        command: u8,
        variant: Variant,
        delay: &mut D,
    ) -> Result<(), PWM::Error> {
        self.send(&NecFrame::encode(address, command, variant), delay)
    }

    pub fn repeat<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), PWM::Error> {
        self.send(&NecFrame::repeat_code(), delay)
    }

    pub fn release(self) -> PWM {
        self.pwm
    }
}

// ── decoding ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NecError {
    /// Repeat frame; the key from `last_address` is still held
    #[error("repeat code")]
    Repeat,
    #[error("bad start pulse")]
    BadStart,
    #[error("incomplete data block")]
    BadBlock,
    #[error("malformed repeat code")]
    BadRepeat,
    #[error("too many edges")]
    Overrun,
    #[error("command complement mismatch")]
    BadData,
    #[error("address complement mismatch")]
    BadAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderMode {
    /// 8-bit address, complement checked
    Nec8,
    /// 16-bit address when the complement does not match
    Nec16,
    Samsung,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NecCommand {
    pub address: u16,
    pub command: u8,
}

pub struct NecDecoder {
    times: [u32; FRAME_EDGES + 1],
    edges: usize,
    extended: bool,
    min_leader: u32,
    last_address: u16,
}

impl NecDecoder {
    pub fn new(mode: DecoderMode) -> Self {
        Self {
            times: [0; FRAME_EDGES + 1],
            edges: 0,
            extended: mode != DecoderMode::Nec8,
            min_leader: if mode == DecoderMode::Samsung {
                MIN_LEADER_SAMSUNG
            } else {
                MIN_LEADER_NEC
            },
            last_address: 0,
        }
    }

    /// Record a level change at `t_us` (free-running µs counter, wraps).
    pub fn push_edge(&mut self, t_us: u32) {
        if self.edges < self.times.len() {
            self.times[self.edges] = t_us;
        }
        // keep counting past the buffer so an overrun is detectable
        self.edges = self.edges.saturating_add(1);
    }

    pub fn edges(&self) -> usize {
        self.edges
    }

    /// True once a capture started and [`BLOCK_US`] passed since its first edge.
    pub fn ready(&self, now_us: u32) -> bool {
        self.edges > 0 && now_us.wrapping_sub(self.times[0]) >= BLOCK_US
    }

    /// Address of the last good frame, reported alongside repeats.
    pub fn last_address(&self) -> u16 {
        self.last_address
    }

    /// Decode the captured edges and start a new capture.
    pub fn decode(&mut self) -> Result<NecCommand, NecError> {
        let result = self.decode_edges();
        match result {
            Ok(cmd) => self.last_address = cmd.address,
            Err(e) => log::debug!("nec: {} after {} edges", e, self.edges),
        }
        self.edges = 0;
        result
    }

    fn width(&self, edge: usize) -> u32 {
        self.times[edge + 1].wrapping_sub(self.times[edge])
    }

    fn decode_edges(&self) -> Result<NecCommand, NecError> {
        if self.edges > FRAME_EDGES {
            return Err(NecError::Overrun);
        }
        if self.edges < 3 || self.width(0) < self.min_leader {
            return Err(NecError::BadStart);
        }

        let space = self.width(1);
        if space <= MIN_REPEAT_SPACE {
            return Err(NecError::BadStart);
        }
        if space <= MIN_DATA_SPACE {
            return Err(if self.edges == 4 {
                NecError::Repeat
            } else {
                NecError::BadRepeat
            });
        }
        if self.edges < FRAME_EDGES {
            return Err(NecError::BadBlock);
        }

        let mut val = 0u32;
        for edge in (3..FRAME_EDGES - 2).step_by(2) {
            val >>= 1;
            if self.width(edge) > ONE_THRESHOLD {
                val |= 0x8000_0000;
            }
        }

        let command = ((val >> 16) & 0xFF) as u8;
        if command != ((val >> 24) as u8 ^ 0xFF) {
            return Err(NecError::BadData);
        }

        let mut address = (val & 0xFF) as u16;
        if address != ((val >> 8) as u16 ^ 0xFF) & 0xFF {
            if !self.extended {
                return Err(NecError::BadAddress);
            }
            address |= (val & 0xFF00) as u16;
        }
        Ok(NecCommand { address, command })
    }
}
