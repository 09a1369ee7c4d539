//! In-memory bus and pin doubles for driver unit tests.
//!
//! Every double is a cheap `Clone` over shared state, so a test keeps one
//! handle for scripting/inspection and moves the other into the driver.

extern crate std;

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::vec;
use std::vec::Vec;

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital;
use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource};
use embedded_hal::pwm::{self, SetDutyCycle};
use embedded_hal::spi::{self, SpiDevice};

use crate::analog::AdcChannel;

// ── I2C ─────────────────────────────────────────────────────────────

/// I2C target double.
///
/// In register mode the first `address_width` bytes of every write set the
/// register pointer and the rest land in `mem` with auto-increment; reads
/// come from `mem` at the pointer. Queued raw replies take priority over
/// the register map, which is how status-polling and register-less parts
/// (PCF8574, PCA9546) are scripted. Per-register read scripts sit between
/// the two: a byte read at a scripted address pops the script first, which
/// covers status bits the device changes on its own.
#[derive(Clone)]
pub struct MockI2c {
    inner: Rc<RefCell<I2cState>>,
}

struct I2cState {
    registers: bool,
    address_width: usize,
    mem: Vec<u8>,
    pointer: usize,
    replies: VecDeque<Vec<u8>>,
    writes: Vec<(u8, Vec<u8>)>,
    present: Option<u8>,
    fail: bool,
    auto_increment: bool,
    reg_scripts: BTreeMap<usize, VecDeque<u8>>,
}

impl MockI2c {
    /// Register-mapped device with 8-bit register addresses.
    pub fn new() -> Self {
        Self::with_state(true, 1)
    }

    /// Device with 16-bit memory addressing (EEPROMs).
    pub fn wide() -> Self {
        Self::with_state(true, 2)
    }

    /// Register-less device; writes are only recorded.
    pub fn raw() -> Self {
        Self::with_state(false, 0)
    }

    fn with_state(registers: bool, address_width: usize) -> Self {
        let size = if address_width == 2 { 1 << 16 } else { 256 };
        MockI2c {
            inner: Rc::new(RefCell::new(I2cState {
                registers,
                address_width,
                mem: vec![0; size],
                pointer: 0,
                replies: VecDeque::new(),
                writes: Vec::new(),
                present: None,
                fail: false,
                auto_increment: true,
                reg_scripts: BTreeMap::new(),
            })),
        }
    }

    /// Only this address ACKs; anything else NACKs.
    pub fn only_address(&self, addr: u8) {
        self.inner.borrow_mut().present = Some(addr);
    }

    /// Make every following transaction fail with a bus error.
    pub fn set_fail(&self, fail: bool) {
        self.inner.borrow_mut().fail = fail;
    }

    /// With auto-increment off every data byte of a write lands on the
    /// same register, as on parts whose increment bit is clear.
    pub fn set_auto_increment(&self, on: bool) {
        self.inner.borrow_mut().auto_increment = on;
    }

    pub fn set_regs(&self, reg: usize, data: &[u8]) {
        let mut s = self.inner.borrow_mut();
        s.mem[reg..reg + data.len()].copy_from_slice(data);
    }

    /// Values returned by the next reads of `reg`, ahead of its stored
    /// content. Writes to `reg` still update the map.
    pub fn script_reg(&self, reg: usize, values: &[u8]) {
        self.inner
            .borrow_mut()
            .reg_scripts
            .entry(reg)
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn reg(&self, reg: usize) -> u8 {
        self.inner.borrow().mem[reg]
    }

    pub fn regs(&self, reg: usize, len: usize) -> Vec<u8> {
        self.inner.borrow().mem[reg..reg + len].to_vec()
    }

    pub fn queue_read(&self, data: &[u8]) {
        self.inner.borrow_mut().replies.push_back(data.to_vec());
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.inner.borrow().writes.clone()
    }

    /// Payloads written, ignoring the target address.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner
            .borrow()
            .writes
            .iter()
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn last_write(&self) -> Option<Vec<u8>> {
        self.inner.borrow().writes.last().map(|(_, d)| d.clone())
    }

    pub fn clear_writes(&self) {
        self.inner.borrow_mut().writes.clear();
    }
}

impl Default for MockI2c {
    fn default() -> Self {
        Self::new()
    }
}

impl i2c::ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl i2c::I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut s = self.inner.borrow_mut();
        if s.fail {
            return Err(ErrorKind::Bus);
        }
        if let Some(present) = s.present {
            if present != address {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
        }

        for op in operations.iter_mut() {
            match op {
                i2c::Operation::Write(bytes) => {
                    s.writes.push((address, bytes.to_vec()));
                    if !s.registers || bytes.is_empty() {
                        continue;
                    }
                    let width = s.address_width.min(bytes.len());
                    let mut ptr = 0usize;
                    for &b in &bytes[..width] {
                        ptr = (ptr << 8) | b as usize;
                    }
                    let len = s.mem.len();
                    let step = usize::from(s.auto_increment);
                    for &b in &bytes[width..] {
                        s.mem[ptr % len] = b;
                        ptr += step;
                    }
                    s.pointer = if bytes.len() > width { ptr % len } else { ptr };
                }
                i2c::Operation::Read(buf) => {
                    if let Some(reply) = s.replies.pop_front() {
                        let n = reply.len().min(buf.len());
                        buf[..n].copy_from_slice(&reply[..n]);
                        for b in buf[n..].iter_mut() {
                            *b = 0;
                        }
                    } else if s.registers {
                        let len = s.mem.len();
                        for b in buf.iter_mut() {
                            let at = s.pointer % len;
                            let scripted = s.reg_scripts.get_mut(&at).and_then(|q| q.pop_front());
                            *b = scripted.unwrap_or(s.mem[at]);
                            s.pointer += 1;
                        }
                    } else {
                        buf.fill(0);
                    }
                }
            }
        }
        Ok(())
    }
}

// ── SPI ─────────────────────────────────────────────────────────────

/// SPI device double recording one byte vector per transaction.
#[derive(Clone, Default)]
pub struct MockSpi {
    inner: Rc<RefCell<SpiState>>,
}

#[derive(Default)]
struct SpiState {
    transactions: Vec<Vec<u8>>,
    replies: VecDeque<u8>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(&self) -> Vec<Vec<u8>> {
        self.inner.borrow().transactions.clone()
    }

    /// Bytes clocked back on the following reads; 0xFF once drained.
    pub fn queue_reply(&self, data: &[u8]) {
        self.inner.borrow_mut().replies.extend(data.iter().copied());
    }

    /// Every byte the driver sent, across transactions.
    pub fn sent(&self) -> Vec<u8> {
        self.inner.borrow().transactions.concat()
    }
}

impl spi::ErrorType for MockSpi {
    type Error = spi::ErrorKind;
}

impl SpiDevice for MockSpi {
    fn transaction(&mut self, operations: &mut [spi::Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut s = self.inner.borrow_mut();
        let mut sent = Vec::new();
        for op in operations.iter_mut() {
            match op {
                spi::Operation::Write(data) => sent.extend_from_slice(data),
                spi::Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = s.replies.pop_front().unwrap_or(0xFF);
                    }
                }
                spi::Operation::Transfer(read, write) => {
                    sent.extend_from_slice(write);
                    for b in read.iter_mut() {
                        *b = s.replies.pop_front().unwrap_or(0xFF);
                    }
                }
                spi::Operation::TransferInPlace(buf) => {
                    sent.extend_from_slice(buf);
                    for b in buf.iter_mut() {
                        *b = s.replies.pop_front().unwrap_or(0xFF);
                    }
                }
                spi::Operation::DelayNs(_) => {}
            }
        }
        s.transactions.push(sent);
        Ok(())
    }
}

// ── GPIO ────────────────────────────────────────────────────────────

/// Pin double usable as input, output or open-drain.
///
/// Reads pop scripted levels first, then fall back to `idle` (if set) or
/// the last driven output level.
#[derive(Clone, Default)]
pub struct MockPin {
    inner: Rc<RefCell<PinState>>,
}

#[derive(Default)]
struct PinState {
    level: bool,
    idle: Option<bool>,
    script: VecDeque<bool>,
    history: Vec<bool>,
    reads: usize,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn high() -> Self {
        let pin = Self::default();
        pin.inner.borrow_mut().idle = Some(true);
        pin
    }

    pub fn low() -> Self {
        let pin = Self::default();
        pin.inner.borrow_mut().idle = Some(false);
        pin
    }

    pub fn set_idle(&self, level: bool) {
        self.inner.borrow_mut().idle = Some(level);
    }

    /// Queue levels returned by the next reads.
    pub fn script(&self, levels: &[bool]) {
        self.inner.borrow_mut().script.extend(levels.iter().copied());
    }

    /// Queue `count` reads of `level`.
    pub fn script_run(&self, level: bool, count: usize) {
        let mut s = self.inner.borrow_mut();
        for _ in 0..count {
            s.script.push_back(level);
        }
    }

    pub fn level(&self) -> bool {
        self.inner.borrow().level
    }

    pub fn history(&self) -> Vec<bool> {
        self.inner.borrow().history.clone()
    }

    pub fn reads(&self) -> usize {
        self.inner.borrow().reads
    }

    pub fn clear_history(&self) {
        self.inner.borrow_mut().history.clear();
    }
}

impl digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl digital::InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut s = self.inner.borrow_mut();
        s.reads += 1;
        let level = match s.script.pop_front() {
            Some(level) => level,
            None => s.idle.unwrap_or(s.level),
        };
        Ok(level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|h| !h)
    }
}

impl digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut s = self.inner.borrow_mut();
        s.level = false;
        s.history.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut s = self.inner.borrow_mut();
        s.level = true;
        s.history.push(true);
        Ok(())
    }
}

impl digital::StatefulOutputPin for MockPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.inner.borrow().level)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.inner.borrow().level)
    }
}

// ── PWM ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockPwm {
    inner: Rc<RefCell<PwmState>>,
}

struct PwmState {
    max: u16,
    duty: u16,
    history: Vec<u16>,
}

impl MockPwm {
    pub fn new(max: u16) -> Self {
        MockPwm {
            inner: Rc::new(RefCell::new(PwmState {
                max,
                duty: 0,
                history: Vec::new(),
            })),
        }
    }

    pub fn duty(&self) -> u16 {
        self.inner.borrow().duty
    }

    pub fn history(&self) -> Vec<u16> {
        self.inner.borrow().history.clone()
    }
}

impl pwm::ErrorType for MockPwm {
    type Error = Infallible;
}

impl SetDutyCycle for MockPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.inner.borrow().max
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let mut s = self.inner.borrow_mut();
        s.duty = duty;
        s.history.push(duty);
        Ok(())
    }
}

// ── ADC ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockAdc {
    inner: Rc<RefCell<AdcState>>,
}

#[derive(Default)]
struct AdcState {
    value: u16,
    script: VecDeque<u16>,
}

impl MockAdc {
    pub fn new(value: u16) -> Self {
        let adc = Self::default();
        adc.set(value);
        adc
    }

    pub fn set(&self, value: u16) {
        self.inner.borrow_mut().value = value;
    }

    pub fn script(&self, values: &[u16]) {
        self.inner.borrow_mut().script.extend(values.iter().copied());
    }
}

impl AdcChannel for MockAdc {
    type Error = Infallible;

    fn read_u16(&mut self) -> Result<u16, Self::Error> {
        let mut s = self.inner.borrow_mut();
        Ok(s.script.pop_front().unwrap_or(s.value))
    }
}

// ── UART ────────────────────────────────────────────────────────────

/// Serial double: bytes written are recorded, and each write pulls the
/// next queued reply into the receive buffer.
#[derive(Clone, Default)]
pub struct MockSerial {
    inner: Rc<RefCell<SerialState>>,
}

#[derive(Default)]
struct SerialState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, data: &[u8]) {
        self.inner.borrow_mut().rx.extend(data.iter().copied());
    }

    pub fn queue_reply(&self, data: &[u8]) {
        self.inner.borrow_mut().replies.push_back(data.to_vec());
    }

    pub fn sent(&self) -> Vec<u8> {
        self.inner.borrow().tx.clone()
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = Infallible;
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut s = self.inner.borrow_mut();
        let n = s.rx.len().min(buf.len());
        for b in buf.iter_mut().take(n) {
            *b = s.rx.pop_front().unwrap_or(0);
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.inner.borrow().rx.is_empty())
    }
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut s = self.inner.borrow_mut();
        s.tx.extend_from_slice(buf);
        if let Some(reply) = s.replies.pop_front() {
            s.rx.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ── Delay ───────────────────────────────────────────────────────────

/// Delay that only accumulates the requested time.
#[derive(Default)]
pub struct MockDelay {
    pub elapsed_ns: u64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_ns / 1_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}
