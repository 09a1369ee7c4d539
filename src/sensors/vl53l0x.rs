// VL53L0X time-of-flight ranging sensor
//
// The part has no documented register map; bring-up replays the vendor
// API's private register writes (page select at 0xFF). `new` only stores
// the bus; `init` does the full sequence: 2V8 I/O, stop variable, SPAD
// selection, tuning table, interrupt config, timing budget and the two
// reference calibrations. Range is millimetres from RESULT_RANGE_STATUS +
// 10. Timeouts are counted in macro periods, whose length depends on the
// VCSEL pulse period of each ranging phase.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDRESS: u8 = 0x29;
const MODEL_ID: u8 = 0xEE;

const IO_TIMEOUT_MS: u32 = 500;

/// Smallest budget the vendor API accepts.
pub const MIN_TIMING_BUDGET_US: u32 = 20_000;

mod reg {
    pub const SYSRANGE_START: u8 = 0x00;
    pub const SYSTEM_SEQUENCE_CONFIG: u8 = 0x01;
    pub const SYSTEM_INTERMEASUREMENT_PERIOD: u8 = 0x04;
    pub const SYSTEM_INTERRUPT_CONFIG_GPIO: u8 = 0x0A;
    pub const SYSTEM_INTERRUPT_CLEAR: u8 = 0x0B;
    pub const RESULT_INTERRUPT_STATUS: u8 = 0x13;
    pub const RESULT_RANGE_STATUS: u8 = 0x14;
    pub const ALGO_PHASECAL_LIM: u8 = 0x30;
    pub const ALGO_PHASECAL_CONFIG_TIMEOUT: u8 = 0x30;
    pub const GLOBAL_CONFIG_VCSEL_WIDTH: u8 = 0x32;
    pub const FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT: u8 = 0x44;
    pub const MSRC_CONFIG_TIMEOUT_MACROP: u8 = 0x46;
    pub const FINAL_RANGE_CONFIG_VALID_PHASE_LOW: u8 = 0x47;
    pub const FINAL_RANGE_CONFIG_VALID_PHASE_HIGH: u8 = 0x48;
    pub const DYNAMIC_SPAD_NUM_REQUESTED_REF_SPAD: u8 = 0x4E;
    pub const DYNAMIC_SPAD_REF_EN_START_OFFSET: u8 = 0x4F;
    pub const PRE_RANGE_CONFIG_VCSEL_PERIOD: u8 = 0x50;
    pub const PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI: u8 = 0x51;
    pub const PRE_RANGE_CONFIG_VALID_PHASE_LOW: u8 = 0x56;
    pub const PRE_RANGE_CONFIG_VALID_PHASE_HIGH: u8 = 0x57;
    pub const MSRC_CONFIG_CONTROL: u8 = 0x60;
    pub const FINAL_RANGE_CONFIG_VCSEL_PERIOD: u8 = 0x70;
    pub const FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI: u8 = 0x71;
    pub const GPIO_HV_MUX_ACTIVE_HIGH: u8 = 0x84;
    pub const VHV_CONFIG_PAD_SCL_SDA_EXTSUP_HV: u8 = 0x89;
    pub const I2C_SLAVE_DEVICE_ADDRESS: u8 = 0x8A;
    pub const GLOBAL_CONFIG_SPAD_ENABLES_REF_0: u8 = 0xB0;
    pub const GLOBAL_CONFIG_REF_EN_START_SELECT: u8 = 0xB6;
    pub const IDENTIFICATION_MODEL_ID: u8 = 0xC0;
    pub const OSC_CALIBRATE_VAL: u8 = 0xF8;
    pub const PAGE: u8 = 0xFF;
}

// Private vendor registers used around the stop variable and SPAD info.
const POWER_FORCE: u8 = 0x80;
const STOP_VARIABLE: u8 = 0x91;
const SPAD_INFO_READY: u8 = 0x83;
const SPAD_INFO: u8 = 0x92;

/// Default tuning settings, written verbatim after SPAD selection.
#[rustfmt::skip]
const TUNING: [(u8, u8); 80] = [
    (0xFF, 0x01), (0x00, 0x00), (0xFF, 0x00), (0x09, 0x00), (0x10, 0x00), (0x11, 0x00),
    (0x24, 0x01), (0x25, 0xFF), (0x75, 0x00), (0xFF, 0x01), (0x4E, 0x2C), (0x48, 0x00),
    (0x30, 0x20), (0xFF, 0x00), (0x30, 0x09), (0x54, 0x00), (0x31, 0x04), (0x32, 0x03),
    (0x40, 0x83), (0x46, 0x25), (0x60, 0x00), (0x27, 0x00), (0x50, 0x06), (0x51, 0x00),
    (0x52, 0x96), (0x56, 0x08), (0x57, 0x30), (0x61, 0x00), (0x62, 0x00), (0x64, 0x00),
    (0x65, 0x00), (0x66, 0xA0), (0xFF, 0x01), (0x22, 0x32), (0x47, 0x14), (0x49, 0xFF),
    (0x4A, 0x00), (0xFF, 0x00), (0x7A, 0x0A), (0x7B, 0x00), (0x78, 0x21), (0xFF, 0x01),
    (0x23, 0x34), (0x42, 0x00), (0x44, 0xFF), (0x45, 0x26), (0x46, 0x05), (0x40, 0x40),
    (0x0E, 0x06), (0x20, 0x1A), (0x43, 0x40), (0xFF, 0x00), (0x34, 0x03), (0x35, 0x44),
    (0xFF, 0x01), (0x31, 0x04), (0x4B, 0x09), (0x4C, 0x05), (0x4D, 0x04), (0xFF, 0x00),
    (0x44, 0x00), (0x45, 0x20), (0x47, 0x08), (0x48, 0x28), (0x67, 0x00), (0x70, 0x04),
    (0x71, 0x01), (0x72, 0xFE), (0x76, 0x00), (0x77, 0x00), (0xFF, 0x01), (0x0D, 0x01),
    (0xFF, 0x00), (0x80, 0x01), (0x01, 0xF8), (0xFF, 0x01), (0x8E, 0x01), (0x00, 0x01),
    (0xFF, 0x00), (0x80, 0x00),
];

mod overhead {
    pub const START_GET: u32 = 1910;
    pub const START_SET: u32 = 1320;
    pub const END: u32 = 960;
    pub const MSRC: u32 = 660;
    pub const TCC: u32 = 590;
    pub const DSS: u32 = 690;
    pub const PRE_RANGE: u32 = 660;
    pub const FINAL_RANGE: u32 = 550;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcselPeriod {
    PreRange,
    FinalRange,
}

/// Ranging phases switched on in SYSTEM_SEQUENCE_CONFIG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceStepEnables {
    pub tcc: bool,
    pub dss: bool,
    pub msrc: bool,
    pub pre_range: bool,
    pub final_range: bool,
}

impl SequenceStepEnables {
    fn from_config(config: u8) -> Self {
        Self {
            tcc: config & 0x10 != 0,
            dss: config & 0x08 != 0,
            msrc: config & 0x04 != 0,
            pre_range: config & 0x40 != 0,
            final_range: config & 0x80 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceStepTimeouts {
    pub pre_range_vcsel_period_pclks: u32,
    pub final_range_vcsel_period_pclks: u32,
    pub msrc_dss_tcc_mclks: u32,
    pub pre_range_mclks: u32,
    pub final_range_mclks: u32,
    pub msrc_dss_tcc_us: u32,
    pub pre_range_us: u32,
    pub final_range_us: u32,
}

/// Macro period in ns for a VCSEL period in PCLKs.
pub fn macro_period_ns(vcsel_period_pclks: u32) -> u32 {
    (2304 * vcsel_period_pclks * 1655 + 500) / 1000
}

pub fn timeout_mclks_to_us(mclks: u32, vcsel_period_pclks: u32) -> u32 {
    let macro_ns = macro_period_ns(vcsel_period_pclks) as u64;
    ((mclks as u64 * macro_ns + 500) / 1000) as u32
}

pub fn timeout_us_to_mclks(us: u32, vcsel_period_pclks: u32) -> u32 {
    let macro_ns = macro_period_ns(vcsel_period_pclks) as u64;
    ((us as u64 * 1000 + macro_ns / 2) / macro_ns) as u32
}

/// Register form is `LSB * 2^MSB + 1` MCLKs.
pub fn decode_timeout(value: u16) -> u32 {
    (((value & 0x00FF) as u32) << ((value >> 8) & 0x1F)) + 1
}

pub fn encode_timeout(mclks: u32) -> u16 {
    if mclks == 0 {
        return 0;
    }
    let mut ls = mclks - 1;
    let mut ms = 0u16;
    while ls & 0xFFFF_FF00 != 0 {
        ls >>= 1;
        ms += 1;
    }
    (ms << 8) | (ls & 0xFF) as u16
}

fn decode_vcsel_period(value: u8) -> u32 {
    ((value as u32) + 1) << 1
}

fn encode_vcsel_period(pclks: u8) -> u8 {
    (pclks >> 1) - 1
}

pub struct Vl53l0x<I2C> {
    i2c: I2C,
    address: u8,
    stop_variable: u8,
    timing_budget_us: u32,
}

impl<I2C: I2c> Vl53l0x<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            stop_variable: 0,
            timing_budget_us: 0,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Move the sensor to another address; lost on power cycle.
    pub fn set_address(&mut self, address: u8) -> Result<(), I2C::Error> {
        let address = address & 0x7F;
        self.write_reg(reg::I2C_SLAVE_DEVICE_ADDRESS, address)?;
        self.address = address;
        Ok(())
    }

    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), I2C::Error> {
        let id = self.read_reg(reg::IDENTIFICATION_MODEL_ID)?;
        if id != MODEL_ID {
            log::warn!("VL53L0X: unexpected model id {:#04x}", id);
            return Err(Error::InvalidResponse);
        }

        // 2V8 I/O levels
        self.modify(reg::VHV_CONFIG_PAD_SCL_SDA_EXTSUP_HV, 0x01, 0x01)?;
        self.write_reg(0x88, 0x00)?;
        self.write_all(&[(POWER_FORCE, 0x01), (reg::PAGE, 0x01), (0x00, 0x00)])?;
        self.stop_variable = self.read_reg(STOP_VARIABLE)?;
        self.write_all(&[(0x00, 0x01), (reg::PAGE, 0x00), (POWER_FORCE, 0x00)])?;

        // no signal rate or min count rate limit checks in MSRC
        self.modify(reg::MSRC_CONFIG_CONTROL, 0x12, 0x12)?;
        self.set_signal_rate_limit(0.25)?;
        self.write_reg(reg::SYSTEM_SEQUENCE_CONFIG, 0xFF)?;

        let (spad_count, aperture) = self.spad_info(delay)?;
        self.select_reference_spads(spad_count, aperture)?;

        self.write_all(&TUNING)?;

        // new-sample-ready interrupt, active low
        self.write_reg(reg::SYSTEM_INTERRUPT_CONFIG_GPIO, 0x04)?;
        self.modify(reg::GPIO_HV_MUX_ACTIVE_HIGH, 0x10, 0x00)?;
        self.write_reg(reg::SYSTEM_INTERRUPT_CLEAR, 0x01)?;

        self.timing_budget_us = self.measurement_timing_budget()?;
        // skip MSRC and TCC by default
        self.write_reg(reg::SYSTEM_SEQUENCE_CONFIG, 0xE8)?;
        self.set_measurement_timing_budget(self.timing_budget_us)?;

        self.write_reg(reg::SYSTEM_SEQUENCE_CONFIG, 0x01)?;
        self.single_ref_calibration(0x40, delay)?;
        self.write_reg(reg::SYSTEM_SEQUENCE_CONFIG, 0x02)?;
        self.single_ref_calibration(0x00, delay)?;
        self.write_reg(reg::SYSTEM_SEQUENCE_CONFIG, 0xE8)?;

        log::info!(
            "VL53L0X at {:#04x}: {} reference SPADs, budget {} us",
            self.address,
            spad_count,
            self.timing_budget_us
        );
        Ok(())
    }

    /// Return-signal rate limit in MCPS (Q9.7 fixed point).
    pub fn set_signal_rate_limit(&mut self, mcps: f32) -> Result<(), I2C::Error> {
        if !(0.0..=511.99).contains(&mcps) {
            return Err(Error::InvalidArgument("signal rate limit must be 0..=511.99 MCPS"));
        }
        self.write16(reg::FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT, (mcps * 128.0) as u16)
    }

    pub fn signal_rate_limit(&mut self) -> Result<f32, I2C::Error> {
        Ok(self.read16(reg::FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT)? as f32 / 128.0)
    }

    pub fn sequence_step_enables(&mut self) -> Result<SequenceStepEnables, I2C::Error> {
        Ok(SequenceStepEnables::from_config(
            self.read_reg(reg::SYSTEM_SEQUENCE_CONFIG)?,
        ))
    }

    pub fn sequence_step_timeouts(
        &mut self,
        enables: &SequenceStepEnables,
    ) -> Result<SequenceStepTimeouts, I2C::Error> {
        let mut t = SequenceStepTimeouts {
            pre_range_vcsel_period_pclks: self.vcsel_pulse_period(VcselPeriod::PreRange)?,
            final_range_vcsel_period_pclks: self.vcsel_pulse_period(VcselPeriod::FinalRange)?,
            msrc_dss_tcc_mclks: self.read_reg(reg::MSRC_CONFIG_TIMEOUT_MACROP)? as u32 + 1,
            pre_range_mclks: decode_timeout(self.read16(reg::PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI)?),
            final_range_mclks: decode_timeout(self.read16(reg::FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI)?),
            ..Default::default()
        };
        if enables.pre_range {
            t.final_range_mclks = t.final_range_mclks.saturating_sub(t.pre_range_mclks);
        }
        t.msrc_dss_tcc_us = timeout_mclks_to_us(t.msrc_dss_tcc_mclks, t.pre_range_vcsel_period_pclks);
        t.pre_range_us = timeout_mclks_to_us(t.pre_range_mclks, t.pre_range_vcsel_period_pclks);
        t.final_range_us = timeout_mclks_to_us(t.final_range_mclks, t.final_range_vcsel_period_pclks);
        Ok(t)
    }

    /// Time one measurement takes, in µs, from the current sequence
    /// configuration.
    pub fn measurement_timing_budget(&mut self) -> Result<u32, I2C::Error> {
        let enables = self.sequence_step_enables()?;
        let t = self.sequence_step_timeouts(&enables)?;
        let mut budget = overhead::START_GET + overhead::END;
        if enables.tcc {
            budget += t.msrc_dss_tcc_us + overhead::TCC;
        }
        if enables.dss {
            budget += 2 * (t.msrc_dss_tcc_us + overhead::DSS);
        } else if enables.msrc {
            budget += t.msrc_dss_tcc_us + overhead::MSRC;
        }
        if enables.pre_range {
            budget += t.pre_range_us + overhead::PRE_RANGE;
        }
        if enables.final_range {
            budget += t.final_range_us + overhead::FINAL_RANGE;
        }
        Ok(budget)
    }

    /// Give the final range phase whatever the other phases leave of
    /// `budget_us`. Longer budgets trade rate for accuracy.
    pub fn set_measurement_timing_budget(&mut self, budget_us: u32) -> Result<(), I2C::Error> {
        if budget_us < MIN_TIMING_BUDGET_US {
            return Err(Error::InvalidArgument("timing budget below 20 ms"));
        }
        let enables = self.sequence_step_enables()?;
        let t = self.sequence_step_timeouts(&enables)?;

        let mut used = overhead::START_SET + overhead::END;
        if enables.tcc {
            used += t.msrc_dss_tcc_us + overhead::TCC;
        }
        if enables.dss {
            used += 2 * (t.msrc_dss_tcc_us + overhead::DSS);
        } else if enables.msrc {
            used += t.msrc_dss_tcc_us + overhead::MSRC;
        }
        if enables.pre_range {
            used += t.pre_range_us + overhead::PRE_RANGE;
        }

        if enables.final_range {
            used += overhead::FINAL_RANGE;
            if used > budget_us {
                return Err(Error::InvalidArgument("timing budget too short for enabled steps"));
            }
            let mut final_mclks = timeout_us_to_mclks(budget_us - used, t.final_range_vcsel_period_pclks);
            if enables.pre_range {
                final_mclks += t.pre_range_mclks;
            }
            self.write16(reg::FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI, encode_timeout(final_mclks))?;
        }
        self.timing_budget_us = budget_us;
        Ok(())
    }

    pub fn vcsel_pulse_period(&mut self, kind: VcselPeriod) -> Result<u32, I2C::Error> {
        let reg = match kind {
            VcselPeriod::PreRange => reg::PRE_RANGE_CONFIG_VCSEL_PERIOD,
            VcselPeriod::FinalRange => reg::FINAL_RANGE_CONFIG_VCSEL_PERIOD,
        };
        Ok(decode_vcsel_period(self.read_reg(reg)?))
    }

    /// Pre-range accepts 12, 14, 16 or 18 PCLKs; final range 8, 10, 12 or
    /// 14. Phase timeouts are rescaled to keep their duration, then the
    /// budget is reapplied and the phase calibration rerun.
    pub fn set_vcsel_pulse_period<D: DelayNs>(
        &mut self,
        kind: VcselPeriod,
        pclks: u8,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        let enables = self.sequence_step_enables()?;
        let t = self.sequence_step_timeouts(&enables)?;
        let encoded = match (kind, pclks) {
            (VcselPeriod::PreRange, 12 | 14 | 16 | 18) | (VcselPeriod::FinalRange, 8 | 10 | 12 | 14) => {
                encode_vcsel_period(pclks)
            }
            _ => return Err(Error::InvalidArgument("unsupported VCSEL period")),
        };
        let period = pclks as u32;

        match kind {
            VcselPeriod::PreRange => {
                let phase_high = match pclks {
                    12 => 0x18,
                    14 => 0x30,
                    16 => 0x40,
                    _ => 0x50,
                };
                self.write_reg(reg::PRE_RANGE_CONFIG_VALID_PHASE_HIGH, phase_high)?;
                self.write_reg(reg::PRE_RANGE_CONFIG_VALID_PHASE_LOW, 0x08)?;
                self.write_reg(reg::PRE_RANGE_CONFIG_VCSEL_PERIOD, encoded)?;

                let pre_mclks = timeout_us_to_mclks(t.pre_range_us, period);
                self.write16(reg::PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI, encode_timeout(pre_mclks))?;
                let msrc_mclks = timeout_us_to_mclks(t.msrc_dss_tcc_us, period);
                let msrc = if msrc_mclks > 256 { 255 } else { msrc_mclks.saturating_sub(1) as u8 };
                self.write_reg(reg::MSRC_CONFIG_TIMEOUT_MACROP, msrc)?;
            }
            VcselPeriod::FinalRange => {
                let (phase_high, width, phasecal_timeout, phasecal_lim) = match pclks {
                    8 => (0x10, 0x02, 0x0C, 0x30),
                    10 => (0x28, 0x03, 0x09, 0x20),
                    12 => (0x38, 0x03, 0x08, 0x20),
                    _ => (0x48, 0x03, 0x07, 0x20),
                };
                self.write_all(&[
                    (reg::FINAL_RANGE_CONFIG_VALID_PHASE_HIGH, phase_high),
                    (reg::FINAL_RANGE_CONFIG_VALID_PHASE_LOW, 0x08),
                    (reg::GLOBAL_CONFIG_VCSEL_WIDTH, width),
                    (reg::ALGO_PHASECAL_CONFIG_TIMEOUT, phasecal_timeout),
                    (reg::PAGE, 0x01),
                    (reg::ALGO_PHASECAL_LIM, phasecal_lim),
                    (reg::PAGE, 0x00),
                ])?;
                self.write_reg(reg::FINAL_RANGE_CONFIG_VCSEL_PERIOD, encoded)?;

                let mut final_mclks = timeout_us_to_mclks(t.final_range_us, period);
                if enables.pre_range {
                    final_mclks += t.pre_range_mclks;
                }
                self.write16(reg::FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI, encode_timeout(final_mclks))?;
            }
        }

        self.set_measurement_timing_budget(self.timing_budget_us)?;

        let config = self.read_reg(reg::SYSTEM_SEQUENCE_CONFIG)?;
        self.write_reg(reg::SYSTEM_SEQUENCE_CONFIG, 0x02)?;
        self.single_ref_calibration(0x00, delay)?;
        self.write_reg(reg::SYSTEM_SEQUENCE_CONFIG, config)
    }

    /// Continuous ranging. `period_ms == 0` runs back-to-back; otherwise
    /// the sensor waits `period_ms` between measurements.
    pub fn start_continuous(&mut self, period_ms: u32) -> Result<(), I2C::Error> {
        self.write_all(&[
            (POWER_FORCE, 0x01),
            (reg::PAGE, 0x01),
            (0x00, 0x00),
            (STOP_VARIABLE, self.stop_variable),
            (0x00, 0x01),
            (reg::PAGE, 0x00),
            (POWER_FORCE, 0x00),
        ])?;
        if period_ms == 0 {
            return self.write_reg(reg::SYSRANGE_START, 0x02);
        }
        let osc = self.read16(reg::OSC_CALIBRATE_VAL)? as u32;
        let period = if osc != 0 { period_ms * osc } else { period_ms };
        self.write32(reg::SYSTEM_INTERMEASUREMENT_PERIOD, period)?;
        self.write_reg(reg::SYSRANGE_START, 0x04)
    }

    pub fn stop_continuous(&mut self) -> Result<(), I2C::Error> {
        self.write_all(&[
            (reg::SYSRANGE_START, 0x01),
            (reg::PAGE, 0x01),
            (0x00, 0x00),
            (STOP_VARIABLE, 0x00),
            (0x00, 0x01),
            (reg::PAGE, 0x00),
        ])
    }

    /// Next result while continuous ranging runs, in mm.
    pub fn read_range_continuous<D: DelayNs>(&mut self, delay: &mut D) -> Result<u16, I2C::Error> {
        self.wait_for(delay, |status| status & 0x07 != 0, reg::RESULT_INTERRUPT_STATUS)?;
        let range = self.read16(reg::RESULT_RANGE_STATUS + 10)?;
        self.write_reg(reg::SYSTEM_INTERRUPT_CLEAR, 0x01)?;
        Ok(range)
    }

    /// One-shot measurement in mm.
    pub fn read_range_single<D: DelayNs>(&mut self, delay: &mut D) -> Result<u16, I2C::Error> {
        self.write_all(&[
            (POWER_FORCE, 0x01),
            (reg::PAGE, 0x01),
            (0x00, 0x00),
            (STOP_VARIABLE, self.stop_variable),
            (0x00, 0x01),
            (reg::PAGE, 0x00),
            (POWER_FORCE, 0x00),
            (reg::SYSRANGE_START, 0x01),
        ])?;
        self.wait_for(delay, |start| start & 0x01 == 0, reg::SYSRANGE_START)?;
        self.read_range_continuous(delay)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    // ── bring-up helpers ──

    fn spad_info<D: DelayNs>(&mut self, delay: &mut D) -> Result<(u8, bool), I2C::Error> {
        self.write_all(&[(POWER_FORCE, 0x01), (reg::PAGE, 0x01), (0x00, 0x00), (reg::PAGE, 0x06)])?;
        self.modify(SPAD_INFO_READY, 0x04, 0x04)?;
        self.write_all(&[
            (reg::PAGE, 0x07),
            (0x81, 0x01),
            (POWER_FORCE, 0x01),
            (0x94, 0x6B),
            (SPAD_INFO_READY, 0x00),
        ])?;
        self.wait_for(delay, |ready| ready != 0, SPAD_INFO_READY)?;
        self.write_reg(SPAD_INFO_READY, 0x01)?;
        let info = self.read_reg(SPAD_INFO)?;

        self.write_all(&[(0x81, 0x00), (reg::PAGE, 0x06)])?;
        self.modify(SPAD_INFO_READY, 0x04, 0x00)?;
        self.write_all(&[(reg::PAGE, 0x01), (0x00, 0x01), (reg::PAGE, 0x00), (POWER_FORCE, 0x00)])?;
        Ok((info & 0x7F, info & 0x80 != 0))
    }

    /// Keep the first `count` good SPADs, starting past the 12 non-aperture
    /// ones when aperture SPADs are requested.
    fn select_reference_spads(&mut self, count: u8, aperture: bool) -> Result<(), I2C::Error> {
        let mut map = [0u8; 6];
        self.read_regs(reg::GLOBAL_CONFIG_SPAD_ENABLES_REF_0, &mut map)?;
        self.write_all(&[
            (reg::PAGE, 0x01),
            (reg::DYNAMIC_SPAD_REF_EN_START_OFFSET, 0x00),
            (reg::DYNAMIC_SPAD_NUM_REQUESTED_REF_SPAD, 0x2C),
            (reg::PAGE, 0x00),
            (reg::GLOBAL_CONFIG_REF_EN_START_SELECT, 0xB4),
        ])?;

        let first = if aperture { 12 } else { 0 };
        let mut enabled = 0u8;
        for i in 0..48usize {
            let bit = 1u8 << (i % 8);
            if i < first || enabled == count {
                map[i / 8] &= !bit;
            } else if map[i / 8] & bit != 0 {
                enabled += 1;
            }
        }

        let mut frame = [0u8; 7];
        frame[0] = reg::GLOBAL_CONFIG_SPAD_ENABLES_REF_0;
        frame[1..].copy_from_slice(&map);
        self.i2c.write(self.address, &frame).map_err(Error::Bus)
    }

    fn single_ref_calibration<D: DelayNs>(&mut self, vhv_init: u8, delay: &mut D) -> Result<(), I2C::Error> {
        self.write_reg(reg::SYSRANGE_START, 0x01 | vhv_init)?;
        self.wait_for(delay, |status| status & 0x07 != 0, reg::RESULT_INTERRUPT_STATUS)?;
        self.write_reg(reg::SYSTEM_INTERRUPT_CLEAR, 0x01)?;
        self.write_reg(reg::SYSRANGE_START, 0x00)
    }

    fn wait_for<D: DelayNs>(
        &mut self,
        delay: &mut D,
        done: impl Fn(u8) -> bool,
        reg: u8,
    ) -> Result<(), I2C::Error> {
        for _ in 0..IO_TIMEOUT_MS {
            if done(self.read_reg(reg)?) {
                return Ok(());
            }
            delay.delay_ms(1);
        }
        log::warn!("VL53L0X: timeout waiting on register {:#04x}", reg);
        Err(Error::Timeout)
    }

    // ── register access ──

    fn modify(&mut self, reg: u8, mask: u8, value: u8) -> Result<(), I2C::Error> {
        let current = self.read_reg(reg)?;
        self.write_reg(reg, (current & !mask) | (value & mask))
    }

    fn write_all(&mut self, pairs: &[(u8, u8)]) -> Result<(), I2C::Error> {
        for &(reg, value) in pairs {
            self.write_reg(reg, value)?;
        }
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.read_regs(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.i2c
            .write_read(self.address, &[reg], buf)
            .map_err(Error::Bus)
    }

    fn read16(&mut self, reg: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.read_regs(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(Error::Bus)
    }

    fn write16(&mut self, reg: u8, value: u16) -> Result<(), I2C::Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[reg, hi, lo])
            .map_err(Error::Bus)
    }

    fn write32(&mut self, reg: u8, value: u32) -> Result<(), I2C::Error> {
        let [b0, b1, b2, b3] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[reg, b0, b1, b2, b3])
            .map_err(Error::Bus)
    }
}
