//! Simulated BME688 and virtual time for host builds
//!
//! [`SimulatedBme688`] is a register file that answers on the I2C bus like a
//! real part: it reports the chip id, serves calibration memory and fills the
//! field-0 data registers whenever forced mode is written. Raw codes are set
//! directly, so the whole driver pipeline runs without hardware.

use alloc::vec::Vec;
use core::cell::Cell;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use crate::clock::Clock;
use crate::outputs::StateMachineTx;
use crate::sensors::bme688::calibration::CalibrationConstants;
use crate::sensors::bme688::registers::{
    CALIB_A_LEN, CALIB_B_LEN, CHIP_ID, DEFAULT_ADDRESS, MODE_FORCED, NEW_DATA, REG_CALIB_A,
    REG_CALIB_B, REG_CHIP_ID, REG_CTRL_MEAS, REG_FIELD_0, REG_MEAS_STATUS_0, REG_RES_HEAT_RANGE,
    REG_RES_HEAT_VAL, REG_RESET, RawCodes, SOFT_RESET_CMD,
};

/// Coefficients typical of a production part.
pub fn reference_calibration() -> CalibrationConstants {
    CalibrationConstants {
        par_t1: 25986,
        par_t2: 26316,
        par_t3: 3,
        par_p1: 36191,
        par_p2: -10392,
        par_p3: 88,
        par_p4: 7045,
        par_p5: -82,
        par_p6: 30,
        par_p7: 40,
        par_p8: -1612,
        par_p9: -3136,
        par_p10: 30,
        par_h1: 778,
        par_h2: 1020,
        par_h3: 0,
        par_h4: 45,
        par_h5: 20,
        par_h6: 120,
        par_h7: -100,
        par_g1: -3,
        par_g2: -12049,
        par_g3: 18,
        res_heat_range: 1,
        res_heat_val: 44,
    }
}

/// Raw codes that compensate to 26.43 °C, 101364 Pa, 40 % and 939400 ohm
/// with [`reference_calibration`].
pub const REFERENCE_CODES: RawCodes = RawCodes {
    temperature: 500_000,
    pressure: 350_000,
    humidity: 20_800,
    gas: 600,
    gas_range: 6,
    gas_valid: true,
    heater_stable: true,
};

/// Lays calibration constants out the way the part stores them: block A
/// from 0x8A, block B from 0xE1, then `res_heat_val` and `res_heat_range`.
pub fn encode_calibration(
    calib: &CalibrationConstants,
) -> ([u8; CALIB_A_LEN], [u8; CALIB_B_LEN], u8, u8) {
    let mut a = [0u8; CALIB_A_LEN];
    let mut b = [0u8; CALIB_B_LEN];
    let mut put_a = |reg: u8, value: u8| a[(reg - REG_CALIB_A) as usize] = value;
    let word = |value: i32| ((value >> 8) as u8, value as u8);

    let (msb, lsb) = word(calib.par_t2 as i32);
    put_a(0x8B, msb);
    put_a(0x8A, lsb);
    put_a(0x8C, calib.par_t3 as u8);
    let (msb, lsb) = word(calib.par_p1 as i32);
    put_a(0x8F, msb);
    put_a(0x8E, lsb);
    let (msb, lsb) = word(calib.par_p2 as i32);
    put_a(0x91, msb);
    put_a(0x90, lsb);
    put_a(0x92, calib.par_p3 as u8);
    let (msb, lsb) = word(calib.par_p4 as i32);
    put_a(0x95, msb);
    put_a(0x94, lsb);
    let (msb, lsb) = word(calib.par_p5 as i32);
    put_a(0x97, msb);
    put_a(0x96, lsb);
    put_a(0x99, calib.par_p6 as u8);
    put_a(0x98, calib.par_p7 as u8);
    let (msb, lsb) = word(calib.par_p8 as i32);
    put_a(0x9D, msb);
    put_a(0x9C, lsb);
    let (msb, lsb) = word(calib.par_p9 as i32);
    put_a(0x9F, msb);
    put_a(0x9E, lsb);
    put_a(0xA0, calib.par_p10 as u8);

    let mut put_b = |reg: u8, value: u8| b[(reg - REG_CALIB_B) as usize] = value;
    put_b(0xE1, (calib.par_h2 >> 4) as u8);
    put_b(0xE2, (((calib.par_h2 & 0x0F) << 4) | (calib.par_h1 & 0x0F)) as u8);
    put_b(0xE3, (calib.par_h1 >> 4) as u8);
    put_b(0xE4, calib.par_h3 as u8);
    put_b(0xE5, calib.par_h4 as u8);
    put_b(0xE6, calib.par_h5 as u8);
    put_b(0xE7, calib.par_h6 as u8);
    put_b(0xE8, calib.par_h7 as u8);
    let (msb, lsb) = word(calib.par_t1 as i32);
    put_b(0xEA, msb);
    put_b(0xE9, lsb);
    let (msb, lsb) = word(calib.par_g2 as i32);
    put_b(0xEB, msb);
    put_b(0xEC, lsb);
    put_b(0xED, calib.par_g1 as u8);
    put_b(0xEE, calib.par_g3);

    (
        a,
        b,
        calib.res_heat_val as u8,
        (calib.res_heat_range & 0x03) << 4,
    )
}

/// BME688 register file behind an I2C interface.
pub struct SimulatedBme688 {
    address: u8,
    registers: [u8; 256],
    pointer: u8,
    codes: RawCodes,
    never_ready: bool,
    measurements: u32,
}

impl Default for SimulatedBme688 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBme688 {
    /// A part with [`reference_calibration`] publishing [`REFERENCE_CODES`].
    pub fn new() -> Self {
        Self::with_calibration(&reference_calibration())
    }

    pub fn with_calibration(calib: &CalibrationConstants) -> Self {
        let mut sim = Self {
            address: DEFAULT_ADDRESS,
            registers: [0; 256],
            pointer: 0,
            codes: REFERENCE_CODES,
            never_ready: false,
            measurements: 0,
        };
        let (a, b, res_heat_val, res_heat_range) = encode_calibration(calib);
        let start = REG_CALIB_A as usize;
        sim.registers[start..start + CALIB_A_LEN].copy_from_slice(&a);
        let start = REG_CALIB_B as usize;
        sim.registers[start..start + CALIB_B_LEN].copy_from_slice(&b);
        sim.registers[REG_RES_HEAT_VAL as usize] = res_heat_val;
        sim.registers[REG_RES_HEAT_RANGE as usize] = res_heat_range;
        sim.registers[REG_CHIP_ID as usize] = CHIP_ID;
        sim
    }

    /// Codes published by the next forced measurement.
    pub fn set_codes(&mut self, codes: RawCodes) {
        self.codes = codes;
    }

    pub fn codes(&self) -> RawCodes {
        self.codes
    }

    pub fn set_chip_id(&mut self, id: u8) {
        self.registers[REG_CHIP_ID as usize] = id;
    }

    /// When set, forced measurements never raise the new-data flag.
    pub fn set_never_ready(&mut self, never_ready: bool) {
        self.never_ready = never_ready;
    }

    /// Forced measurements completed so far.
    pub fn measurement_count(&self) -> u32 {
        self.measurements
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.registers[reg as usize]
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            REG_RESET if value == SOFT_RESET_CMD => {
                for reg in 0x70..=0x75 {
                    self.registers[reg] = 0;
                }
                self.registers[REG_MEAS_STATUS_0 as usize] = 0;
            }
            REG_RESET => {}
            REG_CTRL_MEAS => {
                self.registers[reg as usize] = value;
                if value & 0x03 == MODE_FORCED {
                    self.run_measurement();
                }
            }
            _ => self.registers[reg as usize] = value,
        }
    }

    fn run_measurement(&mut self) {
        let status = REG_MEAS_STATUS_0 as usize;
        self.registers[status] &= !NEW_DATA;
        if self.never_ready {
            return;
        }

        let codes = self.codes;
        let field = REG_FIELD_0 as usize;
        let twenty_bit = |code: u32| [(code >> 12) as u8, (code >> 4) as u8, ((code & 0x0F) << 4) as u8];
        self.registers[field..field + 3].copy_from_slice(&twenty_bit(codes.pressure));
        self.registers[field + 3..field + 6].copy_from_slice(&twenty_bit(codes.temperature));
        self.registers[field + 6] = (codes.humidity >> 8) as u8;
        self.registers[field + 7] = codes.humidity as u8;
        self.registers[field + 13] = (codes.gas >> 2) as u8;
        self.registers[field + 14] = (((codes.gas & 0x03) as u8) << 6)
            | if codes.gas_valid { 0x20 } else { 0 }
            | if codes.heater_stable { 0x10 } else { 0 }
            | (codes.gas_range & 0x0F);

        self.registers[status] |= NEW_DATA;
        // Back to sleep once the cycle is done
        self.registers[REG_CTRL_MEAS as usize] &= !0x03;
        self.measurements += 1;
    }
}

impl ErrorType for SimulatedBme688 {
    type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for SimulatedBme688 {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => match bytes {
                    [] => {}
                    [reg] => self.pointer = *reg,
                    // Burst writes are register/value pairs
                    pairs => {
                        for pair in pairs.chunks(2) {
                            if let [reg, value] = pair {
                                self.write_register(*reg, *value);
                            }
                        }
                    }
                },
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = self.registers[self.pointer as usize];
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Monotonic clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: Cell<u64>,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            micros: Cell::new(0),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms * 1000);
    }

    pub fn advance_us(&self, us: u64) {
        self.micros.set(self.micros.get() + us);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.micros.get() / 1000
    }
}

/// Delay that returns immediately and moves a [`ManualClock`] forward
/// instead, so multi-minute burn-ins run instantly.
#[derive(Debug, Clone, Copy)]
pub struct SimDelay<'a> {
    clock: &'a ManualClock,
}

impl<'a> SimDelay<'a> {
    pub fn new(clock: &'a ManualClock) -> Self {
        Self { clock }
    }
}

impl DelayNs for SimDelay<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_us(ns as u64 / 1000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.clock.advance_us(us as u64);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_ms(ms as u64);
    }
}

/// State machine transmit FIFO that records every word pushed into it.
#[derive(Debug, Default)]
pub struct RecordingStateMachine {
    words: Vec<u32>,
    enabled: bool,
    failing: bool,
}

/// Error of a [`RecordingStateMachine`] built with [`RecordingStateMachine::failing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoStalled;

impl RecordingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state machine whose FIFO rejects every push.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn last_word(&self) -> Option<u32> {
        self.words.last().copied()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}

impl StateMachineTx for RecordingStateMachine {
    type Error = FifoStalled;

    fn push(&mut self, word: u32) -> Result<(), Self::Error> {
        if self.failing {
            return Err(FifoStalled);
        }
        self.words.push(word);
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        if self.failing {
            return Err(FifoStalled);
        }
        self.enabled = enabled;
        Ok(())
    }
}
