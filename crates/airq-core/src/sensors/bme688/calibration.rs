//! Factory calibration constants
//!
//! Every BME688 carries its own compensation coefficients in non-volatile
//! memory. They are read once after reset and never change afterwards.

use super::registers::{CALIB_A_LEN, CALIB_B_LEN, REG_CALIB_A, REG_CALIB_B, sign_extend};

/// Per-device compensation coefficients.
///
/// Signedness follows the board firmware's register interpretation, which
/// treats `par_t1`, `par_p10`, `par_h6` and `res_heat_val` as signed and
/// assembles `par_g2` with 0xEB as the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationConstants {
    pub par_t1: i16,
    pub par_t2: i16,
    pub par_t3: i8,

    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: i8,

    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: i8,
    pub par_h7: i8,

    pub par_g1: i8,
    pub par_g2: i16,
    pub par_g3: u8,
    pub res_heat_range: u8,
    pub res_heat_val: i8,
}

impl CalibrationConstants {
    /// Builds the constants from the two calibration bursts and the two
    /// heater registers.
    ///
    /// `block_a` starts at 0x8A and `block_b` at 0xE1.
    pub fn from_registers(
        block_a: &[u8; CALIB_A_LEN],
        block_b: &[u8; CALIB_B_LEN],
        res_heat_val: u8,
        res_heat_range: u8,
    ) -> Self {
        let a = |reg: u8| block_a[(reg - REG_CALIB_A) as usize] as u32;
        let b = |reg: u8| block_b[(reg - REG_CALIB_B) as usize] as u32;
        let s8 = |v: u32| sign_extend(v, 8) as i8;
        let s16 = |msb: u32, lsb: u32| sign_extend((msb << 8) | lsb, 16) as i16;

        // 0xE2 holds par_h1 <3:0> and par_h2 <3:0>
        let h_shared = b(0xE2);

        Self {
            par_t1: s16(b(0xEA), b(0xE9)),
            par_t2: s16(a(0x8B), a(0x8A)),
            par_t3: s8(a(0x8C)),

            par_p1: ((a(0x8F) << 8) | a(0x8E)) as u16,
            par_p2: s16(a(0x91), a(0x90)),
            par_p3: s8(a(0x92)),
            par_p4: s16(a(0x95), a(0x94)),
            par_p5: s16(a(0x97), a(0x96)),
            par_p6: s8(a(0x99)),
            par_p7: s8(a(0x98)),
            par_p8: s16(a(0x9D), a(0x9C)),
            par_p9: s16(a(0x9F), a(0x9E)),
            par_p10: s8(a(0xA0)),

            par_h1: ((b(0xE3) << 4) | (h_shared & 0x0F)) as u16,
            par_h2: ((b(0xE1) << 4) | (h_shared >> 4)) as u16,
            par_h3: s8(b(0xE4)),
            par_h4: s8(b(0xE5)),
            par_h5: s8(b(0xE6)),
            par_h6: s8(b(0xE7)),
            par_h7: s8(b(0xE8)),

            par_g1: s8(b(0xED)),
            par_g2: s16(b(0xEB), b(0xEC)),
            par_g3: b(0xEE) as u8,
            res_heat_range: (res_heat_range >> 4) & 0x03,
            res_heat_val: res_heat_val as i8,
        }
    }
}
