//! BME688 register map and raw-code decoding

/// Default 7-bit address with SDO pulled high, as wired on the board.
pub const DEFAULT_ADDRESS: u8 = 0x77;

/// Value of the chip-ID register for the BME680/BME688 family.
pub const CHIP_ID: u8 = 0x61;

pub const REG_CHIP_ID: u8 = 0xD0;
/// Write [`SOFT_RESET_CMD`] here for a power-on-equivalent reset.
pub const REG_RESET: u8 = 0xE0;
pub const SOFT_RESET_CMD: u8 = 0xB6;

/// `<7:5>` temperature oversampling, `<4:2>` pressure oversampling, `<1:0>` mode.
pub const REG_CTRL_MEAS: u8 = 0x74;
/// `<2:0>` humidity oversampling.
pub const REG_CTRL_HUM: u8 = 0x72;
/// `<4:2>` IIR filter coefficient.
pub const REG_CONFIG: u8 = 0x75;
/// `<5>` run gas, `<3:0>` heater step selection.
pub const REG_CTRL_GAS_1: u8 = 0x71;
pub const RUN_GAS: u8 = 0x20;

/// Heater step 0 target resistance and on-time.
pub const REG_RES_HEAT_0: u8 = 0x5A;
pub const REG_GAS_WAIT_0: u8 = 0x64;

/// `<7>` new data, `<6>` gas measuring, `<5>` measuring.
pub const REG_MEAS_STATUS_0: u8 = 0x1D;
pub const NEW_DATA: u8 = 0x80;

pub const MODE_SLEEP: u8 = 0x00;
pub const MODE_FORCED: u8 = 0x01;

/// First data register (pressure MSB) of the field-0 burst.
pub const REG_FIELD_0: u8 = 0x1F;
/// Pressure, temperature, humidity and gas registers up to `gas_r_lsb` (0x2D).
pub const FIELD_0_LEN: usize = 15;

/// First calibration block, `par_t2` LSB (0x8A) through `par_p10` (0xA0).
pub const REG_CALIB_A: u8 = 0x8A;
pub const CALIB_A_LEN: usize = 23;
/// Second calibration block, `par_h2` MSB (0xE1) through `par_g3` (0xEE).
pub const REG_CALIB_B: u8 = 0xE1;
pub const CALIB_B_LEN: usize = 14;
pub const REG_RES_HEAT_VAL: u8 = 0x00;
pub const REG_RES_HEAT_RANGE: u8 = 0x02;

/// Interprets the low `bits` bits of `value` as a two's-complement number.
///
/// Calibration words come off the bus as unsigned bytes; the signed ones are
/// 8 or 16 bits wide.
pub const fn sign_extend(value: u32, bits: u32) -> i32 {
    let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
    let value = value & mask;
    if bits < 32 && value & (1 << (bits - 1)) != 0 {
        (value as i64 - (1i64 << bits)) as i32
    } else {
        value as i32
    }
}

/// Raw ADC codes and gas status bits as they come out of field 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawCodes {
    pub temperature: u32,
    pub pressure: u32,
    pub humidity: u32,
    pub gas: u32,
    pub gas_range: u8,
    pub gas_valid: bool,
    pub heater_stable: bool,
}

impl RawCodes {
    /// Reassembles the codes from a burst read starting at [`REG_FIELD_0`].
    ///
    /// Pressure and temperature are 20-bit (MSB, LSB, XLSB `<7:4>`), humidity
    /// is 16-bit and gas is 10-bit (MSB `<9:2>`, LSB `<7:6>`).
    pub fn from_field(buffer: &[u8; FIELD_0_LEN]) -> Self {
        let twenty_bit = |msb: u8, lsb: u8, xlsb: u8| {
            ((msb as u32) << 12) | ((lsb as u32) << 4) | ((xlsb as u32) >> 4)
        };
        let gas_lsb = buffer[14];

        Self {
            pressure: twenty_bit(buffer[0], buffer[1], buffer[2]),
            temperature: twenty_bit(buffer[3], buffer[4], buffer[5]),
            humidity: ((buffer[6] as u32) << 8) | buffer[7] as u32,
            gas: ((buffer[13] as u32) << 2) | ((gas_lsb as u32) >> 6),
            gas_range: gas_lsb & 0x0F,
            gas_valid: gas_lsb & 0x20 != 0,
            heater_stable: gas_lsb & 0x10 != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_extend_eight_bits() {
        assert_eq!(sign_extend(0x00, 8), 0);
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(0x80, 8), -128);
        assert_eq!(sign_extend(0xFF, 8), -1);
    }

    #[test]
    fn test_sign_extend_sixteen_bits() {
        assert_eq!(sign_extend(0x7FFF, 16), 32767);
        assert_eq!(sign_extend(0x8000, 16), -32768);
        assert_eq!(sign_extend(0xD768, 16), -10392);
    }

    #[test]
    fn test_sign_extend_recovers_every_pattern() {
        for v in i8::MIN..=i8::MAX {
            assert_eq!(sign_extend(v as u8 as u32, 8), v as i32);
        }
        for v in (i16::MIN..=i16::MAX).step_by(7) {
            let decoded = sign_extend(v as u16 as u32, 16);
            assert_eq!(decoded, v as i32);
            assert_eq!(decoded as u16, v as u16);
        }
    }

    #[test]
    fn test_field_decoding() {
        let buffer = [
            0x4E, 0x5A, 0x70, // pressure
            0x7E, 0x2D, 0x90, // temperature
            0x5A, 0x3C, // humidity
            0x80, 0x00, 0x00, 0x00, 0x00, // unused (0x27..=0x2B)
            0x9C, 0x7A, // gas MSB, gas LSB|valid|stable|range
        ];
        let raw = RawCodes::from_field(&buffer);

        assert_eq!(raw.pressure, 0x4E5A7);
        assert_eq!(raw.temperature, 0x7E2D9);
        assert_eq!(raw.humidity, 0x5A3C);
        assert_eq!(raw.gas, (0x9C << 2) | 0x01);
        assert_eq!(raw.gas_range, 0x0A);
        assert!(raw.gas_valid);
        assert!(raw.heater_stable);
    }
}
