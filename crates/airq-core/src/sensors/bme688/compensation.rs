//! Integer compensation formulas
//!
//! Converts raw ADC codes into physical units with the manufacturer's
//! fixed-point polynomials. Arithmetic is done in `i64` (`i128` for the cubic
//! pressure tail) with floor division and arithmetic right shifts, so
//! results match the reference integer implementation bit for bit.
//!
//! Temperature must be compensated first in every cycle: its
//! [`TemperatureStage`] carries `t_fine` into the pressure formula and the
//! whole-degree temperature into the humidity formula.

use super::RawSample;
use super::calibration::CalibrationConstants;

/// Lowest and highest heater plate temperatures accepted by the driver (°C).
pub const HEATER_TEMP_MIN_C: u16 = 200;
pub const HEATER_TEMP_MAX_C: u16 = 400;
/// Longest heater on-time the step-0 wait register can encode (ms).
pub const HEATER_DURATION_MAX_MS: u16 = 4032;

/// Floor division, matching the reference formulas for negative operands.
#[inline]
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Output of the temperature stage of one compensation cycle.
///
/// Only valid for the acquisition it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureStage {
    /// Fine temperature consumed by the pressure formula.
    pub t_fine: i64,
    /// Temperature in centi-degrees Celsius (2643 = 26.43 °C).
    pub centi_celsius: i32,
}

impl TemperatureStage {
    pub fn celsius(&self) -> f32 {
        self.centi_celsius as f32 / 100.0
    }

    /// Whole degrees, truncated toward zero. The humidity formula is fed
    /// this value rather than centi-degrees.
    pub fn whole_celsius(&self) -> i64 {
        (self.centi_celsius / 100) as i64
    }
}

/// Compensated values of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompensatedReading {
    /// Centi-degrees Celsius.
    pub temperature_centi: i32,
    pub pressure_pa: i32,
    /// Relative humidity in whole percent.
    pub humidity_percent: i32,
    pub gas_resistance_ohms: u32,
    pub heater_stable: bool,
    /// Monotonic tick of the acquisition this reading came from.
    pub timestamp_ms: u64,
}

impl CompensatedReading {
    pub fn temperature_celsius(&self) -> f32 {
        self.temperature_centi as f32 / 100.0
    }
}

pub fn compensate_temperature(temp_adc: u32, calib: &CalibrationConstants) -> TemperatureStage {
    let adc = temp_adc as i64;
    let var1 = (adc >> 3) - ((calib.par_t1 as i64) << 1);
    let var2 = (var1 * calib.par_t2 as i64) >> 11;
    let var3 = ((((var1 >> 1) * (var1 >> 1)) >> 12) * ((calib.par_t3 as i64) << 4)) >> 14;
    let t_fine = var2 + var3;

    TemperatureStage {
        t_fine,
        centi_celsius: (((t_fine * 5) + 128) >> 8) as i32,
    }
}

/// Splits the scaled pressure division so the wide path cannot overflow
/// before dividing: values at or above 2^30 divide first and then shift,
/// smaller values shift first for the extra bit of precision.
pub(crate) fn divide_scaled_pressure(scaled: i64, divisor: i64) -> i64 {
    if divisor == 0 {
        return 0;
    }
    if scaled >= (1 << 30) {
        floor_div(scaled, divisor) << 1
    } else {
        floor_div(scaled << 1, divisor)
    }
}

/// Pressure in Pascal. Returns 0 when the calibration yields a zero divisor
/// and saturates at the `i32` limits.
pub fn compensate_pressure(
    press_adc: u32,
    calib: &CalibrationConstants,
    stage: &TemperatureStage,
) -> i32 {
    let p1 = calib.par_p1 as i64;
    let p2 = calib.par_p2 as i64;
    let p3 = calib.par_p3 as i64;
    let p4 = calib.par_p4 as i64;
    let p5 = calib.par_p5 as i64;
    let p6 = calib.par_p6 as i64;
    let p7 = calib.par_p7 as i64;
    let p8 = calib.par_p8 as i64;
    let p9 = calib.par_p9 as i64;
    let p10 = calib.par_p10 as i64;

    let mut var1 = (stage.t_fine >> 1) - 64_000;
    let mut var2 = ((((var1 >> 2) * (var1 >> 2)) >> 11) * p6) >> 2;
    var2 += (var1 * p5) << 1;
    var2 = (var2 >> 2) + (p4 << 16);
    var1 = (((((var1 >> 2) * (var1 >> 2)) >> 13) * (p3 << 5)) >> 3) + ((p2 * var1) >> 1);
    var1 >>= 18;
    var1 = ((32_768 + var1) * p1) >> 15;

    if var1 == 0 {
        return 0;
    }

    let scaled = ((1_048_576 - press_adc as i64) - (var2 >> 12)) * 3125;
    // Degenerate calibrations push this far outside any physical pressure;
    // bounding it keeps the cubic term below inside i128.
    let pressure = divide_scaled_pressure(scaled, var1).clamp(i32::MIN as i64, i32::MAX as i64) as i128;

    let (p7, p8, p9, p10) = (p7 as i128, p8 as i128, p9 as i128, p10 as i128);
    let var1 = (p9 * (((pressure >> 3) * (pressure >> 3)) >> 13)) >> 12;
    let var2 = ((pressure >> 2) * p8) >> 13;
    let var3 = ((pressure >> 8) * (pressure >> 8) * (pressure >> 8) * p10) >> 17;
    let pressure = pressure + ((var1 + var2 + var3 + (p7 << 7)) >> 4);

    pressure.clamp(i32::MIN as i128, i32::MAX as i128) as i32
}

/// Relative humidity in whole percent.
///
/// Temperature enters as whole degrees truncated from the temperature stage.
/// The result is not clamped to 0..=100.
pub fn compensate_humidity(
    hum_adc: u32,
    calib: &CalibrationConstants,
    stage: &TemperatureStage,
) -> i32 {
    let t = stage.whole_celsius();
    let h1 = calib.par_h1 as i64;
    let h2 = calib.par_h2 as i64;
    let h3 = calib.par_h3 as i64;
    let h4 = calib.par_h4 as i64;
    let h5 = calib.par_h5 as i64;
    let h6 = calib.par_h6 as i64;
    let h7 = calib.par_h7 as i64;

    let var1 = hum_adc as i64 - (h1 << 4) - (floor_div(t * h3, 100) >> 1);
    let var2 = (h2
        * (floor_div(t * h4, 100)
            + floor_div((t * floor_div(t * h5, 100)) >> 6, 100)
            + (1 << 14)))
        >> 10;
    let var3 = var1 * var2;
    let var4 = ((h6 << 7) + floor_div(t * h7, 100)) >> 4;
    let var5 = ((var3 >> 14) * (var3 >> 14)) >> 10;
    let var6 = (var4 * var5) >> 1;

    let milli_percent = (((var3 + var6) >> 10) * 1000) >> 12;
    floor_div(milli_percent, 1000) as i32
}

/// Gas resistance in Ohm from the 10-bit code and its 4-bit range.
pub fn compensate_gas_resistance(gas_adc: u32, gas_range: u8) -> u32 {
    let var1 = 262_144i64 >> (gas_range & 0x0F);
    let var2 = 4096 + (gas_adc as i64 - 512) * 3;
    (floor_div(10_000 * var1, var2) * 100) as u32
}

/// Converts a plate target temperature into the `res_heat_0` register code.
///
/// `ambient_centi` is the ambient temperature in centi-degrees Celsius.
pub fn heater_resistance_code(
    ambient_centi: i32,
    target_c: u16,
    calib: &CalibrationConstants,
) -> u8 {
    let target = target_c.clamp(HEATER_TEMP_MIN_C, HEATER_TEMP_MAX_C) as i64;

    let var1 = floor_div(ambient_centi as i64 * calib.par_g3 as i64, 1000) << 8;
    let var2 = (calib.par_g1 as i64 + 784)
        * floor_div(
            floor_div((calib.par_g2 as i64 + 154_009) * target * 5, 100) + 3_276_800,
            10,
        );
    let var3 = var1 + (var2 >> 1);
    let var4 = floor_div(var3, calib.res_heat_range as i64 + 4);
    let var5 = 131 * calib.res_heat_val as i64 + 65_536;
    let res_heat_x100 = (floor_div(var4, var5) - 250) * 34;

    floor_div(res_heat_x100 + 50, 100).clamp(0, u8::MAX as i64) as u8
}

/// Encodes a heater on-time into the `gas_wait_0` register: `<5:0>` value,
/// `<7:6>` multiplier of 1, 4, 16 or 64.
pub fn heater_duration_code(duration_ms: u16) -> u8 {
    if duration_ms >= HEATER_DURATION_MAX_MS {
        return 0xFF;
    }
    let mut value = duration_ms;
    let mut factor = 0u8;
    while value > 63 {
        value /= 4;
        factor += 1;
    }
    value as u8 + factor * 64
}

/// Runs one full compensation cycle over a raw sample.
pub fn compensate(sample: &RawSample, calib: &CalibrationConstants) -> CompensatedReading {
    let codes = &sample.codes;
    let stage = compensate_temperature(codes.temperature, calib);

    CompensatedReading {
        temperature_centi: stage.centi_celsius,
        pressure_pa: compensate_pressure(codes.pressure, calib, &stage),
        humidity_percent: compensate_humidity(codes.humidity, calib, &stage),
        gas_resistance_ohms: compensate_gas_resistance(codes.gas, codes.gas_range),
        heater_stable: codes.heater_stable,
        timestamp_ms: sample.timestamp_ms,
    }
}
