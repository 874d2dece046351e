//! Air-quality model
//!
//! Derives an air-quality percentage, an IAQ score and an estimated CO2
//! concentration from compensated humidity and gas resistance, relative to
//! the learned [`Baseline`].
//!
//! Humidity is scored against a fixed 40 % reference (the middle of the
//! 30-50 % comfort band), not against anything learned during burn-in; only
//! the gas side uses the learned baseline.

use super::PreviousSample;
use super::baseline::Baseline;
use super::compensation::CompensatedReading;
use crate::metrics::AirQualityRating;

pub const HUMIDITY_REFERENCE_PERCENT: f32 = 40.0;
/// Humidity contributes a quarter of the percentage, gas the rest.
pub const HUMIDITY_WEIGHT: f32 = 0.25;
/// A humidity jump this large between readings this close together is taken
/// to be someone breathing on the sensor.
pub const BREATH_WINDOW_MS: u64 = 5000;
pub const BREATH_HUMIDITY_RISE_PERCENT: i32 = 3;
pub const BREATH_CO2_PPM: f32 = 1500.0;

const ECO2_FLOOR_PPM: f32 = 250.0;
const ECO2_GROWTH: f32 = 0.012;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirQualityResult {
    /// 0 (bad) to 100 (excellent).
    pub iaq_percent: u8,
    /// 0 (excellent) to 500 (bad), `(100 - iaq_percent) * 5`.
    pub iaq_score: u16,
    /// Estimated CO2 in ppm.
    pub eco2_ppm: u32,
}

impl AirQualityResult {
    pub fn rating(&self) -> AirQualityRating {
        AirQualityRating::from_score(self.iaq_score)
    }
}

fn humidity_score(humidity: f32) -> f32 {
    let ratio = if humidity - HUMIDITY_REFERENCE_PERCENT > 0.0 {
        (100.0 - humidity) / (100.0 - HUMIDITY_REFERENCE_PERCENT)
    } else {
        humidity / HUMIDITY_REFERENCE_PERCENT
    };
    ratio * HUMIDITY_WEIGHT * 100.0
}

fn gas_score(gas_resistance: f32, gas_baseline: f32) -> f32 {
    let gas_ratio = gas_resistance / gas_baseline;
    if gas_baseline - gas_resistance > 0.0 {
        gas_ratio * (100.0 * (1.0 - HUMIDITY_WEIGHT))
    } else {
        // Air at the baseline scores 70 so that with ideal humidity the total
        // is 95 %, leaving headroom for air cleaner than the reference.
        libm::floorf(70.0 + 5.0 * (gas_ratio - 1.0)).min(75.0)
    }
}

/// Humidity score plus gas score before truncation and clamping.
///
/// For humidity within 0..=100 this stays within 0..=100: the humidity term
/// peaks at 25 at the 40 % reference and the gas term is capped at 75, so
/// ideal humidity with very clean air lands exactly on 100. Humidity outside
/// that range drives the humidity term negative.
pub fn combined_percent(humidity_percent: i32, gas_resistance: u32, gas_baseline: f32) -> f32 {
    humidity_score(humidity_percent as f32) + gas_score(gas_resistance as f32, gas_baseline)
}

/// Scores one reading against the baseline.
///
/// `previous` is the humidity and tick of the acquisition before `reading`,
/// used for breath detection; `None` on the first acquisition.
pub fn score(
    reading: &CompensatedReading,
    baseline: &Baseline,
    previous: Option<PreviousSample>,
) -> AirQualityResult {
    let humidity = reading.humidity_percent as f32;
    let humidity_offset = humidity - HUMIDITY_REFERENCE_PERCENT;
    let humidity_ratio = humidity_offset / HUMIDITY_REFERENCE_PERCENT + 1.0;

    let ambient = baseline.ambient_celsius();
    let temperature_offset = reading.temperature_celsius() - ambient;
    let temperature_ratio = if ambient != 0.0 {
        temperature_offset / ambient
    } else {
        0.0
    };

    let combined = combined_percent(
        reading.humidity_percent,
        reading.gas_resistance_ohms,
        baseline.gas_resistance,
    );
    let iaq_percent = libm::truncf(combined).clamp(0.0, 100.0) as u8;
    let iaq_score = (100 - iaq_percent as u16) * 5;

    let mut eco2 = ECO2_FLOOR_PPM * libm::expf(ECO2_GROWTH * iaq_score as f32);

    if humidity_offset > 0.0 {
        if temperature_offset > 0.0 {
            eco2 *= humidity_ratio + temperature_ratio;
        } else {
            eco2 *= humidity_ratio;
        }
    } else if temperature_offset > 0.0 {
        eco2 *= temperature_ratio + 1.0;
    }

    if let Some(previous) = previous {
        let gap = reading.timestamp_ms.saturating_sub(previous.timestamp_ms);
        let rise = reading.humidity_percent - previous.humidity_percent;
        if gap <= BREATH_WINDOW_MS && rise >= BREATH_HUMIDITY_RISE_PERCENT {
            eco2 += BREATH_CO2_PPM;
        }
    }

    AirQualityResult {
        iaq_percent,
        iaq_score,
        eco2_ppm: libm::truncf(eco2).max(0.0) as u32,
    }
}
