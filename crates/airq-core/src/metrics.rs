//! Air-quality rating
//!
//! Maps an IAQ score onto the bands of the BME688 datasheet, with a label for
//! the display and a colour for the status LED.

use crate::outputs::zip_leds::Colour;

/// Air-quality band for an IAQ score (0 best, 500 worst).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirQualityRating {
    /// 0-50
    Excellent,
    /// 51-100
    Good,
    /// 101-150
    LightlyPolluted,
    /// 151-200
    ModeratelyPolluted,
    /// 201-250
    HeavilyPolluted,
    /// 251-350
    SeverelyPolluted,
    /// Above 350
    ExtremelyPolluted,
}

impl AirQualityRating {
    pub const fn from_score(score: u16) -> Self {
        match score {
            0..=50 => Self::Excellent,
            51..=100 => Self::Good,
            101..=150 => Self::LightlyPolluted,
            151..=200 => Self::ModeratelyPolluted,
            201..=250 => Self::HeavilyPolluted,
            251..=350 => Self::SeverelyPolluted,
            _ => Self::ExtremelyPolluted,
        }
    }

    /// Get the display label for this rating
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::LightlyPolluted => "Lightly Polluted",
            Self::ModeratelyPolluted => "Moderately Polluted",
            Self::HeavilyPolluted => "Heavily Polluted",
            Self::SeverelyPolluted => "Severely Polluted",
            Self::ExtremelyPolluted => "Extremely Polluted",
        }
    }

    /// Get the status LED colour for this rating
    pub const fn colour(self) -> Colour {
        match self {
            Self::Excellent => Colour::GREEN,
            Self::Good => Colour::CYAN,
            Self::LightlyPolluted => Colour::YELLOW,
            Self::ModeratelyPolluted => Colour::ORANGE,
            Self::HeavilyPolluted => Colour::RED,
            Self::SeverelyPolluted => Colour::PURPLE,
            Self::ExtremelyPolluted => Colour::WHITE,
        }
    }
}
