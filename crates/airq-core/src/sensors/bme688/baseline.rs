//! Gas baseline and burn-in
//!
//! The air-quality model scores every reading relative to a baseline gas
//! resistance and ambient temperature learned in clean air. The baseline is
//! learned once by a burn-in (60 acquisitions, 5 s apart, by default),
//! persisted through the storage collaborator and reloaded on later boots.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

use heapless::String;
use log::{debug, warn};

use super::compensation::CompensatedReading;
use crate::storage::{BASELINE_FILE, FileStorage, StorageError};

/// Learned reference point for air-quality scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    /// Mean gas resistance during burn-in, in ohms.
    pub gas_resistance: f32,
    /// Mean temperature during burn-in, kept in centi-degrees Celsius like
    /// the compensated readings it was averaged from. Divide by 100 for °C.
    pub ambient_temperature: f32,
}

impl Baseline {
    pub fn ambient_celsius(&self) -> f32 {
        self.ambient_temperature / 100.0
    }

    /// A baseline with zero or non-finite gas resistance cannot be scored
    /// against.
    pub fn is_usable(&self) -> bool {
        self.gas_resistance.is_finite()
            && self.gas_resistance > 0.0
            && self.ambient_temperature.is_finite()
    }

    /// Renders the persisted form: gas baseline then ambient temperature,
    /// each on its own `\r\n`-terminated line.
    pub fn to_text(&self) -> Result<String<64>, StorageError> {
        let mut text = String::new();
        write!(
            text,
            "{}\r\n{}\r\n",
            self.gas_resistance, self.ambient_temperature
        )
        .map_err(|_| StorageError::Encoding {
            details: "baseline does not fit the text buffer",
        })?;
        Ok(text)
    }

    /// Parses the persisted form. Whitespace around each value is ignored.
    pub fn parse(text: &str) -> Result<Self, StorageError> {
        let mut values = text
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|line| !line.is_empty());

        let mut next = |details: &'static str| -> Result<f32, StorageError> {
            values
                .next()
                .and_then(|value| value.parse::<f32>().ok())
                .ok_or(StorageError::Parse {
                    file: BASELINE_FILE,
                    details,
                })
        };

        let gas_resistance = next("missing or malformed gas baseline")?;
        let ambient_temperature = next("missing or malformed ambient temperature")?;

        let baseline = Self {
            gas_resistance,
            ambient_temperature,
        };
        if !baseline.is_usable() {
            return Err(StorageError::Parse {
                file: BASELINE_FILE,
                details: "gas baseline must be a positive number",
            });
        }
        Ok(baseline)
    }

    /// Reads the baseline persisted under [`BASELINE_FILE`].
    pub fn load<S: FileStorage>(storage: &mut S) -> Result<Self, StorageError> {
        let mut buffer = [0u8; 64];
        let len = storage.read(BASELINE_FILE, &mut buffer)?;
        let text = core::str::from_utf8(&buffer[..len]).map_err(|_| StorageError::Parse {
            file: BASELINE_FILE,
            details: "not valid UTF-8",
        })?;
        Self::parse(text)
    }

    /// Replaces the persisted baseline.
    pub fn persist<S: FileStorage>(&self, storage: &mut S) -> Result<(), StorageError> {
        let text = self.to_text()?;
        storage.write(BASELINE_FILE, text.as_bytes())
    }
}

/// Where the burn-in procedure currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BurnInState {
    #[default]
    NotStarted,
    Sampling(BurnInProgress),
    Complete,
}

impl BurnInState {
    pub fn percent(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Sampling(progress) => progress.percent(),
            Self::Complete => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnInProgress {
    pub completed: u16,
    pub total: u16,
}

impl BurnInProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) as u32 * 100) / self.total as u32) as u8
    }
}

/// Running sums of a burn-in in progress.
///
/// Sums are integer so the mean of `n` identical samples is exactly that
/// sample.
#[derive(Debug, Clone)]
pub struct BurnIn {
    total: u16,
    completed: u16,
    gas_sum: u64,
    ambient_sum: i64,
}

impl BurnIn {
    pub fn new(total: u16) -> Self {
        Self {
            total: total.max(1),
            completed: 0,
            gas_sum: 0,
            ambient_sum: 0,
        }
    }

    pub fn progress(&self) -> BurnInProgress {
        BurnInProgress {
            completed: self.completed,
            total: self.total,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Accumulates one compensated reading. Returns the learned baseline once
    /// the last sample has been taken.
    pub fn push(&mut self, reading: &CompensatedReading) -> Option<Baseline> {
        if self.is_complete() {
            warn!("Burn-in already complete, ignoring extra sample");
            return self.baseline();
        }

        self.gas_sum += reading.gas_resistance_ohms as u64;
        self.ambient_sum += reading.temperature_centi as i64;
        self.completed += 1;
        debug!(
            "Burn-in sample {}/{}: {} ohm, {} centi-C",
            self.completed, self.total, reading.gas_resistance_ohms, reading.temperature_centi
        );

        self.baseline()
    }

    fn baseline(&self) -> Option<Baseline> {
        if !self.is_complete() {
            return None;
        }
        let samples = self.completed as f64;
        Some(Baseline {
            gas_resistance: (self.gas_sum as f64 / samples) as f32,
            ambient_temperature: (self.ambient_sum as f64 / samples) as f32,
        })
    }
}

/// Shared flag that asks a running burn-in to stop after the current sample.
///
/// Only loads and stores are used, so this works on cores without atomic
/// read-modify-write instructions.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}
