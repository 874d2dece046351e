pub mod bme688;

pub use bme688::{Bme688, Bme688Readings};

use embedded_hal::i2c::ErrorKind;
use thiserror_no_std::Error;

/// Errors that can occur when talking to a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("{sensor}: bus error during {operation}: {kind:?}")]
    DeviceCommunication {
        sensor: &'static str,
        operation: &'static str,
        kind: ErrorKind,
    },

    #[error("{sensor}: unexpected chip id {found:#04x} (expected {expected:#04x})")]
    ChipIdMismatch {
        sensor: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("{sensor}: {operation} timed out after {attempts} attempts")]
    AcquisitionTimeout {
        sensor: &'static str,
        operation: &'static str,
        attempts: u32,
    },

    #[error("{sensor}: gas sensor has not been set up")]
    GasSensorNotConfigured { sensor: &'static str },

    #[error("{sensor}: no gas baseline has been loaded or learned")]
    BaselineUnavailable { sensor: &'static str },

    #[error("{sensor}: burn-in cancelled after {completed} samples")]
    BurnInCancelled { sensor: &'static str, completed: u16 },
}

impl SensorError {
    /// Fatal errors mean the device is unreachable or is not the expected
    /// part. They are surfaced immediately and never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceCommunication { .. } | Self::ChipIdMismatch { .. }
        )
    }
}

/// Trait for sensor reading data structures.
/// Provides compile-time guarantees about the number of values and their conversion to arrays.
pub trait SensorReadings<const COUNT: usize> {
    /// Convert the readings into a fixed-size array.
    fn to_array(self) -> [i32; COUNT];
}

/// Trait for sensors that produce typed readings.
pub trait Sensor<const COUNT: usize> {
    /// The type of readings this sensor produces.
    type Readings: SensorReadings<COUNT>;

    /// Acquire a fresh measurement and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}
