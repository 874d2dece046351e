//! Board configuration
//!
//! Defaults carry the board's factory settings. A configuration can be saved
//! to the storage collaborator as a compact postcard blob and read back on
//! the next boot.

use alloc::vec::Vec;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::sensors::bme688::registers::DEFAULT_ADDRESS;
use crate::storage::data_logger::Separator;
use crate::storage::{CONFIG_FILE, FileStorage, StorageError};

/// Largest encoded configuration accepted by [`BoardConfig::load`].
const MAX_CONFIG_SIZE: usize = 128;

/// Oversampling setting for one measurement channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oversampling {
    Skipped,
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    /// Register field value (`osrs_*`).
    pub const fn bits(self) -> u8 {
        match self {
            Self::Skipped => 0b000,
            Self::X1 => 0b001,
            Self::X2 => 0b010,
            Self::X4 => 0b011,
            Self::X8 => 0b100,
            Self::X16 => 0b101,
        }
    }
}

/// IIR filter coefficient applied to temperature and pressure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IirFilter {
    Off,
    C1,
    C3,
    C7,
    C15,
    C31,
    C63,
    C127,
}

impl IirFilter {
    /// Register field value (`filter`).
    pub const fn bits(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::C1 => 1,
            Self::C3 => 2,
            Self::C7 => 3,
            Self::C15 => 4,
            Self::C31 => 5,
            Self::C63 => 6,
            Self::C127 => 7,
        }
    }
}

/// Heater plate temperature and on-time for heater step 0.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaterProfile {
    pub target_temp_c: u16,
    pub duration_ms: u16,
}

impl Default for HeaterProfile {
    fn default() -> Self {
        Self {
            target_temp_c: 300,
            duration_ms: 180,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnInConfig {
    pub samples: u16,
    pub interval_ms: u32,
}

impl Default for BurnInConfig {
    fn default() -> Self {
        Self {
            samples: 60,
            interval_ms: 5000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bme688Config {
    pub address: u8,
    pub temperature_oversampling: Oversampling,
    pub pressure_oversampling: Oversampling,
    pub humidity_oversampling: Oversampling,
    pub filter: IirFilter,
    pub heater: HeaterProfile,
    pub burn_in: BurnInConfig,

    /// Chip-ID reads before giving up on the device.
    pub chip_id_attempts: u8,
    pub chip_id_retry_ms: u32,
    /// Wait after the soft reset before talking to the device again.
    pub reset_settle_ms: u32,
    pub status_poll_interval_ms: u32,
    /// How long one forced measurement may take before it is retried.
    pub acquisition_timeout_ms: u32,
    pub acquisition_retries: u8,
}

impl Default for Bme688Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            temperature_oversampling: Oversampling::X2,
            pressure_oversampling: Oversampling::X16,
            humidity_oversampling: Oversampling::X2,
            filter: IirFilter::C3,
            heater: HeaterProfile::default(),
            burn_in: BurnInConfig::default(),
            chip_id_attempts: 10,
            chip_id_retry_ms: 100,
            reset_settle_ms: 10,
            status_poll_interval_ms: 10,
            acquisition_timeout_ms: 5000,
            acquisition_retries: 3,
        }
    }
}

impl Bme688Config {
    /// Status polls allowed per measurement attempt.
    pub fn status_polls(&self) -> u32 {
        (self.acquisition_timeout_ms / self.status_poll_interval_ms.max(1)).max(1)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    pub sensor: Bme688Config,
    pub log_separator: Separator,
    /// ZIP LED brightness in percent.
    pub led_brightness: u8,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            sensor: Bme688Config::default(),
            log_separator: Separator::Semicolon,
            led_brightness: 50,
        }
    }
}

impl BoardConfig {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        postcard::to_allocvec(self).map_err(|e| {
            error!("Failed to encode configuration: {:?}", e);
            StorageError::Encoding {
                details: "postcard serialization failed",
            }
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        postcard::from_bytes(bytes).map_err(|e| {
            error!("Failed to decode configuration: {:?}", e);
            StorageError::Parse {
                file: CONFIG_FILE,
                details: "invalid configuration blob",
            }
        })
    }

    pub fn save<S: FileStorage>(&self, storage: &mut S) -> Result<(), StorageError> {
        let bytes = self.to_bytes()?;
        storage.write(CONFIG_FILE, &bytes)?;
        info!("Configuration saved ({} bytes)", bytes.len());
        Ok(())
    }

    pub fn load<S: FileStorage>(storage: &mut S) -> Result<Self, StorageError> {
        let mut buffer = [0u8; MAX_CONFIG_SIZE];
        let len = storage.read(CONFIG_FILE, &mut buffer)?;
        Self::from_bytes(&buffer[..len])
    }

    /// Saved configuration if there is a readable one, defaults otherwise.
    pub fn load_or_default<S: FileStorage>(storage: &mut S) -> Self {
        match Self::load(storage) {
            Ok(config) => config,
            Err(StorageError::NotFound { .. }) => Self::default(),
            Err(e) => {
                error!("Ignoring saved configuration: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_factory_defaults() {
        let config = Bme688Config::default();
        assert_eq!(config.address, 0x77);
        assert_eq!(config.temperature_oversampling.bits(), 0x02);
        assert_eq!(config.pressure_oversampling.bits(), 0x05);
        assert_eq!(config.humidity_oversampling.bits(), 0x02);
        assert_eq!(config.filter.bits(), 0x02);
        assert_eq!(config.heater.target_temp_c, 300);
        assert_eq!(config.heater.duration_ms, 180);
        assert_eq!(config.burn_in.samples, 60);
        assert_eq!(config.burn_in.interval_ms, 5000);
        assert_eq!(config.status_polls(), 500);
    }

    #[test]
    fn test_status_polls_never_zero() {
        let config = Bme688Config {
            status_poll_interval_ms: 0,
            acquisition_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.status_polls(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let mut storage = MemoryStorage::new();
        let mut config = BoardConfig::default();
        config.sensor.heater.target_temp_c = 320;
        config.sensor.burn_in.samples = 10;
        config.log_separator = Separator::Tab;
        config.led_brightness = 20;

        config.save(&mut storage).unwrap();
        assert_eq!(BoardConfig::load(&mut storage).unwrap(), config);
    }

    #[test]
    fn test_load_or_default_on_missing_or_corrupt() {
        let mut storage = MemoryStorage::new();
        assert_eq!(BoardConfig::load_or_default(&mut storage), BoardConfig::default());

        storage.write(CONFIG_FILE, &[0xFF; 3]).unwrap();
        assert!(BoardConfig::load(&mut storage).is_err());
        assert_eq!(BoardConfig::load_or_default(&mut storage), BoardConfig::default());
    }
}
