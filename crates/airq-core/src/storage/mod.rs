//! Storage collaborator
//!
//! The core never talks to a filesystem directly. Baselines, configuration
//! and the data log go through [`FileStorage`], which the board implements
//! on the SD card and hosts implement in memory or on their own disk.
//!
//! File names follow 8.3 conventions so the same names work on FAT volumes.

pub mod data_logger;
pub mod memory;
pub mod sd_card;

pub use data_logger::{DataLogger, Separator};
pub use memory::MemoryStorage;
pub use sd_card::SdCardStorage;

use thiserror_no_std::Error;

/// Persisted gas baseline and ambient temperature.
pub const BASELINE_FILE: &str = "BASELINE.TXT";
/// Default data log.
pub const DATALOG_FILE: &str = "DATALOG.TXT";
/// Persisted [`crate::config::BoardConfig`].
pub const CONFIG_FILE: &str = "CONFIG.BIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("File {file} not found")]
    NotFound { file: &'static str },

    #[error("Failed to parse {file}: {details}")]
    Parse {
        file: &'static str,
        details: &'static str,
    },

    #[error("Failed to {operation} {file}")]
    Io {
        file: &'static str,
        operation: &'static str,
    },

    #[error("File {file} would exceed {limit} bytes")]
    Full { file: &'static str, limit: u32 },

    #[error("Encoding failed: {details}")]
    Encoding { details: &'static str },
}

/// Named-file storage.
///
/// All operations are whole-file or append-only, which is all the board
/// needs and maps directly onto a FAT root directory.
pub trait FileStorage {
    /// Reads from the start of `file` into `buffer`, returning the number
    /// of bytes read. A file longer than `buffer` is cut short.
    fn read(&mut self, file: &'static str, buffer: &mut [u8]) -> Result<usize, StorageError>;

    /// Replaces the contents of `file`, creating it if needed.
    fn write(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError>;

    /// Appends to `file`, creating it if needed.
    fn append(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError>;

    /// Size of `file` in bytes.
    fn size(&mut self, file: &'static str) -> Result<u32, StorageError>;

    fn remove(&mut self, file: &'static str) -> Result<(), StorageError>;

    fn exists(&mut self, file: &'static str) -> bool {
        self.size(file).is_ok()
    }
}

impl<S: FileStorage + ?Sized> FileStorage for &mut S {
    fn read(&mut self, file: &'static str, buffer: &mut [u8]) -> Result<usize, StorageError> {
        (**self).read(file, buffer)
    }

    fn write(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(file, data)
    }

    fn append(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        (**self).append(file, data)
    }

    fn size(&mut self, file: &'static str) -> Result<u32, StorageError> {
        (**self).size(file)
    }

    fn remove(&mut self, file: &'static str) -> Result<(), StorageError> {
        (**self).remove(file)
    }
}
