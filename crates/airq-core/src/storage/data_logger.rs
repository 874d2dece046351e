//! Append-only delimited data log
//!
//! A log file is laid out as up to three free-text project lines, one row of
//! column headings and then one row per entry. Every field is followed by
//! the separator and every line ends with `\r\n`, so the file opens directly
//! in a spreadsheet.

use alloc::string::String;
use core::fmt::Write;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{DATALOG_FILE, FileStorage, StorageError};
use crate::sensors::SensorReadings;

/// Roughly 10 000 full-width entries.
pub const MAX_LOG_SIZE: u32 = 500_000;
pub const MAX_FIELDS: usize = 10;
pub const MAX_PROJECT_LINES: usize = 3;

const LINE_END: &str = "\r\n";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    Comma,
    #[default]
    Semicolon,
    Tab,
}

impl Separator {
    pub const fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Semicolon => ';',
            Self::Tab => '\t',
        }
    }
}

pub struct DataLogger<S: FileStorage> {
    storage: S,
    file: &'static str,
    separator: Separator,
    max_size: u32,
}

impl<S: FileStorage> DataLogger<S> {
    /// Logger writing to `file`. The file is created empty if it does not
    /// exist yet; an existing log is kept and appended to.
    pub fn new(
        mut storage: S,
        file: &'static str,
        separator: Separator,
    ) -> Result<Self, StorageError> {
        if !storage.exists(file) {
            storage.write(file, &[])?;
        } else {
            debug!("Appending to existing log {}", file);
        }
        Ok(Self {
            storage,
            file,
            separator,
            max_size: MAX_LOG_SIZE,
        })
    }

    /// Logger on [`DATALOG_FILE`].
    pub fn with_default_file(storage: S, separator: Separator) -> Result<Self, StorageError> {
        Self::new(storage, DATALOG_FILE, separator)
    }

    /// Lowers the size limit, mainly for small volumes.
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size.min(MAX_LOG_SIZE);
        self
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn separator(&self) -> Separator {
        self.separator
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Writes up to three free-text lines. Empty lines are skipped.
    pub fn write_project_info(&mut self, lines: &[&str]) -> Result<(), StorageError> {
        if lines.len() > MAX_PROJECT_LINES {
            return Err(StorageError::Encoding {
                details: "at most three project information lines",
            });
        }
        let mut text = String::new();
        for line in lines.iter().filter(|line| !line.is_empty()) {
            text.push_str(line);
            text.push_str(LINE_END);
        }
        self.append_checked(&text)
    }

    /// Writes the column heading row.
    pub fn write_headings(&mut self, headings: &[&str]) -> Result<(), StorageError> {
        let row = self.format_row(headings)?;
        self.append_checked(&row)
    }

    /// Appends one data row of up to ten fields. Empty fields are skipped.
    pub fn log(&mut self, fields: &[&str]) -> Result<(), StorageError> {
        let row = self.format_row(fields)?;
        self.append_checked(&row)
    }

    /// Appends one row holding every value of `readings`.
    pub fn log_readings<R, const COUNT: usize>(&mut self, readings: R) -> Result<(), StorageError>
    where
        R: SensorReadings<COUNT>,
    {
        if COUNT > MAX_FIELDS {
            return Err(StorageError::Encoding {
                details: "more than ten fields in one row",
            });
        }
        let separator = self.separator.as_char();
        let mut row = String::new();
        for value in readings.to_array() {
            write!(row, "{}{}", value, separator).map_err(|_| StorageError::Encoding {
                details: "failed to format reading",
            })?;
        }
        row.push_str(LINE_END);
        self.append_checked(&row)
    }

    /// Empties the log, keeping the file.
    pub fn erase_all(&mut self) -> Result<(), StorageError> {
        self.storage.write(self.file, &[])
    }

    /// Removes the log file. The logger can keep appending, which creates it
    /// again.
    pub fn delete(&mut self) -> Result<(), StorageError> {
        self.storage.remove(self.file)
    }

    pub fn size(&mut self) -> Result<u32, StorageError> {
        match self.storage.size(self.file) {
            Err(StorageError::NotFound { .. }) => Ok(0),
            other => other,
        }
    }

    fn format_row(&self, fields: &[&str]) -> Result<String, StorageError> {
        if fields.len() > MAX_FIELDS {
            return Err(StorageError::Encoding {
                details: "more than ten fields in one row",
            });
        }
        let separator = self.separator.as_char();
        let mut row = String::new();
        for field in fields.iter().filter(|field| !field.is_empty()) {
            row.push_str(field);
            row.push(separator);
        }
        row.push_str(LINE_END);
        Ok(row)
    }

    fn append_checked(&mut self, text: &str) -> Result<(), StorageError> {
        let current = self.size()?;
        let added = text.len() as u32;
        if current.saturating_add(added) > self.max_size {
            warn!(
                "{} is full ({} + {} bytes > {}), entry dropped",
                self.file, current, added, self.max_size
            );
            return Err(StorageError::Full {
                file: self.file,
                limit: self.max_size,
            });
        }
        self.storage.append(self.file, text.as_bytes())
    }
}
