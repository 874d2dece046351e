//! File storage in a host directory, standing in for the SD card.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use airq_core::storage::{FileStorage, StorageError};
use log::error;

pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }
}

fn map_error(file: &'static str, operation: &'static str) -> impl FnOnce(io::Error) -> StorageError {
    move |e| {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound { file }
        } else {
            error!("Failed to {} {}: {}", operation, file, e);
            StorageError::Io { file, operation }
        }
    }
}

impl FileStorage for DirStorage {
    fn read(&mut self, file: &'static str, buffer: &mut [u8]) -> Result<usize, StorageError> {
        let mut handle = fs::File::open(self.path(file)).map_err(map_error(file, "open"))?;
        let mut total = 0;
        while total < buffer.len() {
            let n = handle
                .read(&mut buffer[total..])
                .map_err(map_error(file, "read"))?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn write(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        fs::write(self.path(file), data).map_err(map_error(file, "write"))
    }

    fn append(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(file))
            .and_then(|mut handle| handle.write_all(data))
            .map_err(map_error(file, "append to"))
    }

    fn size(&mut self, file: &'static str) -> Result<u32, StorageError> {
        let metadata = fs::metadata(self.path(file)).map_err(map_error(file, "stat"))?;
        Ok(metadata.len().min(u32::MAX as u64) as u32)
    }

    fn remove(&mut self, file: &'static str) -> Result<(), StorageError> {
        fs::remove_file(self.path(file)).map_err(map_error(file, "remove"))
    }
}
