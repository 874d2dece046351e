//! In-memory file storage for hosts and tests

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::{FileStorage, StorageError};

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    files: BTreeMap<&'static str, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole contents of `file`, if it exists.
    pub fn contents(&self, file: &str) -> Option<&[u8]> {
        self.files.get(file).map(Vec::as_slice)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl FileStorage for MemoryStorage {
    fn read(&mut self, file: &'static str, buffer: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.files.get(file).ok_or(StorageError::NotFound { file })?;
        let len = data.len().min(buffer.len());
        buffer[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.files.insert(file, data.to_vec());
        Ok(())
    }

    fn append(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.files.entry(file).or_default().extend_from_slice(data);
        Ok(())
    }

    fn size(&mut self, file: &'static str) -> Result<u32, StorageError> {
        self.files
            .get(file)
            .map(|data| data.len() as u32)
            .ok_or(StorageError::NotFound { file })
    }

    fn remove(&mut self, file: &'static str) -> Result<(), StorageError> {
        self.files
            .remove(file)
            .map(|_| ())
            .ok_or(StorageError::NotFound { file })
    }
}
