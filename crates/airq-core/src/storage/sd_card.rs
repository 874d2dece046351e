//! SD card storage
//!
//! Card errors fold into [`StorageError`]: a missing file stays distinct
//! from I/O failures so callers can fall back to defaults.

use embedded_sdmmc::{BlockDevice, Mode, TimeSource, VolumeIdx, VolumeManager};
use log::error;

use super::{FileStorage, StorageError};

/// [`FileStorage`] on the root directory of the first FAT volume of an SD
/// card (or any other block device).
///
/// Operations are blocking. Each call opens and closes the volume so that a
/// card pulled between calls is noticed on the next access instead of
/// leaving stale handles behind.
pub struct SdCardStorage<B, T>
where
    B: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<B, T, 4, 4, 1>,
}

impl<B, T> SdCardStorage<B, T>
where
    B: BlockDevice,
    T: TimeSource,
{
    pub fn new(block_device: B, time_source: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(block_device, time_source),
        }
    }

    fn open_file<R>(
        &self,
        file: &'static str,
        mode: Mode,
        operation: &'static str,
        action: impl FnOnce(&embedded_sdmmc::File<'_, B, T, 4, 4, 1>) -> Result<R, embedded_sdmmc::Error<B::Error>>,
    ) -> Result<R, StorageError> {
        let map = map_error::<B::Error>(file, operation);

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0)).map_err(&map)?;
        let root_dir = volume0.open_root_dir().map_err(&map)?;
        let handle = root_dir.open_file_in_dir(file, mode).map_err(&map)?;

        let result = action(&handle).map_err(&map)?;

        handle.close().map_err(&map)?;
        root_dir.close().map_err(&map)?;
        volume0.close().map_err(&map)?;

        Ok(result)
    }
}

fn map_error<E: core::fmt::Debug>(
    file: &'static str,
    operation: &'static str,
) -> impl Fn(embedded_sdmmc::Error<E>) -> StorageError {
    move |e| match e {
        embedded_sdmmc::Error::NotFound => StorageError::NotFound { file },
        e => {
            error!("SD card {} on {} failed: {:?}", operation, file, e);
            StorageError::Io { file, operation }
        }
    }
}

impl<B, T> FileStorage for SdCardStorage<B, T>
where
    B: BlockDevice,
    T: TimeSource,
{
    fn read(&mut self, file: &'static str, buffer: &mut [u8]) -> Result<usize, StorageError> {
        self.open_file(file, Mode::ReadOnly, "read", |handle| {
            let mut total = 0;
            while total < buffer.len() {
                let read = handle.read(&mut buffer[total..])?;
                if read == 0 {
                    break; // EOF
                }
                total += read;
            }
            Ok(total)
        })
    }

    fn write(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.open_file(file, Mode::ReadWriteCreateOrTruncate, "write", |handle| {
            handle.write(data)
        })
    }

    fn append(&mut self, file: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.open_file(file, Mode::ReadWriteCreateOrAppend, "append to", |handle| {
            handle.write(data)
        })
    }

    fn size(&mut self, file: &'static str) -> Result<u32, StorageError> {
        self.open_file(file, Mode::ReadOnly, "stat", |handle| Ok(handle.length()))
    }

    fn remove(&mut self, file: &'static str) -> Result<(), StorageError> {
        let map = map_error::<B::Error>(file, "remove");

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0)).map_err(&map)?;
        let root_dir = volume0.open_root_dir().map_err(&map)?;
        root_dir.delete_file_in_dir(file).map_err(&map)?;
        root_dir.close().map_err(&map)?;
        volume0.close().map_err(&map)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embedded_sdmmc::{Block, BlockCount, BlockIdx, Error, Timestamp};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct CardFault;

    /// A card that reads back as zeroes, so it carries no partition table.
    struct BlankCard;

    impl BlockDevice for BlankCard {
        type Error = CardFault;

        fn read(&self, blocks: &mut [Block], _start_block_idx: BlockIdx) -> Result<(), Self::Error> {
            for block in blocks.iter_mut() {
                block.contents.fill(0);
            }
            Ok(())
        }

        fn write(&self, _blocks: &[Block], _start_block_idx: BlockIdx) -> Result<(), Self::Error> {
            Err(CardFault)
        }

        fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
            Ok(BlockCount(64))
        }
    }

    struct FixedTime;

    impl TimeSource for FixedTime {
        fn get_timestamp(&self) -> Timestamp {
            Timestamp {
                year_since_1970: 56,
                zero_indexed_month: 9,
                zero_indexed_day: 15,
                hours: 12,
                minutes: 0,
                seconds: 0,
            }
        }
    }

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let map = map_error::<CardFault>("A.TXT", "read");
        assert_eq!(map(Error::NotFound), StorageError::NotFound { file: "A.TXT" });
    }

    #[test]
    fn test_card_faults_map_to_io() {
        let map = map_error::<CardFault>("LOG.TXT", "append to");
        assert_eq!(
            map(Error::DeviceError(CardFault)),
            StorageError::Io {
                file: "LOG.TXT",
                operation: "append to"
            }
        );
        assert_eq!(
            map(Error::FormatError("Invalid MBR signature")),
            StorageError::Io {
                file: "LOG.TXT",
                operation: "append to"
            }
        );
    }

    #[test]
    fn test_unformatted_card_reports_io() {
        let mut storage = SdCardStorage::new(BlankCard, FixedTime);
        let mut buffer = [0u8; 16];
        assert_eq!(
            storage.read("CONFIG.BIN", &mut buffer),
            Err(StorageError::Io {
                file: "CONFIG.BIN",
                operation: "read"
            })
        );
        assert_eq!(
            storage.remove("CONFIG.BIN"),
            Err(StorageError::Io {
                file: "CONFIG.BIN",
                operation: "remove"
            })
        );
        assert!(!storage.exists("CONFIG.BIN"));
    }
}
