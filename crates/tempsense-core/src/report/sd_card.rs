use alloc::vec::Vec;

use embedded_sdmmc::{BlockDevice, Mode, TimeSource, VolumeIdx, VolumeManager};
use log::error;

use super::{ReportError, ReportSink, record};
use crate::reading::Reading;

/// Append-only log of readings in the card's root directory
pub const RECORD_FILE: &str = "READINGS.BIN";

/// Keeps a local copy of every reading on a FAT-formatted SD card.
///
/// Card operations are blocking; they run between sensor polls so nothing
/// time-critical shares the bus with them.
pub struct SdCardRecorder<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<D, T, 4, 4, 1>,
}

impl<D, T> SdCardRecorder<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    pub fn new(device: D, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(device, ts);

        Self { volume_mgr }
    }

    /// Appends raw bytes to the record file, creating it on first use
    pub fn append(&self, data: &[u8]) -> Result<(), embedded_sdmmc::Error<D::Error>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(RECORD_FILE, Mode::ReadWriteCreateOrAppend)?;

        file.write(data)?;

        // Close explicitly so errors surface instead of being lost on drop
        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    /// Reads back every intact reading in the record file.
    pub fn read_all(&self) -> Result<Vec<Reading>, embedded_sdmmc::Error<D::Error>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(RECORD_FILE, Mode::ReadOnly)?;

        let mut contents = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            contents.extend_from_slice(&chunk[..n]);
        }

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        let (readings, skipped) = record::decode_all(&mut contents);
        if skipped > 0 {
            error!("{} damaged frames in {}", skipped, RECORD_FILE);
        }
        Ok(readings)
    }
}

impl<D, T> ReportSink for SdCardRecorder<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        let frame = record::encode(reading)?;
        self.append(&frame).map_err(|e| {
            error!("SD card append failed: {:?}", e);
            ReportError::Storage("SD card write failed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::TemperatureUnit;
    use crate::time::{Clock, ClockTimeSource, Timestamp};
    use core::cell::RefCell;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embedded_sdmmc::{Block, BlockCount, BlockIdx};

    const VOLUME_BLOCKS: u16 = 4150;
    const FAT_BLOCKS: u16 = 17;
    const ROOT_ENTRIES: u16 = 512;

    /// Card image held in memory.
    struct RamCard {
        data: RefCell<Vec<u8>>,
    }

    impl RamCard {
        fn blank() -> Self {
            Self {
                data: RefCell::new(alloc::vec![0; (usize::from(VOLUME_BLOCKS) + 1) * Block::LEN]),
            }
        }

        /// One FAT16 partition starting at block 1, one cluster per block.
        fn formatted() -> Self {
            let card = Self::blank();
            {
                let mut data = card.data.borrow_mut();

                let partition = &mut data[446..462];
                partition[4] = 0x06;
                partition[8..12].copy_from_slice(&1u32.to_le_bytes());
                partition[12..16].copy_from_slice(&u32::from(VOLUME_BLOCKS).to_le_bytes());
                data[510..512].copy_from_slice(&[0x55, 0xAA]);

                let boot = &mut data[Block::LEN..2 * Block::LEN];
                boot[..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
                boot[11..13].copy_from_slice(&512u16.to_le_bytes());
                boot[13] = 1;
                boot[14..16].copy_from_slice(&1u16.to_le_bytes());
                boot[16] = 1;
                boot[17..19].copy_from_slice(&ROOT_ENTRIES.to_le_bytes());
                boot[19..21].copy_from_slice(&VOLUME_BLOCKS.to_le_bytes());
                boot[21] = 0xF8;
                boot[22..24].copy_from_slice(&FAT_BLOCKS.to_le_bytes());
                boot[510..512].copy_from_slice(&[0x55, 0xAA]);

                // media descriptor and end-of-chain markers for the reserved clusters
                data[2 * Block::LEN..2 * Block::LEN + 4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF]);
            }
            card
        }
    }

    impl BlockDevice for RamCard {
        type Error = Infallible;

        fn read(&self, blocks: &mut [Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
            let data = self.data.borrow();
            for (i, block) in blocks.iter_mut().enumerate() {
                let offset = (start_block_idx.0 as usize + i) * Block::LEN;
                block.contents.copy_from_slice(&data[offset..offset + Block::LEN]);
            }
            Ok(())
        }

        fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
            let mut data = self.data.borrow_mut();
            for (i, block) in blocks.iter().enumerate() {
                let offset = (start_block_idx.0 as usize + i) * Block::LEN;
                data[offset..offset + Block::LEN].copy_from_slice(&block.contents);
            }
            Ok(())
        }

        fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
            Ok(BlockCount((self.data.borrow().len() / Block::LEN) as u32))
        }
    }

    struct Fixed;

    impl Clock for Fixed {
        fn now(&self) -> Timestamp {
            Timestamp::from_unix(1_700_000_000)
        }
    }

    fn reading(sensor: &str, celsius: f32) -> Reading {
        Reading::from_celsius(sensor, celsius, TemperatureUnit::Celsius, Fixed.now())
    }

    #[test]
    fn test_published_readings_are_appended() {
        let mut recorder = SdCardRecorder::new(RamCard::formatted(), ClockTimeSource::new(Fixed, 0));
        assert!(recorder.read_all().is_err(), "record file exists before first write");

        let first = reading("porch", 21.5);
        let second = reading("attic", -3.25);
        block_on(recorder.publish(&first)).unwrap();
        block_on(recorder.publish(&second)).unwrap();

        assert_eq!(recorder.read_all().unwrap(), [first, second]);
    }

    #[test]
    fn test_unformatted_card_is_a_storage_error() {
        let mut recorder = SdCardRecorder::new(RamCard::blank(), ClockTimeSource::new(Fixed, 0));

        let result = block_on(recorder.publish(&reading("porch", 21.5)));
        assert!(matches!(result, Err(ReportError::Storage(_))));
    }
}
