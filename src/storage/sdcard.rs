// SD card over SPI
//
// Two views of the same card. `SdBlocks` is the raw 512-byte block
// device (what a filesystem driver mounts). `SdStorage` hands the card to
// embedded-sdmmc's FAT volume manager and exposes whole-file helpers on
// the first partition's root directory. No RTC is assumed, so FAT
// timestamps are fixed to 2025-01-01.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use embedded_sdmmc::{
    Block, BlockDevice, BlockIdx, Mode, SdCard, SdCardError, ShortFileName, TimeSource,
    Timestamp, VolumeIdx, VolumeManager,
};
use log::info;

use crate::error::{Error, Result};

pub const BLOCK_SIZE: usize = 512;

/// SD init clock; switch the bus to `NORMAL_FREQ_HZ` once `new` returns.
pub const INIT_FREQ_HZ: u32 = 400_000;
pub const NORMAL_FREQ_HZ: u32 = 20_000_000;

/// Filesystem-level error from the volume manager.
pub type FsError = embedded_sdmmc::Error<SdCardError>;

#[derive(Default, Clone, Copy)]
pub struct DummyTimeSource;

impl TimeSource for DummyTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

// ── block device ────────────────────────────────────────────────────

pub struct SdBlocks<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    card: SdCard<SPI, D>,
}

impl<SPI, D> SdBlocks<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    /// Card initialisation is deferred to the first access.
    pub fn new(spi: SPI, delay: D) -> Self {
        Self {
            card: SdCard::new(spi, delay),
        }
    }

    pub fn capacity_bytes(&self) -> Result<u64, SdCardError> {
        self.card.num_bytes().map_err(Error::Bus)
    }

    pub fn block_count(&self) -> Result<u32, SdCardError> {
        let count = self.card.num_blocks().map_err(Error::Bus)?;
        Ok(count.0)
    }

    /// Read whole blocks starting at `start`; `buf` must be a multiple of
    /// 512 bytes.
    pub fn read_blocks(&self, start: u32, buf: &mut [u8]) -> Result<(), SdCardError> {
        check_block_len(buf.len())?;
        let mut block = [Block::new()];
        for (i, chunk) in buf.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            self.card
                .read(&mut block, BlockIdx(start + i as u32))
                .map_err(Error::Bus)?;
            chunk.copy_from_slice(&block[0].contents);
        }
        Ok(())
    }

    pub fn write_blocks(&self, start: u32, data: &[u8]) -> Result<(), SdCardError> {
        check_block_len(data.len())?;
        let mut block = [Block::new()];
        for (i, chunk) in data.chunks_exact(BLOCK_SIZE).enumerate() {
            block[0].contents.copy_from_slice(chunk);
            self.card
                .write(&block, BlockIdx(start + i as u32))
                .map_err(Error::Bus)?;
        }
        Ok(())
    }

    /// Mount the FAT view on the same card.
    pub fn into_storage(self) -> SdStorage<SPI, D> {
        SdStorage::from_card(self.card)
    }
}

fn check_block_len(len: usize) -> Result<(), SdCardError> {
    if len == 0 || len % BLOCK_SIZE != 0 {
        return Err(Error::InvalidArgument(
            "buffer length must be a non-zero multiple of 512",
        ));
    }
    Ok(())
}

// ── FAT files ───────────────────────────────────────────────────────

/// One root directory entry as seen by [`SdStorage::list_root`].
#[derive(Debug, Clone, Copy)]
pub struct FileInfo<'a> {
    pub name: &'a str,
    pub size: u32,
    pub is_dir: bool,
}

pub struct SdStorage<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    volume_mgr: VolumeManager<SdCard<SPI, D>, DummyTimeSource>,
    capacity: Option<u64>,
}

impl<SPI, D> SdStorage<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    /// Read the card size and wrap the card in a volume manager.
    pub fn new(spi: SPI, delay: D) -> Self {
        Self::from_card(SdCard::new(spi, delay))
    }

    fn from_card(sdcard: SdCard<SPI, D>) -> Self {
        // the size query runs the SD init sequence (CMD0, CMD8, ACMD41)
        let capacity = match sdcard.num_bytes() {
            Ok(bytes) => {
                info!("SD card: {} bytes ({} MB)", bytes, bytes / 1024 / 1024);
                Some(bytes)
            }
            Err(e) => {
                info!("SD card size query failed: {:?}", e);
                None
            }
        };

        let volume_mgr = VolumeManager::new(sdcard, DummyTimeSource);
        Self {
            volume_mgr,
            capacity,
        }
    }

    /// Card size read in `new`, `None` if that read failed.
    pub fn capacity_bytes(&self) -> Option<u64> {
        self.capacity
    }

    /// Call `f` for every visible root entry. Volume labels and entries
    /// starting with `.` are skipped.
    pub fn list_root<F>(&self, mut f: F) -> Result<(), FsError>
    where
        F: FnMut(FileInfo<'_>),
    {
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(Error::Bus)?;
        let root = volume.open_root_dir().map_err(Error::Bus)?;

        root.iterate_dir(|entry| {
            if entry.attributes.is_volume() || entry.name.base_name().first() == Some(&b'.') {
                return;
            }
            let mut name_buf = [0u8; 13];
            let len = format_83_name(&entry.name, &mut name_buf);
            let name = core::str::from_utf8(&name_buf[..len]).unwrap_or("?");
            f(FileInfo {
                name,
                size: entry.size,
                is_dir: entry.attributes.is_directory(),
            });
        })
        .map_err(Error::Bus)
    }

    pub fn file_size(&self, name: &str) -> Result<u32, FsError> {
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(Error::Bus)?;
        let root = volume.open_root_dir().map_err(Error::Bus)?;
        let file = root
            .open_file_in_dir(name, Mode::ReadOnly)
            .map_err(Error::Bus)?;
        Ok(file.length())
    }

    /// Read up to `buf.len()` bytes from `offset`; returns bytes read.
    pub fn read_file_chunk(&self, name: &str, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(Error::Bus)?;
        let root = volume.open_root_dir().map_err(Error::Bus)?;
        let file = root
            .open_file_in_dir(name, Mode::ReadOnly)
            .map_err(Error::Bus)?;

        file.seek_from_start(offset).map_err(Error::Bus)?;

        let mut total = 0;
        while !file.is_eof() && total < buf.len() {
            let n = file.read(&mut buf[total..]).map_err(Error::Bus)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Create or truncate `name` and write `data`.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<(), FsError> {
        self.write_with_mode(name, data, Mode::ReadWriteCreateOrTruncate)
    }

    /// Append to `name`, creating it if missing.
    pub fn append_file(&self, name: &str, data: &[u8]) -> Result<(), FsError> {
        self.write_with_mode(name, data, Mode::ReadWriteCreateOrAppend)
    }

    pub fn delete_file(&self, name: &str) -> Result<(), FsError> {
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(Error::Bus)?;
        let root = volume.open_root_dir().map_err(Error::Bus)?;
        root.delete_file_in_dir(name).map_err(Error::Bus)
    }

    fn write_with_mode(&self, name: &str, data: &[u8], mode: Mode) -> Result<(), FsError> {
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(Error::Bus)?;
        let root = volume.open_root_dir().map_err(Error::Bus)?;
        let file = root.open_file_in_dir(name, mode).map_err(Error::Bus)?;

        if !data.is_empty() {
            file.write(data).map_err(Error::Bus)?;
        }
        file.flush().map_err(Error::Bus)?;
        Ok(())
    }
}

/// Render an 8.3 name as `BASE.EXT` (no dot without extension).
/// Returns the number of bytes written to `out`.
pub fn format_83_name(sfn: &ShortFileName, out: &mut [u8; 13]) -> usize {
    let mut pos = 0;

    for &b in sfn.base_name().iter() {
        if b == b' ' {
            break;
        }
        out[pos] = b;
        pos += 1;
    }

    let ext = sfn.extension();
    let ext = &ext[..ext.iter().position(|&b| b == b' ').unwrap_or(ext.len())];
    if !ext.is_empty() {
        out[pos] = b'.';
        pos += 1;
        for &b in ext {
            out[pos] = b;
            pos += 1;
        }
    }

    pos
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{MockDelay, MockSpi};
    use embedded_sdmmc::sdcard::proto::crc16;
    use std::vec::Vec;

    /// R1 and data replies for CMD0, CMD59, CMD8, ACMD41 and CMD58 from a
    /// v2 high-capacity card. Each command first sees one idle 0xFF.
    fn script_sdhc_init(spi: &MockSpi) {
        spi.queue_reply(&[0x01]);
        spi.queue_reply(&[0xFF, 0x01]);
        spi.queue_reply(&[0xFF, 0x01, 0x00, 0x00, 0x01, 0xAA]);
        spi.queue_reply(&[0xFF, 0x01, 0xFF, 0x00]);
        spi.queue_reply(&[0xFF, 0x00, 0xC0, 0xFF, 0x80, 0x00]);
        spi.queue_reply(&[0xFF]);
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn pattern() -> Vec<u8> {
        (0..BLOCK_SIZE).map(|i| (i * 7) as u8).collect()
    }

    fn name(s: &str) -> (usize, [u8; 13]) {
        let sfn = ShortFileName::create_from_str(s).unwrap();
        let mut out = [0u8; 13];
        let n = format_83_name(&sfn, &mut out);
        (n, out)
    }

    #[test]
    fn test_format_83_with_extension() {
        let (n, out) = name("README.TXT");
        assert_eq!(&out[..n], b"README.TXT");
    }

    #[test]
    fn test_format_83_without_extension() {
        let (n, out) = name("DATA");
        assert_eq!(&out[..n], b"DATA");
    }

    #[test]
    fn test_format_83_short_extension() {
        let (n, out) = name("A.C");
        assert_eq!(&out[..n], b"A.C");
    }

    #[test]
    fn test_timestamp_is_2025() {
        let ts = DummyTimeSource.get_timestamp();
        assert_eq!(ts.year_since_1970 as u32 + 1970, 2025);
    }

    #[test]
    fn test_block_buffers_must_be_whole_blocks() {
        let spi = MockSpi::new();
        let blocks = SdBlocks::new(spi.clone(), MockDelay::new());
        let mut buf = [0u8; 100];
        assert!(matches!(
            blocks.read_blocks(0, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            blocks.write_blocks(0, &[]),
            Err(Error::InvalidArgument(_))
        ));
        // rejected before the card is touched
        assert!(spi.transactions().is_empty());
    }

    #[test]
    fn test_read_block_through_card_init() {
        let spi = MockSpi::new();
        script_sdhc_init(&spi);
        let data = pattern();
        spi.queue_reply(&[0xFF, 0x00, 0xFE]);
        spi.queue_reply(&data);
        spi.queue_reply(&crc16(&data).to_be_bytes());

        let blocks = SdBlocks::new(spi.clone(), MockDelay::new());
        let mut buf = [0u8; BLOCK_SIZE];
        blocks.read_blocks(7, &mut buf).unwrap();
        assert_eq!(buf[..], data[..]);

        let sent = spi.sent();
        // CMD0 first, then CMD17 addressed by block number on SDHC
        assert_eq!(sent[..6], [0x40, 0, 0, 0, 0, 0x95]);
        assert!(contains(&sent, &[0x51, 0x00, 0x00, 0x00, 0x07]));
    }

    #[test]
    fn test_write_block_through_card_init() {
        let spi = MockSpi::new();
        script_sdhc_init(&spi);
        // CMD24 R1, start token slot, data response, not busy, CMD13 R1 + R2
        spi.queue_reply(&[0xFF, 0x00, 0xFF, 0x05, 0xFF, 0xFF, 0x00, 0x00]);

        let blocks = SdBlocks::new(spi.clone(), MockDelay::new());
        let data = pattern();
        blocks.write_blocks(3, &data).unwrap();

        let sent = spi.sent();
        assert!(contains(&sent, &[0x58, 0x00, 0x00, 0x00, 0x03]));
        let mut framed = Vec::with_capacity(BLOCK_SIZE + 3);
        framed.push(0xFE);
        framed.extend_from_slice(&data);
        framed.extend_from_slice(&crc16(&data).to_be_bytes());
        assert!(contains(&sent, &framed));
    }

    #[test]
    fn test_card_rejecting_data_write() {
        let spi = MockSpi::new();
        script_sdhc_init(&spi);
        // data response 0x0B: CRC error
        spi.queue_reply(&[0xFF, 0x00, 0xFF, 0x0B]);
        let blocks = SdBlocks::new(spi, MockDelay::new());
        assert!(matches!(
            blocks.write_blocks(0, &[0u8; BLOCK_SIZE]),
            Err(Error::Bus(SdCardError::WriteError))
        ));
    }
}
