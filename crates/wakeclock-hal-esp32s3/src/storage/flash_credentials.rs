//! Wi-Fi credentials in the last sector of a data partition.

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use log::info;
use wakeclock_core::credentials::{
    CredentialError, CredentialStore, RECORD_LEN, WifiCredentials, decode_record, encode_record,
};

const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashCredentialError {
    PartitionTable,
    PartitionMissing,
    FlashOpFailed(i32),
    Unaligned,
    Record(CredentialError),
}

/// ROM SPI-flash routines, word granular.
#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashCredentialError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        check(rc)?;
        Ok(Self)
    }

    fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashCredentialError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashCredentialError::Unaligned);
        }

        let rc = unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) };
        check(rc)
    }

    /// Reads `out.len()` bytes starting at a word-aligned address.
    fn read_words(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashCredentialError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashCredentialError::Unaligned);
        }

        for (i, chunk) in out.chunks_mut(4).enumerate() {
            let mut word = 0u32;
            let rc = unsafe {
                esp_rom_spiflash_read(addr + 4 * i as u32, &mut word as *mut u32 as *const u32, 4)
            };
            check(rc)?;
            chunk.copy_from_slice(&word.to_le_bytes()[..chunk.len()]);
        }

        Ok(())
    }

    /// Programs erased flash; a short tail is padded with `0xFF`.
    fn write_words(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashCredentialError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashCredentialError::Unaligned);
        }

        for (i, chunk) in data.chunks(4).enumerate() {
            let mut bytes = [0xFFu8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            let word = u32::from_le_bytes(bytes);

            let rc = unsafe { esp_rom_spiflash_write(addr + 4 * i as u32, &word as *const u32, 4) };
            check(rc)?;
        }

        Ok(())
    }
}

fn check(rc: i32) -> Result<(), FlashCredentialError> {
    if rc == ESP_ROM_SPIFLASH_RESULT_OK {
        Ok(())
    } else {
        Err(FlashCredentialError::FlashOpFailed(rc))
    }
}

// Only the partition table reader goes through these traits.
impl ReadStorage for RawFlash {
    type Error = FlashCredentialError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_words(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashCredentialError::Unaligned)
    }
}

/// Credentials kept in the last sector of the first writable data partition.
#[derive(Debug)]
pub struct FlashCredentialStore {
    flash: RawFlash,
    sector_addr: u32,
}

impl FlashCredentialStore {
    pub fn new() -> Result<Self, FlashCredentialError> {
        let mut flash = RawFlash::new()?;

        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let table = read_partition_table(&mut flash, &mut table_buf)
            .map_err(|_| FlashCredentialError::PartitionTable)?;

        let mut undefined: Option<(u32, u32)> = None;
        let mut nvs: Option<(u32, u32)> = None;

        for entry in table.iter() {
            if entry.is_read_only() || entry.len() < FLASH_SECTOR_SIZE {
                continue;
            }

            match entry.partition_type() {
                PartitionType::Data(DataPartitionSubType::Undefined) => {
                    undefined = Some((entry.offset(), entry.len()));
                    break;
                }
                PartitionType::Data(DataPartitionSubType::Nvs) if nvs.is_none() => {
                    nvs = Some((entry.offset(), entry.len()));
                }
                _ => {}
            }
        }

        let (offset, len) = undefined
            .or(nvs)
            .ok_or(FlashCredentialError::PartitionMissing)?;
        let sector_addr = offset + len - FLASH_SECTOR_SIZE;
        info!("credentials: using flash sector {:#x}", sector_addr);

        Ok(Self { flash, sector_addr })
    }
}

impl CredentialStore for FlashCredentialStore {
    type Error = FlashCredentialError;

    fn load(&mut self) -> Result<Option<WifiCredentials>, Self::Error> {
        let mut buf = [0u8; RECORD_LEN];
        self.flash.read_words(self.sector_addr, &mut buf)?;
        decode_record(&buf).map_err(FlashCredentialError::Record)
    }

    fn save(&mut self, creds: &WifiCredentials) -> Result<(), Self::Error> {
        let record = encode_record(creds);
        self.flash.erase_sector(self.sector_addr)?;
        self.flash.write_words(self.sector_addr, &record)?;
        info!("credentials: saved for \"{}\"", creds.ssid);
        Ok(())
    }
}
