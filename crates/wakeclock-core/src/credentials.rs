//! Wi-Fi credentials and their persisted flash record.

use heapless::String;

pub const SSID_MAX_LEN: usize = 32;
pub const PASSWORD_MAX_LEN: usize = 64;

const RECORD_MAGIC: u32 = 0x314B_4357; // "WCK1"
const RECORD_VERSION: u8 = 1;
const SSID_OFFSET: usize = 8;
const PASSWORD_OFFSET: usize = SSID_OFFSET + SSID_MAX_LEN;
const CHECKSUM_OFFSET: usize = PASSWORD_OFFSET + PASSWORD_MAX_LEN;
pub const RECORD_LEN: usize = CHECKSUM_OFFSET + 4;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CredentialError {
    SsidTooLong,
    PasswordTooLong,
    InvalidUtf8,
    Corrupted,
}

/// Station credentials used to join the access point.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WifiCredentials {
    pub ssid: String<SSID_MAX_LEN>,
    pub password: String<PASSWORD_MAX_LEN>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialError> {
        let mut creds = Self::default();
        creds
            .ssid
            .push_str(ssid)
            .map_err(|_| CredentialError::SsidTooLong)?;
        creds
            .password
            .push_str(password)
            .map_err(|_| CredentialError::PasswordTooLong)?;
        Ok(creds)
    }

    pub fn from_bytes(ssid: &[u8], password: &[u8]) -> Result<Self, CredentialError> {
        let ssid = core::str::from_utf8(ssid).map_err(|_| CredentialError::InvalidUtf8)?;
        let password = core::str::from_utf8(password).map_err(|_| CredentialError::InvalidUtf8)?;
        Self::new(ssid, password)
    }
}

/// Persistence backend for the last known good credentials.
pub trait CredentialStore {
    type Error: core::fmt::Debug;

    fn load(&mut self) -> Result<Option<WifiCredentials>, Self::Error>;
    fn save(&mut self, creds: &WifiCredentials) -> Result<(), Self::Error>;
}

pub fn encode_record(creds: &WifiCredentials) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    let ssid = creds.ssid.as_bytes();
    let password = creds.password.as_bytes();

    buf[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    buf[4] = RECORD_VERSION;
    buf[5] = ssid.len() as u8;
    buf[6] = password.len() as u8;
    buf[SSID_OFFSET..SSID_OFFSET + ssid.len()].copy_from_slice(ssid);
    buf[PASSWORD_OFFSET..PASSWORD_OFFSET + password.len()].copy_from_slice(password);

    let checksum = checksum32(&buf[..CHECKSUM_OFFSET]);
    buf[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
    buf
}

/// Decodes a stored record. Erased flash or a foreign record yields `Ok(None)`.
pub fn decode_record(buf: &[u8; RECORD_LEN]) -> Result<Option<WifiCredentials>, CredentialError> {
    if buf.iter().all(|b| *b == 0xFF) {
        return Ok(None);
    }

    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != RECORD_MAGIC || buf[4] != RECORD_VERSION {
        return Ok(None);
    }

    let expected = u32::from_le_bytes([
        buf[CHECKSUM_OFFSET],
        buf[CHECKSUM_OFFSET + 1],
        buf[CHECKSUM_OFFSET + 2],
        buf[CHECKSUM_OFFSET + 3],
    ]);
    if checksum32(&buf[..CHECKSUM_OFFSET]) != expected {
        return Err(CredentialError::Corrupted);
    }

    let ssid_len = buf[5] as usize;
    let password_len = buf[6] as usize;
    if ssid_len > SSID_MAX_LEN || password_len > PASSWORD_MAX_LEN {
        return Err(CredentialError::Corrupted);
    }

    WifiCredentials::from_bytes(
        &buf[SSID_OFFSET..SSID_OFFSET + ssid_len],
        &buf[PASSWORD_OFFSET..PASSWORD_OFFSET + password_len],
    )
    .map(Some)
}

/// FNV-1a over the record body.
pub fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// RAM-backed store for hosts without flash.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Option<[u8; RECORD_LEN]>,
}

impl MemoryCredentialStore {
    pub const fn new() -> Self {
        Self { record: None }
    }

    pub fn with_credentials(creds: &WifiCredentials) -> Self {
        Self {
            record: Some(encode_record(creds)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    type Error = CredentialError;

    fn load(&mut self) -> Result<Option<WifiCredentials>, Self::Error> {
        match &self.record {
            Some(record) => decode_record(record),
            None => Ok(None),
        }
    }

    fn save(&mut self, creds: &WifiCredentials) -> Result<(), Self::Error> {
        self.record = Some(encode_record(creds));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erased_flash_has_no_credentials() {
        let erased = [0xFFu8; RECORD_LEN];
        assert_eq!(decode_record(&erased), Ok(None));
    }

    #[test]
    fn stored_record_decodes_back() {
        let creds = WifiCredentials::new("home-ap", "hunter22").unwrap();
        let record = encode_record(&creds);

        assert_eq!(&record[0..4], b"WCK1");
        assert_eq!(decode_record(&record), Ok(Some(creds)));
    }

    #[test]
    fn flipped_byte_is_reported_as_corruption() {
        let creds = WifiCredentials::new("home-ap", "hunter22").unwrap();
        let mut record = encode_record(&creds);
        record[SSID_OFFSET] ^= 0x20;

        assert_eq!(decode_record(&record), Err(CredentialError::Corrupted));
    }

    #[test]
    fn foreign_magic_is_ignored() {
        let mut record = [0u8; RECORD_LEN];
        record[0..4].copy_from_slice(&0x3153_4452u32.to_le_bytes());
        assert_eq!(decode_record(&record), Ok(None));
    }

    #[test]
    fn oversize_fields_are_rejected() {
        let long_ssid = "s".repeat(SSID_MAX_LEN + 1);
        let long_password = "p".repeat(PASSWORD_MAX_LEN + 1);

        assert_eq!(
            WifiCredentials::new(&long_ssid, "pw"),
            Err(CredentialError::SsidTooLong)
        );
        assert_eq!(
            WifiCredentials::new("ap", &long_password),
            Err(CredentialError::PasswordTooLong)
        );
    }

    #[test]
    fn memory_store_starts_empty_and_keeps_last_save() {
        let mut store = MemoryCredentialStore::new();
        assert_eq!(store.load(), Ok(None));

        let first = WifiCredentials::new("a", "1").unwrap();
        let second = WifiCredentials::new("b", "2").unwrap();
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.load(), Ok(Some(second)));
    }
}
