//! Broadcast "smart config" provisioning.
//!
//! A companion app on the target network sends UDP broadcasts whose payload
//! lengths carry the credentials. The device sniffs frames in promiscuous mode,
//! so only lengths and source addresses are needed, never the payload.
//!
//! Stream layout, as payload lengths:
//!
//! - guide: `515, 514, 513, 512`
//! - per message byte `b` at index `seq`, three frames offset by 40:
//!   `(crc & 0xF0) | b >> 4`, `0x100 | seq`, `(crc & 0x0F) << 4 | b & 0x0F`
//!   with `crc = crc8([b, seq])`
//!
//! The message is `[total_len, ssid_len, ssid.., password.., crc8(previous)]`.
//! Observed 802.11 lengths exceed the payload length by a constant link-layer
//! overhead, recovered from the guide as `base`.

use heapless::Vec;
use log::{debug, info};

use crate::credentials::{PASSWORD_MAX_LEN, SSID_MAX_LEN, WifiCredentials};

pub const GUIDE: [u16; 4] = [515, 514, 513, 512];
pub const DATUM_OFFSET: u16 = 40;
pub const MAX_MESSAGE_LEN: usize = 3 + SSID_MAX_LEN + PASSWORD_MAX_LEN;
pub const MAX_FRAMES: usize = GUIDE.len() + 3 * MAX_MESSAGE_LEN + 1;
pub const MAX_CANDIDATES: usize = 4;

const SEQ_FLAG: u16 = 0x100;
const MIN_MESSAGE_LEN: usize = 4;

/// One sniffed broadcast frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Frame {
    pub source: [u8; 6],
    pub len: u16,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeStatus {
    /// No source has sent a complete guide yet.
    Searching,
    /// Locked on a source; `received` of `total` message bytes are known.
    Receiving { received: u8, total: Option<u8> },
    Complete(WifiCredentials),
}

/// Dallas/Maxim CRC-8 (reflected polynomial 0x8C, zero init).
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in bytes {
        crc ^= *byte;
        for _ in 0..8 {
            crc = if crc & 0x01 != 0 {
                (crc >> 1) ^ 0x8C
            } else {
                crc >> 1
            };
        }
    }
    crc
}

/// Payload lengths for one full pass of the stream, guide included.
pub fn encode(creds: &WifiCredentials) -> Vec<u16, MAX_FRAMES> {
    let ssid = creds.ssid.as_bytes();
    let password = creds.password.as_bytes();

    let mut message: Vec<u8, MAX_MESSAGE_LEN> = Vec::new();
    let total = 3 + ssid.len() + password.len();
    // Field limits keep every push in bounds.
    let _ = message.push(total as u8);
    let _ = message.push(ssid.len() as u8);
    let _ = message.extend_from_slice(ssid);
    let _ = message.extend_from_slice(password);
    let _ = message.push(crc8(&message));

    let mut frames = Vec::new();
    let _ = frames.extend_from_slice(&GUIDE);
    for (seq, byte) in message.iter().enumerate() {
        let seq = seq as u8;
        let crc = crc8(&[*byte, seq]) as u16;
        let b = *byte as u16;

        let _ = frames.push(DATUM_OFFSET + ((crc & 0xF0) | (b >> 4)));
        let _ = frames.push(DATUM_OFFSET + (SEQ_FLAG | seq as u16));
        let _ = frames.push(DATUM_OFFSET + (((crc & 0x0F) << 4) | (b & 0x0F)));
    }
    frames
}

const MAC_HEADER_LEN: usize = 24;

/// Extracts a [`Frame`] from a raw 802.11 MPDU.
///
/// Only data frames relayed by the access point (`FromDS`) to the broadcast
/// address qualify; the source is the original sender (`addr3`).
pub fn observe_80211(raw: &[u8]) -> Option<Frame> {
    if raw.len() < MAC_HEADER_LEN {
        return None;
    }

    let is_data = raw[0] & 0x0C == 0x08;
    let from_ds_only = raw[1] & 0x03 == 0x02;
    let broadcast = raw[4..10].iter().all(|b| *b == 0xFF);
    if !(is_data && from_ds_only && broadcast) {
        return None;
    }

    let mut source = [0u8; 6];
    source.copy_from_slice(&raw[16..22]);
    let len = u16::try_from(raw.len()).ok()?;

    Some(Frame { source, len })
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    source: [u8; 6],
    history: [u16; 4],
    seen: u8,
}

impl Candidate {
    fn new(source: [u8; 6]) -> Self {
        Self {
            source,
            history: [0; 4],
            seen: 0,
        }
    }

    fn observe(&mut self, len: u16) -> Option<u16> {
        self.history.rotate_left(1);
        self.history[3] = len;
        self.seen = self.seen.saturating_add(1);

        if self.seen < 4 {
            return None;
        }

        let first = self.history[0];
        let is_guide = first >= GUIDE[0]
            && self
                .history
                .iter()
                .enumerate()
                .all(|(i, len)| *len == first - i as u16);

        is_guide.then(|| first - GUIDE[0])
    }
}

#[derive(Clone, Copy, Debug)]
struct Lock {
    source: [u8; 6],
    base: u16,
}

/// Incremental decoder fed with every sniffed broadcast frame.
#[derive(Debug)]
pub struct Decoder {
    candidates: Vec<Candidate, MAX_CANDIDATES>,
    lock: Option<Lock>,
    window: Vec<u16, 3>,
    slots: [Option<u8>; MAX_MESSAGE_LEN],
    rejected: u32,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            candidates: Vec::new(),
            lock: None,
            window: Vec::new(),
            slots: [None; MAX_MESSAGE_LEN],
            rejected: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn locked_source(&self) -> Option<[u8; 6]> {
        self.lock.map(|lock| lock.source)
    }

    /// Link-layer overhead recovered from the guide.
    pub fn base(&self) -> Option<u16> {
        self.lock.map(|lock| lock.base)
    }

    /// Triplets dropped for a bad per-byte CRC.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    pub fn push(&mut self, frame: Frame) -> DecodeStatus {
        match self.lock {
            None => self.hunt(frame),
            Some(lock) if lock.source == frame.source => self.collect(lock, frame.len),
            Some(_) => self.status(),
        }
    }

    fn hunt(&mut self, frame: Frame) -> DecodeStatus {
        let index = match self
            .candidates
            .iter()
            .position(|c| c.source == frame.source)
        {
            Some(index) => index,
            None => {
                if self.candidates.is_full() {
                    self.candidates.remove(0);
                }
                let _ = self.candidates.push(Candidate::new(frame.source));
                self.candidates.len() - 1
            }
        };

        if let Some(base) = self.candidates[index].observe(frame.len) {
            info!(
                "provision: locked on {:02x?} with base offset {}",
                frame.source, base
            );
            self.lock = Some(Lock {
                source: frame.source,
                base,
            });
            self.candidates.clear();
        }

        self.status()
    }

    fn collect(&mut self, lock: Lock, len: u16) -> DecodeStatus {
        let floor = lock.base + DATUM_OFFSET;
        let value = match len.checked_sub(floor) {
            Some(value) if value < GUIDE[3] - DATUM_OFFSET => value,
            // Guide repeats and stray frames break the current triplet.
            _ => {
                self.window.clear();
                return self.status();
            }
        };

        if self.window.is_full() {
            self.window.remove(0);
        }
        let _ = self.window.push(value);

        if self.window.len() == 3 {
            self.try_triplet();
        }

        self.try_complete()
    }

    fn try_triplet(&mut self) {
        let (hi, seq, lo) = (self.window[0], self.window[1], self.window[2]);
        let shaped = hi & SEQ_FLAG == 0 && seq & SEQ_FLAG != 0 && lo & SEQ_FLAG == 0;
        if !shaped {
            return;
        }

        let seq = (seq & 0xFF) as u8;
        let byte = (((hi & 0x0F) << 4) | (lo & 0x0F)) as u8;
        let crc = ((hi & 0xF0) | (lo >> 4)) as u8;

        if crc8(&[byte, seq]) != crc {
            self.rejected = self.rejected.saturating_add(1);
            debug!("provision: bad byte crc at seq {}", seq);
            return;
        }

        if let Some(slot) = self.slots.get_mut(seq as usize) {
            *slot = Some(byte);
        }
        self.window.clear();
    }

    fn try_complete(&mut self) -> DecodeStatus {
        let Some(total) = self.total_len() else {
            return self.status();
        };
        if self.slots[..total].iter().any(Option::is_none) {
            return self.status();
        }

        let mut message = [0u8; MAX_MESSAGE_LEN];
        for (dst, slot) in message.iter_mut().zip(self.slots[..total].iter()) {
            *dst = slot.unwrap_or(0);
        }
        let message = &message[..total];

        let body = &message[..total - 1];
        if crc8(body) != message[total - 1] {
            debug!("provision: message crc mismatch, restarting collection");
            self.slots = [None; MAX_MESSAGE_LEN];
            return self.status();
        }

        let ssid_len = message[1] as usize;
        if 2 + ssid_len > body.len() {
            self.slots = [None; MAX_MESSAGE_LEN];
            return self.status();
        }

        match WifiCredentials::from_bytes(&body[2..2 + ssid_len], &body[2 + ssid_len..]) {
            Ok(creds) => {
                info!("provision: received credentials for \"{}\"", creds.ssid);
                DecodeStatus::Complete(creds)
            }
            Err(_) => {
                self.slots = [None; MAX_MESSAGE_LEN];
                self.status()
            }
        }
    }

    fn total_len(&self) -> Option<usize> {
        let total = self.slots[0]? as usize;
        (MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN)
            .contains(&total)
            .then_some(total)
    }

    fn status(&self) -> DecodeStatus {
        if self.lock.is_none() {
            return DecodeStatus::Searching;
        }

        let received = self.slots.iter().filter(|slot| slot.is_some()).count() as u8;
        DecodeStatus::Receiving {
            received,
            total: self.total_len().map(|total| total as u8),
        }
    }
}
