//! SNTPv4 client packet codec.

pub const PACKET_LEN: usize = 48;
pub const NTP_PORT: u16 = 123;

/// Seconds between 1900-01-01 and 1970-01-01.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;
const VERSION: u8 = 4;
const TRANSMIT_OFFSET: usize = 40;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NtpError {
    Truncated,
    UnexpectedMode(u8),
    /// Stratum 0 reply; the server refused service.
    KissOfDeath,
    MissingTimestamp,
    BeforeUnixEpoch,
}

/// Client request with LI=0, VN=4, Mode=3 and every other field zeroed.
pub fn build_request() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = (VERSION << 3) | MODE_CLIENT;
    packet
}

/// Extracts the server transmit time as Unix seconds.
pub fn parse_response(packet: &[u8]) -> Result<u64, NtpError> {
    if packet.len() < PACKET_LEN {
        return Err(NtpError::Truncated);
    }

    let mode = packet[0] & 0x07;
    if mode != MODE_SERVER {
        return Err(NtpError::UnexpectedMode(mode));
    }
    if packet[1] == 0 {
        return Err(NtpError::KissOfDeath);
    }

    let transmit = &packet[TRANSMIT_OFFSET..TRANSMIT_OFFSET + 8];
    if transmit.iter().all(|b| *b == 0) {
        return Err(NtpError::MissingTimestamp);
    }

    let seconds = u32::from_be_bytes([transmit[0], transmit[1], transmit[2], transmit[3]]) as u64;
    seconds
        .checked_sub(NTP_UNIX_OFFSET)
        .ok_or(NtpError::BeforeUnixEpoch)
}
