//! Command bytes and line addressing.

/// Panel width in pixels.
pub const WIDTH: usize = 400;
/// Panel height in pixels.
pub const HEIGHT: usize = 240;
/// Number of bytes in one display line.
pub const LINE_BYTES: usize = WIDTH / 8;

pub const CMD_WRITE: u8 = 0x80;
pub const CMD_CLEAR: u8 = 0x20;
const VCOM_BIT: u8 = 0x40;

/// Wire address byte (`AG0..AG7`, LSB first) for line 1..=240.
#[inline]
pub fn encode_line_address(line: u16) -> Option<u8> {
    if !(1..=HEIGHT as u16).contains(&line) {
        return None;
    }

    Some((line as u8).reverse_bits())
}

#[inline]
pub fn command_byte(command: u8, vcom_high: bool) -> u8 {
    command | if vcom_high { VCOM_BIT } else { 0x00 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_address_encoding_matches_datasheet_table() {
        assert_eq!(encode_line_address(1), Some(0x80));
        assert_eq!(encode_line_address(2), Some(0x40));
        assert_eq!(encode_line_address(3), Some(0xC0));
        assert_eq!(encode_line_address(238), Some(0x77));
        assert_eq!(encode_line_address(240), Some(0x0F));
    }

    #[test]
    fn invalid_line_is_rejected() {
        assert_eq!(encode_line_address(0), None);
        assert_eq!(encode_line_address(241), None);
    }

    #[test]
    fn command_bytes_carry_vcom() {
        assert_eq!(command_byte(CMD_WRITE, false), 0x80);
        assert_eq!(command_byte(CMD_WRITE, true), 0xC0);
        assert_eq!(command_byte(CMD_CLEAR, false), 0x20);
    }
}
