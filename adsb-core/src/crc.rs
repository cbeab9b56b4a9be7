//! CRC-24 parity check for Mode S messages.
//!
//! Generator polynomial 0xFFF409. For DF17/18 the last 24 bits are pure
//! parity, so a valid message leaves a remainder of 0.

use crate::types::hex_decode;

const GENERATOR: u32 = 0xFFF409;

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x800000 != 0 {
                (crc << 1) ^ GENERATOR
            } else {
                crc << 1
            };
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

fn divide(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |crc, &byte| {
        ((crc << 8) ^ CRC_TABLE[(((crc >> 16) ^ byte as u32) & 0xFF) as usize]) & 0xFFFFFF
    })
}

/// Parity computed over everything except the trailing 3-byte PI field.
pub fn crc24_payload(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return 0;
    }
    divide(&data[..data.len() - 3])
}

/// Remainder of the full message: payload parity XOR the PI field.
///
/// Zero for an intact DF17/18 message.
pub fn crc24(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return data.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32) & 0xFFFFFF;
    }
    let n = data.len() - 3;
    let pi = (data[n] as u32) << 16 | (data[n + 1] as u32) << 8 | data[n + 2] as u32;
    crc24_payload(data) ^ pi
}

/// True if the hex message has a zero CRC remainder.
pub fn validate(msg_hex: &str) -> bool {
    hex_decode(msg_hex).is_some_and(|data| crc24(&data) == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_encode;

    const VALID_FRAMES: &[&str] = &[
        "8D4840D6202CC371C32CE0576098",
        "8D40621D58C382D690C8AC2863A7",
        "8D40621D58C386435CC412692AD6",
        "8D485020994409940838175B284F",
    ];

    #[test]
    fn test_crc_table_edges() {
        assert_eq!(CRC_TABLE[0], 0);
        assert_ne!(CRC_TABLE[1], 0);
    }

    #[test]
    fn test_valid_frames_have_zero_remainder() {
        for hex in VALID_FRAMES {
            assert!(validate(hex), "CRC should validate: {hex}");
        }
    }

    #[test]
    fn test_single_bit_corruption_detected() {
        let mut data = hex_decode(VALID_FRAMES[0]).unwrap();
        data[5] ^= 0x01;
        assert!(!validate(&hex_encode(&data)));
    }

    #[test]
    fn test_payload_parity_matches_pi_field() {
        let data = hex_decode(VALID_FRAMES[1]).unwrap();
        let pi = (data[11] as u32) << 16 | (data[12] as u32) << 8 | data[13] as u32;
        assert_eq!(crc24_payload(&data), pi);
    }

    #[test]
    fn test_validate_rejects_non_hex() {
        assert!(!validate("not a message"));
    }
}
