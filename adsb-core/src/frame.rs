//! Parse raw hex strings into validated extended-squitter frames.
//!
//! Only 112-bit DF17/18 messages carry the ADS-B fields this crate decodes,
//! so anything else is rejected here:
//! - non-hex or wrong-length input
//! - any other Downlink Format
//! - CRC failures

use crate::crc;
use crate::types::*;

/// Number of bytes in a long (112-bit) Mode S message.
const LONG_MSG_BYTES: usize = 14;

/// Downlink Format of any Mode S message, read from its first 5 bits.
pub fn df(hex: &str) -> Result<u8> {
    let head = hex
        .get(..2)
        .ok_or_else(|| AdsbError::InvalidHex(hex.to_string()))?;
    let byte = u8::from_str_radix(head, 16).map_err(|_| AdsbError::InvalidHex(hex.to_string()))?;
    Ok(byte >> 3)
}

/// A CRC-validated 112-bit extended squitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: [u8; LONG_MSG_BYTES],
}

impl Frame {
    /// Parse and validate a 28-digit hex message.
    pub fn parse(hex: &str) -> Result<Frame> {
        let hex = hex.trim();
        if !is_hex(hex) {
            return Err(AdsbError::InvalidHex(hex.to_string()));
        }
        if hex.len() != LONG_MSG_HEX_LEN {
            return Err(AdsbError::InvalidLength {
                expected: LONG_MSG_HEX_LEN,
                actual: hex.len(),
            });
        }

        let bytes = hex_decode(hex).ok_or_else(|| AdsbError::InvalidHex(hex.to_string()))?;
        let mut raw = [0u8; LONG_MSG_BYTES];
        raw.copy_from_slice(&bytes);

        let df = raw[0] >> 3;
        if df != DF_EXTENDED_SQUITTER && df != DF_TISB {
            return Err(AdsbError::NotExtendedSquitter(df));
        }
        if crc::crc24(&raw) != 0 {
            return Err(AdsbError::CrcFailed);
        }

        Ok(Frame { raw })
    }

    /// Downlink Format (17 or 18).
    pub fn df(&self) -> u8 {
        self.raw[0] >> 3
    }

    /// Transponder capability field.
    pub fn capability(&self) -> u8 {
        self.raw[0] & 0x07
    }

    /// Announced ICAO address (bytes 1-3).
    pub fn icao(&self) -> Icao {
        [self.raw[1], self.raw[2], self.raw[3]]
    }

    /// The 56-bit ME field, right-aligned in a u64.
    ///
    /// Bit 55 is the first transmitted ME bit, so field offsets below are
    /// counted from the least significant end.
    pub fn me(&self) -> u64 {
        self.raw[4..11]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// ADS-B Type Code (first 5 bits of ME).
    pub fn type_code(&self) -> u8 {
        self.raw[4] >> 3
    }

    /// CPR format flag: true for odd frames.
    pub fn oe_flag(&self) -> bool {
        (self.me() >> 34) & 1 == 1
    }

    /// 17-bit CPR-encoded latitude.
    pub fn cpr_lat(&self) -> u32 {
        ((self.me() >> 17) & 0x1FFFF) as u32
    }

    /// 17-bit CPR-encoded longitude.
    pub fn cpr_lon(&self) -> u32 {
        (self.me() & 0x1FFFF) as u32
    }

    /// True for TC 9-18 and 20-22.
    pub fn is_airborne_position(&self) -> bool {
        matches!(self.type_code(), 9..=18 | 20..=22)
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.raw)
    }
}
