//! CRC16-CCITT checksum used to protect CA64 frames.
//!
//! Parameters: polynomial 0x1021, initial register 0xFFFF, MSB-first, no
//! reflection and no final XOR (the variant often called CCITT-FALSE).

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Incremental CRC16 hasher.
///
/// Feeding the same bytes in several `update` calls yields the same value as a
/// single call over their concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    register: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub const fn new() -> Self {
        Self { register: INIT }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let mut crc = self.register;
        for &b in bytes {
            crc ^= (b as u16) << 8;
            for _ in 0..8 {
                if (crc & 0x8000) != 0 {
                    crc = (crc << 1) ^ POLY;
                } else {
                    crc <<= 1;
                }
            }
        }
        self.register = crc;
    }

    pub fn finish(&self) -> u16 {
        self.register
    }
}

/// Compute the CRC16 of `bytes` in one go.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(bytes);
    crc.finish()
}
