//! CRC-16/MCRF4XX integrity check used by every frame on the wire.

/// Seed for a fresh checksum.
pub const CRC_SEED: u16 = 0xFFFF;

/// Reversed representation of the CCITT polynomial 0x1021.
const POLYNOMIAL: u16 = 0x8408;

/// Continues a running checksum over `data`, processing each byte LSB first.
///
/// Feeding a message in several pieces yields the same value as feeding it
/// in one call, which lets callers checksum a header and body separately.
pub fn crc16_mcrf4xx(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Checksum of `data` starting from [`CRC_SEED`].
pub fn crc16(data: &[u8]) -> u16 {
    crc16_mcrf4xx(CRC_SEED, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_check_value() {
        assert_eq!(crc16(b"123456789"), 0x6F91);
    }

    #[test]
    fn test_empty_input_returns_seed() {
        assert_eq!(crc16(&[]), CRC_SEED);
    }

    #[test]
    fn test_incremental_matches_single_pass() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x02, 0x00, 0x2A, 0x00];
        let (head, tail) = data.split_at(3);

        let split = crc16_mcrf4xx(crc16(head), tail);
        assert_eq!(split, crc16(&data));
    }

    #[test]
    fn test_single_bit_flip_changes_checksum() {
        let original = [0x01, 0x02, 0x03, 0x01, 0x02, 0x00, 0x07, 0x00];
        let mut flipped = original;
        flipped[6] ^= 0x01;

        assert_ne!(crc16(&original), crc16(&flipped));
    }
}
