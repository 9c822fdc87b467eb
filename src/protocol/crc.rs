//! CRC-8/Maxim (Dallas 1-Wire): polynomial 0x31 reflected, init 0x00, no final xor.

const POLY_REFLECTED: u8 = 0x8C;

pub fn crc8_maxim(data: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;

    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x01 != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Checks a span whose last byte is the CRC of everything before it.
pub fn verify(bytes_with_crc: &[u8]) -> bool {
    match bytes_with_crc.split_last() {
        Some((&received, body)) => crc8_maxim(body) == received,
        None => false,
    }
}
