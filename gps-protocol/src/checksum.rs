//! Integrity checks used by the binary protocols.

/// Bitwise XOR of every byte in `data`. Used by the Huabao family.
pub fn xor(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, byte| acc ^ byte)
}

/// CRC-16/X-25, called CRC-ITU in GT06 documentation.
///
/// Reflected polynomial `0x8408`, seed `0xFFFF`, output inverted.
pub fn crc16_itu(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ 0x8408
            } else {
                crc >> 1
            };
        }
    }
    !crc
}
