//! Byte-stuffing for the Huabao family.
//!
//! Inside a frame, `0x7E` is sent as `7D 02` and `0x7D` as `7D 01`.
//! The two outer delimiters are never escaped.

use crate::error::DecodeError;

pub const DELIMITER: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;

/// Escapes every delimiter and escape byte in `data`.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    escape_into(data, &mut out);
    out
}

pub fn escape_into(data: &[u8], out: &mut Vec<u8>) {
    for byte in data {
        match *byte {
            ESCAPE => out.extend_from_slice(&[ESCAPE, 0x01]),
            DELIMITER => out.extend_from_slice(&[ESCAPE, 0x02]),
            other => out.push(other),
        }
    }
}

/// Reverses [escape]. An escape byte followed by anything but `01`/`02`,
/// or at the very end of the data, is a framing error.
pub fn unescape(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(byte) = bytes.next() {
        if *byte != ESCAPE {
            out.push(*byte);
            continue;
        }
        match bytes.next() {
            Some(0x01) => out.push(ESCAPE),
            Some(0x02) => out.push(DELIMITER),
            Some(other) => {
                return Err(DecodeError::framing(format!(
                    "invalid escape sequence 7d {:02x}",
                    other
                )));
            }
            None => return Err(DecodeError::framing("dangling escape byte")),
        }
    }
    Ok(out)
}
