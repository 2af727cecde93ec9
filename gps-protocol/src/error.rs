use std::io::{self, ErrorKind};
use std::num::{ParseFloatError, ParseIntError};
use std::str::Utf8Error;

use thiserror::Error;

/// Errors that may occur when decoding a frame from a device.
///
/// Every variant ends the session that produced it. None of them are
/// reported back to the device.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Bad start/stop markers, a bad length or an unrecognized leading byte.
    #[error("framing error: {0}")]
    Framing(String),
    #[error("checksum mismatch: frame carries {expected:#06x}, computed {computed:#06x}")]
    Checksum { expected: u16, computed: u16 },
    /// Encryption, sub-packaging or a sub-type that is recognized but not decoded.
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("invalid field: {0}")]
    FieldParse(String),
    #[error("frame too large! Maximum is {max}, but got {got}")]
    FrameTooLarge { max: usize, got: usize },
    /// A login frame claimed a different identity than the one already learned on this connection.
    #[error("device identified as {learned} cannot log in again as {claimed}")]
    IdentityConflict { learned: String, claimed: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DecodeError {
    pub(crate) fn framing(message: impl Into<String>) -> Self {
        DecodeError::Framing(message.into())
    }

    pub(crate) fn field(message: impl Into<String>) -> Self {
        DecodeError::FieldParse(message.into())
    }

    /// Whether the error means the peer went away rather than sent garbage.
    pub fn is_connection_gone(&self) -> bool {
        match self {
            DecodeError::Io(err) => matches!(
                err.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<Utf8Error> for DecodeError {
    fn from(value: Utf8Error) -> Self {
        DecodeError::FieldParse(format!("Invalid UTF8: {}", value))
    }
}

impl From<ParseIntError> for DecodeError {
    fn from(value: ParseIntError) -> Self {
        DecodeError::FieldParse(format!("Invalid integer: {}", value))
    }
}

impl From<ParseFloatError> for DecodeError {
    fn from(value: ParseFloatError) -> Self {
        DecodeError::FieldParse(format!("Invalid number: {}", value))
    }
}

impl From<hex::FromHexError> for DecodeError {
    fn from(value: hex::FromHexError) -> Self {
        DecodeError::FieldParse(format!("Invalid hex: {}", value))
    }
}

impl From<chrono::ParseError> for DecodeError {
    fn from(value: chrono::ParseError) -> Self {
        DecodeError::FieldParse(format!("Invalid timestamp: {}", value))
    }
}

#[test]
fn connection_gone_classification() {
    let reset = DecodeError::Io(io::Error::from(ErrorKind::ConnectionReset));
    assert!(reset.is_connection_gone());
    let eof = DecodeError::Io(io::Error::from(ErrorKind::UnexpectedEof));
    assert!(eof.is_connection_gone());
    assert!(!DecodeError::framing("bad start bits").is_connection_gone());
    assert!(!DecodeError::Io(io::Error::from(ErrorKind::TimedOut)).is_connection_gone());
}
