//! # GPS Tracker Protocols
//!
//! This crate decodes the wire protocols spoken by several families of vehicle and personal GPS
//! trackers, and produces the acknowledgements the devices wait for before they keep reporting.
//!
//! ## Overview
//!
//! Every protocol is implemented as a [FrameDecoder]. A decoder is created per connection, is
//! fed the bytes received so far and hands back one packet per complete frame. Packets of every
//! protocol implement [Packet], which exposes
//!
//! - the device identity that is checked against a whitelist
//! - whether the packet carries telemetry that should be forwarded
//! - whether the device waits for a response, and the response itself
//! - the decoded location as a protocol independent [CanonicalRecord]
//!
//! ## Protocols
//!
//! | Module     | Devices                  | Framing                                        |
//! |------------|--------------------------|------------------------------------------------|
//! | [gt06]     | Concox GT06 and clones   | binary, length prefixed, CRC-16/X-25           |
//! | [huabao]   | JT/T 808 style terminals | binary/BCD, byte stuffed, XOR checksum         |
//! | [h02]      | H02 trackers             | `*...#` text records and 50 byte `$` records   |
//! | [watch]    | Smart watches            | `[company*device*length*content]` text frames  |
//!
//! ## Basic Usage
//!
//! ```
//! use gps_protocol::{DecoderOptions, FrameDecoder, Packet};
//! use gps_protocol::watch::WatchDecoder;
//!
//! let mut decoder = WatchDecoder::new(&DecoderOptions::default());
//! let (packet, used) = decoder
//!     .decode_frame(b"[3G*8800000015*0002*LK]")
//!     .expect("Frame should decode")
//!     .expect("Frame is complete");
//! assert_eq!(used, 23);
//! assert_eq!(packet.device(), "3G*8800000015");
//!
//! let mut response = Vec::new();
//! packet.write_response(&mut response).expect("Writing to vector shouldn't fail");
//! assert_eq!(response, b"[3G*8800000015*0002*LK]");
//! ```
//!
//! Decoders return `Ok(None)` until a frame is complete:
//!
//! ```
//! use gps_protocol::{DecoderOptions, FrameDecoder};
//! use gps_protocol::gt06::Gt06Decoder;
//!
//! let mut decoder = Gt06Decoder::new(&DecoderOptions::default());
//! assert!(decoder.decode_frame(&[0x78, 0x78, 0x0d, 0x01]).unwrap().is_none());
//! ```
//!
//! ## Async I/O
//!
//! With the `tokio` feature enabled, `codec::FrameCodec` wraps any decoder in a
//! `tokio_util::codec` decoder/encoder pair, ready to be used with `Framed`.
//!
//! ## Error Handling
//!
//! All decoding failures are reported as [`error::DecodeError`]. None of them are recoverable
//! for the connection that produced them.

pub mod protocol;
pub use protocol::*;
pub mod checksum;
#[cfg(feature = "tokio")]
pub mod codec;
pub mod error;
pub mod escape;
pub mod gt06;
pub mod h02;
pub mod huabao;
pub mod units;
pub mod watch;
