//! Huabao protocol, a JT/T 808 dialect with BCD terminal numbers and byte stuffing.
//!
//! After removing the escaping (see [crate::escape]) a frame reads
//!
//! ```text
//! 7E | MSG ID (2) | PROPS (2) | TERMINAL BCD (6) | SEQ (2) | BODY | XOR (1) | 7E
//! ```
//!
//! The trailing XOR is read but only checked when
//! [DecoderOptions::verify_checksum] is set, since deployed devices are known
//! to be sloppy about it.
use std::io::{self, Write};

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::checksum::xor;
use crate::error::DecodeError;
use crate::escape::{DELIMITER, escape_into, unescape};
use crate::protocol::{CanonicalRecord, DecoderOptions, FrameDecoder, Packet};

pub const MSG_HEARTBEAT: u16 = 0x0002;
pub const MSG_REGISTER: u16 = 0x0100;
pub const MSG_TERMINAL_AUTH: u16 = 0x0102;
pub const MSG_LOCATION_REPORT: u16 = 0x0200;
pub const MSG_GENERAL_RESPONSE: u16 = 0x8001;
pub const MSG_REGISTER_RESPONSE: u16 = 0x8100;

const HEADER_LEN: usize = 12;
const LOCATION_BASE_LEN: usize = 28;
/// province (2) and city (2)
const REGISTER_RESERVED_LEN: usize = 4;
const MANUFACTURER_LEN: usize = 5;
const MODEL_LEN: usize = 20;
const TERMINAL_ID_LEN: usize = 7;

const TAG_SIGNAL: u8 = 0x30;
const TAG_SATELLITES: u8 = 0x31;
/// LT-160
const TAG_BATTERY: u8 = 0xD4;
/// ML100G
const TAG_BATTERY_ALT: u8 = 0xE1;

const RESULT_SUCCESS: u8 = 0x00;

/// The device reports local time in China Standard Time.
const DEVICE_UTC_OFFSET_SECS: i32 = 8 * 60 * 60;

/// Message properties: body length and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Properties(u16);

impl Properties {
    pub fn body_len(self) -> usize {
        usize::from(self.0 & 0x03FF)
    }

    pub fn encrypted(self) -> bool {
        (self.0 >> 10) & 0b11 != 0
    }

    pub fn sub_packaged(self) -> bool {
        (self.0 >> 13) & 1 == 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    message_type: u16,
    properties: Properties,
    terminal: [u8; 6],
    sequence: u16,
}

impl Header {
    fn parse(bytes: &[u8]) -> Header {
        Header {
            message_type: u16::from_be_bytes([bytes[0], bytes[1]]),
            properties: Properties(u16::from_be_bytes([bytes[2], bytes[3]])),
            terminal: [bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9]],
            sequence: u16::from_be_bytes([bytes[10], bytes[11]]),
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.message_type.to_be_bytes());
        out.extend_from_slice(&self.properties.0.to_be_bytes());
        out.extend_from_slice(&self.terminal);
        out.extend_from_slice(&self.sequence.to_be_bytes());
    }

    pub fn message_type(&self) -> u16 {
        self.message_type
    }

    pub fn properties(&self) -> Properties {
        self.properties
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// The terminal number as 12 decimal digits.
    pub fn terminal(&self) -> String {
        hex::encode(self.terminal)
    }
}

/// The status bitfield of a location report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusFlags(u32);

impl StatusFlags {
    pub fn acc_on(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn positioned(self) -> bool {
        self.0 & 2 != 0
    }

    pub fn south(self) -> bool {
        self.0 & 4 != 0
    }

    pub fn west(self) -> bool {
        self.0 & 8 != 0
    }
}

/// Terminal details announced by a register frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TerminalInfo {
    manufacturer: String,
    model: String,
    terminal_id: String,
}

impl TerminalInfo {
    fn parse(body: &[u8]) -> Result<TerminalInfo, DecodeError> {
        let needed = REGISTER_RESERVED_LEN + MANUFACTURER_LEN + MODEL_LEN + TERMINAL_ID_LEN;
        if body.len() < needed {
            return Err(DecodeError::field(format!(
                "register body needs {} bytes, got {}",
                needed,
                body.len()
            )));
        }
        let rest = &body[REGISTER_RESERVED_LEN..];
        let (manufacturer, rest) = rest.split_at(MANUFACTURER_LEN);
        let (model, rest) = rest.split_at(MODEL_LEN);
        let terminal_id = &rest[..TERMINAL_ID_LEN];
        Ok(TerminalInfo {
            manufacturer: padded_text(manufacturer),
            model: padded_text(model),
            terminal_id: padded_text(terminal_id),
        })
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn terminal_id(&self) -> &str {
        &self.terminal_id
    }
}

fn padded_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocationReport {
    alarm: u32,
    status: StatusFlags,
    timestamp: DateTime<FixedOffset>,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    speed: f64,
    heading: f64,
    signal: Option<f64>,
    satellites: Option<u32>,
    battery: Option<f64>,
}

impl LocationReport {
    fn parse(body: &[u8]) -> Result<LocationReport, DecodeError> {
        if body.len() < LOCATION_BASE_LEN {
            return Err(DecodeError::field(format!(
                "location report needs {} bytes, got {}",
                LOCATION_BASE_LEN,
                body.len()
            )));
        }
        let be32 = |at: usize| {
            u32::from_be_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]])
        };
        let be16 = |at: usize| u16::from_be_bytes([body[at], body[at + 1]]);

        let status = StatusFlags(be32(4));
        let mut latitude = f64::from(be32(8)) * 0.000001;
        let mut longitude = f64::from(be32(12)) * 0.000001;
        if status.south() {
            latitude = -latitude;
        }
        if status.west() {
            longitude = -longitude;
        }

        let mut report = LocationReport {
            alarm: be32(0),
            status,
            timestamp: parse_bcd_time(&body[22..28])?,
            latitude,
            longitude,
            altitude: f64::from(be16(16)),
            speed: f64::from(be16(18)) * 0.1,
            heading: f64::from(be16(20)),
            signal: None,
            satellites: None,
            battery: None,
        };
        report.parse_additional(&body[LOCATION_BASE_LEN..])?;
        Ok(report)
    }

    /// Walks the tag-length-value list that follows the base block.
    fn parse_additional(&mut self, mut data: &[u8]) -> Result<(), DecodeError> {
        while !data.is_empty() {
            let [tag, len, rest @ ..] = data else {
                return Err(DecodeError::field(
                    "truncated additional information header",
                ));
            };
            let len = usize::from(*len);
            let (value, remaining) = rest.split_at(len.min(rest.len()));
            match *tag {
                TAG_SIGNAL => self.signal = Some(f64::from(first_value(*tag, value)?)),
                TAG_SATELLITES => self.satellites = Some(u32::from(first_value(*tag, value)?)),
                TAG_BATTERY | TAG_BATTERY_ALT => {
                    self.battery = Some(f64::from(first_value(*tag, value)?))
                }
                other => {
                    if len > rest.len() {
                        log::debug!(
                            "Additional information {:#04x} declares {} bytes, only {} left",
                            other,
                            len,
                            rest.len()
                        );
                    }
                }
            }
            data = remaining;
        }
        Ok(())
    }

    pub fn alarm(&self) -> u32 {
        self.alarm
    }

    pub fn status(&self) -> StatusFlags {
        self.status
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn signal(&self) -> Option<f64> {
        self.signal
    }

    pub fn satellites(&self) -> Option<u32> {
        self.satellites
    }

    pub fn battery(&self) -> Option<f64> {
        self.battery
    }
}

fn first_value(tag: u8, value: &[u8]) -> Result<u8, DecodeError> {
    value.first().copied().ok_or_else(|| {
        DecodeError::field(format!("additional information {:#04x} has no value", tag))
    })
}

/// Decodes a `YYMMDDhhmmss` BCD timestamp in device local time.
fn parse_bcd_time(bytes: &[u8]) -> Result<DateTime<FixedOffset>, DecodeError> {
    let digits = hex::encode(bytes);
    let offset = FixedOffset::east_opt(DEVICE_UTC_OFFSET_SECS)
        .ok_or_else(|| DecodeError::field("invalid device offset"))?;
    NaiveDateTime::parse_from_str(&digits, "%y%m%d%H%M%S")?
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| DecodeError::field(format!("ambiguous timestamp {}", digits)))
}

#[derive(Clone, Debug, PartialEq)]
pub enum HuabaoMessage {
    Register(TerminalInfo),
    TerminalAuth,
    Heartbeat,
    LocationReport(LocationReport),
    /// A message type without special handling. Not acknowledged, not forwarded.
    Other(u16),
}

#[derive(Clone, Debug, PartialEq)]
pub struct HuabaoPacket {
    header: Header,
    checksum: u8,
    terminal_info: Option<TerminalInfo>,
    message: HuabaoMessage,
}

impl HuabaoPacket {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The checksum byte as it was received.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    pub fn message(&self) -> &HuabaoMessage {
        &self.message
    }

    /// Terminal details learned from the register frame on this connection.
    pub fn terminal_info(&self) -> Option<&TerminalInfo> {
        self.terminal_info.as_ref()
    }
}

impl Packet for HuabaoPacket {
    fn device(&self) -> String {
        self.header.terminal()
    }

    fn is_valid(&self) -> bool {
        matches!(self.message, HuabaoMessage::LocationReport(_))
    }

    fn wants_response(&self) -> bool {
        !matches!(self.message, HuabaoMessage::Other(_))
    }

    fn write_response(&self, writer: &mut impl Write) -> io::Result<()> {
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&self.header.sequence.to_be_bytes());
        let message_type = match &self.message {
            HuabaoMessage::Register(_) => {
                body.push(RESULT_SUCCESS);
                body.extend_from_slice(self.device().as_bytes());
                MSG_REGISTER_RESPONSE
            }
            HuabaoMessage::TerminalAuth
            | HuabaoMessage::Heartbeat
            | HuabaoMessage::LocationReport(_) => {
                body.extend_from_slice(&self.header.message_type.to_be_bytes());
                body.push(RESULT_SUCCESS);
                MSG_GENERAL_RESPONSE
            }
            HuabaoMessage::Other(_) => return Ok(()),
        };
        writer.write_all(&encode_frame(message_type, self.header.terminal, &body))
    }

    fn record(&self) -> Option<CanonicalRecord> {
        match &self.message {
            HuabaoMessage::LocationReport(report) => Some(CanonicalRecord {
                device_id: self.device(),
                timestamp: report.timestamp,
                latitude: report.latitude,
                longitude: report.longitude,
                heading: report.heading,
                speed: report.speed,
                altitude: Some(report.altitude),
                satellites: report.satellites,
                battery: report.battery,
                signal: report.signal,
                position_valid: report.status.positioned(),
                valid: true,
            }),
            _ => None,
        }
    }

    fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attributes = Vec::new();
        if let Some(info) = &self.terminal_info {
            attributes.push(("manufacturer", info.manufacturer.clone()));
            attributes.push(("model", info.model.clone()));
            attributes.push(("terminal_id", info.terminal_id.clone()));
        }
        if let HuabaoMessage::LocationReport(report) = &self.message {
            let acc = if report.status.acc_on() { "on" } else { "off" };
            attributes.push(("acc", acc.to_string()));
            if report.alarm != 0 {
                attributes.push(("alarm", format!("{:08x}", report.alarm)));
            }
        }
        attributes
    }
}

/// Builds a complete, escaped frame sent from the platform to a terminal.
/// Platform frames always carry sequence number zero.
pub fn encode_frame(message_type: u16, terminal: [u8; 6], body: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(HEADER_LEN + body.len() + 1);
    Header {
        message_type,
        // body length fits the 10 bit field for every platform message
        properties: Properties(body.len() as u16 & 0x03FF),
        terminal,
        sequence: 0,
    }
    .write_to(&mut inner);
    inner.extend_from_slice(body);
    inner.push(xor(&inner));

    let mut frame = Vec::with_capacity(inner.len() + 4);
    frame.push(DELIMITER);
    escape_into(&inner, &mut frame);
    frame.push(DELIMITER);
    frame
}

/// Decoder for one Huabao connection. Keeps the terminal details announced
/// by a register frame.
#[derive(Debug, Default)]
pub struct HuabaoDecoder {
    verify_checksum: bool,
    terminal_info: Option<TerminalInfo>,
}

impl FrameDecoder for HuabaoDecoder {
    const NAME: &'static str = "huabao";

    type Packet = HuabaoPacket;

    fn new(options: &DecoderOptions) -> Self {
        HuabaoDecoder {
            verify_checksum: options.verify_checksum,
            terminal_info: None,
        }
    }

    fn decode_frame(
        &mut self,
        buf: &[u8],
    ) -> Result<Option<(HuabaoPacket, usize)>, DecodeError> {
        let Some(first) = buf.first() else {
            return Ok(None);
        };
        if *first != DELIMITER {
            return Err(DecodeError::framing(format!("bad preamble {:#04x}", first)));
        }
        let Some(tail) = buf[1..].iter().position(|byte| *byte == DELIMITER) else {
            return Ok(None);
        };
        let tail = tail + 1;

        let inner = unescape(&buf[1..tail])?;
        if inner.len() < HEADER_LEN + 1 {
            return Err(DecodeError::framing(format!(
                "frame of {} bytes is too short",
                inner.len()
            )));
        }

        let header = Header::parse(&inner[..HEADER_LEN]);
        if header.properties.encrypted() {
            return Err(DecodeError::Unsupported("encryption".to_string()));
        }
        if header.properties.sub_packaged() {
            return Err(DecodeError::Unsupported("sub-packaging".to_string()));
        }
        let body_len = header.properties.body_len();
        if inner.len() != HEADER_LEN + body_len + 1 {
            return Err(DecodeError::framing(format!(
                "body length {} does not fit a frame of {} bytes",
                body_len,
                inner.len()
            )));
        }

        let (covered, checksum) = inner.split_at(inner.len() - 1);
        let checksum = checksum[0];
        if self.verify_checksum {
            let computed = xor(covered);
            if computed != checksum {
                return Err(DecodeError::Checksum {
                    expected: u16::from(checksum),
                    computed: u16::from(computed),
                });
            }
        }

        let body = &covered[HEADER_LEN..];
        let message = match header.message_type {
            MSG_REGISTER => {
                let info = TerminalInfo::parse(body)?;
                self.terminal_info = Some(info.clone());
                HuabaoMessage::Register(info)
            }
            MSG_TERMINAL_AUTH => HuabaoMessage::TerminalAuth,
            MSG_HEARTBEAT => HuabaoMessage::Heartbeat,
            MSG_LOCATION_REPORT => HuabaoMessage::LocationReport(LocationReport::parse(body)?),
            other => HuabaoMessage::Other(other),
        };

        let packet = HuabaoPacket {
            header,
            checksum,
            terminal_info: self.terminal_info.clone(),
            message,
        };
        Ok(Some((packet, tail + 1)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    const REGISTER: [u8; 60] = [
        0x7e, //
        0x01, 0x00, // message id
        0x00, 0x2d, // properties
        0x01, 0x91, 0x75, 0x69, 0x02, 0x32, // terminal
        0x00, 0x07, // sequence
        0x00, 0x22, 0x04, 0x4e, 0x37, 0x30, 0x34, 0x34, 0x34, 0x4d, 0x4c, 0x35, 0x30, 0x30, 0x5f,
        0x45, 0x44, 0x5f, 0x47, 0x54, 0x32, 0x35, 0x48, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x35,
        0x36, 0x39, 0x30, 0x32, 0x33, 0x32, 0x02, 0xd4, 0xc1, 0x42, 0x35, 0x37, 0x31, 0x39, 0x31,
        0xf2, // checksum
        0x7e,
    ];

    const AUTH: [u8; 27] = [
        0x7e, 0x01, 0x02, 0x00, 0x0c, 0x01, 0x91, 0x75, 0x69, 0x02, 0x32, 0x00, 0x09, 0x30, 0x31,
        0x39, 0x31, 0x37, 0x35, 0x36, 0x39, 0x30, 0x32, 0x33, 0x32, 0xbd, 0x7e,
    ];

    const LOCATION: [u8; 101] = [
        0x7e, 0x02, 0x00, 0x00, 0x56, 0x01, 0x91, 0x75, 0x69, 0x02, 0x32, 0x00, 0xb9, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x02, 0x9c, 0xfa, 0xee, 0x08, 0x1d, 0x81, 0x2c, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x24, 0x06, 0x04, 0x01, 0x28, 0x23, 0x01, 0x04, 0x00, 0x00,
        0x00, 0x65, 0x30, 0x01, 0x0f, 0x31, 0x01, 0x00, 0x51, 0x02, 0x00, 0x00, 0x57, 0x08, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x9f, 0x17, 0x35, 0x30, 0x35, 0x2c, 0x30, 0x31,
        0x2c, 0x37, 0x30, 0x30, 0x64, 0x2c, 0x30, 0x38, 0x63, 0x62, 0x34, 0x61, 0x32, 0x39, 0x2c,
        0x31, 0x35, 0xe1, 0x01, 0x64, 0xe2, 0x02, 0x00, 0x00, 0xf4, 0x7e,
    ];

    const ESCAPED_LOCATION: &str = "7e02000056019175690232007d010000000000000000000000000000000000000000000024060316074101040000000030011931010051020000570800000000000000009f173530352c30312c373030642c30386338353030322c3235e10164e2020000287e";

    fn device_time(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(DEVICE_UTC_OFFSET_SECS)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    fn decode_one(decoder: &mut HuabaoDecoder, data: &[u8]) -> HuabaoPacket {
        let (packet, used) = decoder.decode_frame(data).unwrap().unwrap();
        assert_eq!(used, data.len());
        packet
    }

    fn response(packet: &HuabaoPacket) -> Vec<u8> {
        let mut out = Vec::new();
        packet.write_response(&mut out).unwrap();
        out
    }

    #[test]
    fn register() {
        let mut decoder = HuabaoDecoder::default();
        let packet = decode_one(&mut decoder, &REGISTER);

        assert_eq!(packet.device(), "019175690232");
        let info = packet.terminal_info().unwrap();
        assert_eq!(info.manufacturer(), "70444");
        assert_eq!(info.model(), "ML500_ED_GT25H");
        assert_eq!(info.terminal_id(), "5690232");
        assert!(!packet.is_valid());
        assert!(packet.wants_response());
        assert!(packet.record().is_none());

        let expected = [
            0x7e, //
            0x81, 0x00, // message id
            0x00, 0x0f, // properties
            0x01, 0x91, 0x75, 0x69, 0x02, 0x32, // terminal
            0x00, 0x00, // sequence
            0x00, 0x07, // response sequence
            0x00, // status byte
            0x30, 0x31, 0x39, 0x31, 0x37, 0x35, 0x36, 0x39, 0x30, 0x32, 0x33, 0x32, //
            0x32, // checksum
            0x7e,
        ];
        assert_eq!(response(&packet), expected.to_vec());
    }

    #[test]
    fn terminal_auth() {
        let mut decoder = HuabaoDecoder::default();
        let packet = decode_one(&mut decoder, &AUTH);

        assert_eq!(packet.device(), "019175690232");
        assert_eq!(packet.message(), &HuabaoMessage::TerminalAuth);
        assert!(packet.terminal_info().is_none());
        assert!(!packet.is_valid());

        let expected = [
            0x7e, 0x80, 0x01, 0x00, 0x05, 0x01, 0x91, 0x75, 0x69, 0x02, 0x32, 0x00, 0x00, 0x00,
            0x09, 0x01, 0x02, 0x00, 0x32, 0x7e,
        ];
        assert_eq!(response(&packet), expected.to_vec());
    }

    #[test]
    fn location_report() {
        let mut decoder = HuabaoDecoder::default();
        let packet = decode_one(&mut decoder, &LOCATION);

        assert!(packet.is_valid());
        let record = packet.record().unwrap();
        assert_eq!(record.device_id(), "019175690232");
        assert_eq!(record.timestamp(), device_time(2024, 6, 4, 1, 28, 23));
        assert_eq!(record.latitude(), -43.842286);
        assert_eq!(record.longitude(), 136.15134);
        assert_eq!(record.altitude(), Some(0.0));
        assert_eq!(record.heading(), 0.0);
        assert_eq!(record.speed(), 0.0);
        assert!(!record.position_valid());
        assert_eq!(record.satellites(), Some(0));
        assert_eq!(record.signal(), Some(15.0));
        assert_eq!(record.battery(), Some(100.0));

        let expected = [
            0x7e, 0x80, 0x01, 0x00, 0x05, 0x01, 0x91, 0x75, 0x69, 0x02, 0x32, 0x00, 0x00, 0x00,
            0xb9, 0x02, 0x00, 0x00, 0x83, 0x7e,
        ];
        let out = response(&packet);
        assert_eq!(out.len(), 20);
        assert_eq!(out, expected.to_vec());
    }

    #[test]
    fn escaped_sequence_number() {
        let data = hex::decode(ESCAPED_LOCATION).unwrap();
        let mut decoder = HuabaoDecoder::default();
        let packet = decode_one(&mut decoder, &data);

        assert_eq!(packet.header().sequence(), 0x7d);
        let record = packet.record().unwrap();
        assert_eq!(record.timestamp(), device_time(2024, 6, 3, 16, 7, 41));
        assert_eq!(record.latitude(), 0.0);
        assert_eq!(record.longitude(), 0.0);
        assert_eq!(record.signal(), Some(25.0));
        assert_eq!(record.battery(), Some(100.0));

        // the response must escape the echoed sequence number again
        let out = response(&packet);
        assert_eq!(&out[13..16], &[0x00, 0x7d, 0x01]);
    }

    #[test]
    fn register_details_stick_to_the_connection() {
        let mut decoder = HuabaoDecoder::default();
        decode_one(&mut decoder, &REGISTER);
        let packet = decode_one(&mut decoder, &LOCATION);
        assert_eq!(packet.terminal_info().unwrap().model(), "ML500_ED_GT25H");
        assert!(packet.attributes().contains(&("manufacturer", "70444".to_string())));
    }

    #[test]
    fn checksum_is_not_verified_by_default() {
        let mut frame = LOCATION;
        frame[99] = 0x00;
        let mut decoder = HuabaoDecoder::default();
        let packet = decode_one(&mut decoder, &frame);
        assert_eq!(packet.checksum(), 0x00);
        assert!(packet.is_valid());
    }

    #[test]
    fn checksum_verification_toggle() {
        let options = DecoderOptions {
            verify_checksum: true,
            ..DecoderOptions::default()
        };
        let mut decoder = HuabaoDecoder::new(&options);
        decode_one(&mut decoder, &LOCATION);

        let mut frame = LOCATION;
        frame[99] = 0x00;
        assert!(matches!(
            decoder.decode_frame(&frame),
            Err(DecodeError::Checksum {
                expected: 0x00,
                computed: 0xf4
            })
        ));
    }

    #[test]
    fn encryption_and_sub_packaging_are_rejected() {
        let mut encrypted = AUTH;
        encrypted[3] |= 0x04;
        let mut decoder = HuabaoDecoder::default();
        assert!(matches!(
            decoder.decode_frame(&encrypted),
            Err(DecodeError::Unsupported(_))
        ));

        let mut split = AUTH;
        split[3] |= 0x20;
        assert!(matches!(
            decoder.decode_frame(&split),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn unknown_tags_are_skipped_by_length() {
        let mut body = LOCATION[13..41].to_vec();
        // unknown tag with a value that looks like the signal tag
        body.extend_from_slice(&[0x99, 0x03, 0x30, 0x01, 0x63]);
        body.extend_from_slice(&[0x31, 0x01, 0x07]);
        let report = LocationReport::parse(&body).unwrap();
        assert_eq!(report.signal(), None);
        assert_eq!(report.satellites(), Some(7));
    }

    #[test]
    fn overlong_unknown_tag_ends_the_walk() {
        let mut body = LOCATION[13..41].to_vec();
        body.extend_from_slice(&[0x30, 0x01, 0x11, 0xaa, 0x40, 0x01]);
        let report = LocationReport::parse(&body).unwrap();
        assert_eq!(report.signal(), Some(17.0));
    }

    #[test]
    fn sign_follows_status_flags_only() {
        let mut body = LOCATION[13..41].to_vec();
        body[7] = 0x08;
        let report = LocationReport::parse(&body).unwrap();
        assert_eq!(report.latitude(), 43.842286);
        assert_eq!(report.longitude(), -136.15134);
    }

    #[test]
    fn bad_preamble_and_length() {
        let mut decoder = HuabaoDecoder::default();
        assert!(matches!(
            decoder.decode_frame(&[0x7f, 0x00]),
            Err(DecodeError::Framing(_))
        ));

        let mut short = AUTH;
        short[4] = 0x0b;
        assert!(matches!(
            decoder.decode_frame(&short),
            Err(DecodeError::Framing(_))
        ));
    }

    #[test]
    fn incomplete_frame_waits_for_tail() {
        let mut decoder = HuabaoDecoder::default();
        assert!(decoder.decode_frame(&LOCATION[..50]).unwrap().is_none());
    }

    #[test]
    fn heartbeat_and_other_messages() {
        let heartbeat = hex::decode("7e000200000191756902320001bf7e").unwrap();
        let options = DecoderOptions {
            verify_checksum: true,
            ..DecoderOptions::default()
        };
        let mut decoder = HuabaoDecoder::new(&options);
        let packet = decode_one(&mut decoder, &heartbeat);
        assert_eq!(packet.message(), &HuabaoMessage::Heartbeat);
        assert!(packet.wants_response());
        assert!(!packet.is_valid());

        let other = encode_frame(0x0704, [0x01, 0x91, 0x75, 0x69, 0x02, 0x32], &[0x01]);
        let packet = decode_one(&mut decoder, &other);
        assert_eq!(packet.message(), &HuabaoMessage::Other(0x0704));
        assert!(!packet.wants_response());
        assert!(response(&packet).is_empty());
    }

    #[test]
    fn bcd_time_rejects_invalid_digits() {
        assert!(parse_bcd_time(&[0x24, 0x13, 0x04, 0x01, 0x28, 0x23]).is_err());
        assert!(parse_bcd_time(&[0x24, 0x0a, 0x04, 0x01, 0x28, 0x23]).is_err());
    }
}
