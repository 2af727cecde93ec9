//! GT06 (Concox) binary protocol.
//!
//! ```text
//! 78 78 | LEN | PROTO | PAYLOAD (LEN - 5) | SEQ (2) | CRC (2) | 0D 0A
//! ```
//!
//! `LEN` counts everything from `PROTO` through `CRC`. The CRC covers `LEN`
//! through `SEQ`. Every frame is acknowledged by echoing its protocol number
//! and sequence number.
use std::io::{self, Write};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};

use crate::checksum::crc16_itu;
use crate::error::DecodeError;
use crate::protocol::{CanonicalRecord, DecoderOptions, FrameDecoder, Packet};

const START: [u8; 2] = [0x78, 0x78];
const STOP: [u8; 2] = [0x0D, 0x0A];

pub const PROTO_LOGIN: u8 = 0x01;
pub const PROTO_LOCATION: u8 = 0x12;
pub const PROTO_STATUS: u8 = 0x13;
pub const PROTO_ALARM: u8 = 0x16;

/// PROTO, SEQ and CRC
const MIN_LEN: usize = 5;
const LOCATION_BLOCK_LEN: usize = 18;

const STATUS_ACC: u16 = 0x8000;
const STATUS_POSITIONED: u16 = 0x1000;
const STATUS_WEST: u16 = 0x0800;
const STATUS_NORTH: u16 = 0x0400;
const STATUS_COURSE: u16 = 0x03FF;

/// The fixed width GPS block shared by location and alarm frames.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationBlock {
    timestamp: DateTime<FixedOffset>,
    satellites: u8,
    latitude: f64,
    longitude: f64,
    speed: u8,
    course_status: u16,
}

impl LocationBlock {
    fn parse(payload: &[u8]) -> Result<LocationBlock, DecodeError> {
        if payload.len() < LOCATION_BLOCK_LEN {
            return Err(DecodeError::field(format!(
                "location block needs {} bytes, got {}",
                LOCATION_BLOCK_LEN,
                payload.len()
            )));
        }
        let timestamp = Self::parse_timestamp(&payload[..6])?;
        let raw_latitude = u32::from_be_bytes([payload[7], payload[8], payload[9], payload[10]]);
        let raw_longitude =
            u32::from_be_bytes([payload[11], payload[12], payload[13], payload[14]]);
        let course_status = u16::from_be_bytes([payload[16], payload[17]]);

        let latitude = f64::from(raw_latitude) / 30000.0 / 60.0;
        let longitude = f64::from(raw_longitude) / 30000.0 / 60.0;
        Ok(LocationBlock {
            timestamp,
            satellites: payload[6] & 0x0F,
            latitude: if course_status & STATUS_NORTH != 0 {
                latitude
            } else {
                -latitude
            },
            longitude: if course_status & STATUS_WEST != 0 {
                -longitude
            } else {
                longitude
            },
            speed: payload[15],
            course_status,
        })
    }

    /// Date and time are sent as plain binary values in UTC, the year
    /// relative to the current century.
    fn parse_timestamp(bytes: &[u8]) -> Result<DateTime<FixedOffset>, DecodeError> {
        let century = Utc::now().year() / 100 * 100;
        NaiveDate::from_ymd_opt(
            century + i32::from(bytes[0]),
            u32::from(bytes[1]),
            u32::from(bytes[2]),
        )
        .and_then(|date| {
            date.and_hms_opt(
                u32::from(bytes[3]),
                u32::from(bytes[4]),
                u32::from(bytes[5]),
            )
        })
        .map(|time| time.and_utc().fixed_offset())
        .ok_or_else(|| DecodeError::field(format!("invalid date and time {:02x?}", bytes)))
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

    pub fn satellites(&self) -> u8 {
        self.satellites
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn heading(&self) -> u16 {
        self.course_status & STATUS_COURSE
    }

    pub fn position_valid(&self) -> bool {
        self.course_status & STATUS_POSITIONED != 0
    }

    pub fn acc_on(&self) -> bool {
        self.course_status & STATUS_ACC != 0
    }

    fn to_record(&self, device_id: &str, valid: bool) -> CanonicalRecord {
        CanonicalRecord {
            device_id: device_id.to_string(),
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            heading: f64::from(self.heading()),
            speed: f64::from(self.speed),
            altitude: None,
            satellites: Some(u32::from(self.satellites)),
            battery: None,
            signal: None,
            position_valid: self.position_valid(),
            valid,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Gt06Message {
    Login,
    Location(LocationBlock),
    // TODO: surface alarm frames once the publisher has a topic for alarms.
    Alarm(LocationBlock),
    Status,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Gt06Packet {
    device_id: String,
    protocol: u8,
    sequence: u16,
    message: Gt06Message,
}

impl Gt06Packet {
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn message(&self) -> &Gt06Message {
        &self.message
    }

    fn location(&self) -> Option<&LocationBlock> {
        match &self.message {
            Gt06Message::Location(block) | Gt06Message::Alarm(block) => Some(block),
            Gt06Message::Login | Gt06Message::Status => None,
        }
    }
}

impl Packet for Gt06Packet {
    fn device(&self) -> String {
        self.device_id.clone()
    }

    fn is_valid(&self) -> bool {
        matches!(self.message, Gt06Message::Location(_))
    }

    fn wants_response(&self) -> bool {
        true
    }

    fn write_response(&self, writer: &mut impl Write) -> io::Result<()> {
        let [seq_hi, seq_lo] = self.sequence.to_be_bytes();
        let checked = [0x05, self.protocol, seq_hi, seq_lo];
        let [crc_hi, crc_lo] = crc16_itu(&checked).to_be_bytes();
        writer.write_all(&START)?;
        writer.write_all(&checked)?;
        writer.write_all(&[crc_hi, crc_lo])?;
        writer.write_all(&STOP)
    }

    fn record(&self) -> Option<CanonicalRecord> {
        self.location()
            .map(|block| block.to_record(&self.device_id, self.is_valid()))
    }

    fn attributes(&self) -> Vec<(&'static str, String)> {
        match self.location() {
            Some(block) => vec![("acc", if block.acc_on() { "on" } else { "off" }.to_string())],
            None => Vec::new(),
        }
    }
}

/// Decoder for one GT06 connection. Remembers the identity announced by the
/// login frame and stamps it on every later packet.
#[derive(Debug, Default)]
pub struct Gt06Decoder {
    device_id: Option<String>,
}

impl Gt06Decoder {
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Lowercase hex of the login payload with one leading zero removed.
    fn login_identity(payload: &[u8]) -> String {
        let id = hex::encode(payload);
        match id.strip_prefix('0') {
            Some(stripped) => stripped.to_string(),
            None => id,
        }
    }

    fn learn(&mut self, claimed: String) -> Result<(), DecodeError> {
        match &self.device_id {
            Some(learned) if *learned != claimed => Err(DecodeError::IdentityConflict {
                learned: learned.clone(),
                claimed,
            }),
            Some(_) => Ok(()),
            None => {
                log::debug!("Learned device identity {}", claimed);
                self.device_id = Some(claimed);
                Ok(())
            }
        }
    }
}

impl FrameDecoder for Gt06Decoder {
    const NAME: &'static str = "gt06";

    type Packet = Gt06Packet;

    fn new(_options: &DecoderOptions) -> Self {
        Gt06Decoder::default()
    }

    fn decode_frame(&mut self, buf: &[u8]) -> Result<Option<(Gt06Packet, usize)>, DecodeError> {
        let start_len = buf.len().min(START.len());
        if buf[..start_len] != START[..start_len] {
            return Err(DecodeError::framing("unexpected start bits"));
        }
        if buf.len() < START.len() + 1 {
            return Ok(None);
        }

        let len = usize::from(buf[2]);
        if len < MIN_LEN {
            return Err(DecodeError::framing(format!("length {} is too short", len)));
        }
        let total = START.len() + 1 + len + STOP.len();
        if buf.len() < total {
            return Ok(None);
        }

        let frame = &buf[..total];
        if frame[total - 2..] != STOP {
            return Err(DecodeError::framing("unexpected stop bits"));
        }

        let expected = u16::from_be_bytes([frame[total - 4], frame[total - 3]]);
        let computed = crc16_itu(&frame[2..total - 4]);
        if expected != computed {
            return Err(DecodeError::Checksum { expected, computed });
        }

        let protocol = frame[3];
        let payload = &frame[4..total - 6];
        let sequence = u16::from_be_bytes([frame[total - 6], frame[total - 5]]);

        let message = match protocol {
            PROTO_LOGIN => {
                self.learn(Self::login_identity(payload))?;
                Gt06Message::Login
            }
            PROTO_LOCATION => Gt06Message::Location(LocationBlock::parse(payload)?),
            PROTO_ALARM => Gt06Message::Alarm(LocationBlock::parse(payload)?),
            PROTO_STATUS => Gt06Message::Status,
            other => {
                return Err(DecodeError::framing(format!(
                    "unknown protocol number {:#04x}",
                    other
                )));
            }
        };

        let packet = Gt06Packet {
            device_id: self.device_id.clone().unwrap_or_default(),
            protocol,
            sequence,
            message,
        };
        Ok(Some((packet, total)))
    }
}
