//! Bracketed text protocol spoken by a family of children's smart watches.
//!
//! ```text
//! [ COMPANY * DEVICE * LLLL * CONTENT ]
//! ```
//!
//! `LLLL` is the content length as four hex digits. The first two characters
//! of the content name the message type.
use std::io::{self, Write};

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::error::DecodeError;
use crate::protocol::{CanonicalRecord, DecoderOptions, FrameDecoder, Packet};
use crate::units::parse_finite;

const START: u8 = b'[';
const END: u8 = b']';
const SEPARATOR: u8 = b'*';

const TYPE_LINK: &str = "LK";
const TYPE_LOCATION: &str = "UD";

/// The devices report speed in miles per hour while calling it knots.
const SPEED_FACTOR: f64 = 1.60934;
const LOCATION_FIELDS: usize = 14;

#[derive(Clone, Debug, PartialEq)]
pub struct WatchLocation {
    timestamp: DateTime<FixedOffset>,
    position_valid: bool,
    latitude: f64,
    longitude: f64,
    speed: f64,
    heading: f64,
    altitude: f64,
    satellites: u32,
    signal: f64,
    battery: f64,
}

impl WatchLocation {
    fn parse(content: &str) -> Result<WatchLocation, DecodeError> {
        let fields: Vec<&str> = content.split(',').collect();
        if fields.len() < LOCATION_FIELDS {
            return Err(DecodeError::field(format!(
                "location update has {} fields, needs {}",
                fields.len(),
                LOCATION_FIELDS
            )));
        }

        let timestamp = NaiveDateTime::parse_from_str(
            &format!("{}{}", fields[1], fields[2]),
            "%d%m%y%H%M%S",
        )?
        .and_utc()
        .fixed_offset();

        let mut latitude = parse_finite(fields[4])?.abs();
        if fields[5].eq_ignore_ascii_case("S") {
            latitude = -latitude;
        }
        let mut longitude = parse_finite(fields[6])?.abs();
        if fields[7].eq_ignore_ascii_case("W") {
            longitude = -longitude;
        }

        Ok(WatchLocation {
            timestamp,
            position_valid: fields[3].eq_ignore_ascii_case("A"),
            latitude,
            longitude,
            speed: parse_finite(fields[8])? * SPEED_FACTOR,
            heading: parse_finite(fields[9])?,
            altitude: parse_finite(fields[10])?,
            satellites: fields[11].parse()?,
            signal: parse_finite(fields[12])?,
            battery: parse_finite(fields[13])?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WatchMessage {
    /// Link keeping, sent on connect and periodically after.
    Link,
    Location(WatchLocation),
    /// Any other message type, passed on without interpretation.
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WatchPacket {
    company: String,
    device_id: String,
    content_length: u16,
    content: String,
    message: WatchMessage,
}

impl WatchPacket {
    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn content_length(&self) -> u16 {
        self.content_length
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn message(&self) -> &WatchMessage {
        &self.message
    }
}

impl Packet for WatchPacket {
    /// Serial numbers are only unique per manufacturer.
    fn device(&self) -> String {
        format!("{}*{}", self.company, self.device_id)
    }

    fn mqtt_id(&self) -> String {
        format!("{}_{}", self.company, self.device_id)
    }

    fn is_valid(&self) -> bool {
        !matches!(self.message, WatchMessage::Link)
    }

    fn wants_response(&self) -> bool {
        matches!(self.message, WatchMessage::Link)
    }

    fn write_response(&self, writer: &mut impl Write) -> io::Result<()> {
        if !self.wants_response() {
            return Ok(());
        }
        write!(
            writer,
            "[{}*{}*0002*{}]",
            self.company, self.device_id, TYPE_LINK
        )
    }

    fn record(&self) -> Option<CanonicalRecord> {
        let WatchMessage::Location(location) = &self.message else {
            return None;
        };
        Some(CanonicalRecord {
            device_id: self.device(),
            timestamp: location.timestamp,
            latitude: location.latitude,
            longitude: location.longitude,
            heading: location.heading,
            speed: location.speed,
            altitude: Some(location.altitude),
            satellites: Some(location.satellites),
            battery: Some(location.battery),
            signal: Some(location.signal),
            position_valid: location.position_valid,
            valid: true,
        })
    }

    fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attributes = vec![("company", self.company.clone())];
        if let WatchMessage::Raw(kind) = &self.message {
            attributes.push(("type", kind.clone()));
            attributes.push(("content", self.content.clone()));
        }
        attributes
    }
}

#[derive(Debug, Default)]
pub struct WatchDecoder;

impl WatchDecoder {
    /// Only the header and `UD` contents have to be text. Other
    /// message types may carry binary payloads such as voice messages.
    fn parse(frame: &[u8]) -> Result<WatchPacket, DecodeError> {
        let mut parts = frame.splitn(4, |byte| *byte == SEPARATOR);
        let (Some(company), Some(device_id), Some(length), Some(content)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DecodeError::framing(format!(
                "bad packet {:?}",
                String::from_utf8_lossy(frame)
            )));
        };
        let company = std::str::from_utf8(company)?;
        let device_id = std::str::from_utf8(device_id)?;

        let content_length = match hex::decode(length) {
            Ok(bytes) if bytes.len() == 2 => u16::from_be_bytes([bytes[0], bytes[1]]),
            _ => {
                return Err(DecodeError::framing(format!(
                    "bad content length {:?}",
                    String::from_utf8_lossy(length)
                )));
            }
        };
        if content_length == 0 {
            return Err(DecodeError::framing("empty content"));
        }
        let Some(kind) = content.get(..2) else {
            return Err(DecodeError::framing(format!(
                "bad content {:?}",
                String::from_utf8_lossy(content)
            )));
        };

        let message = if kind == TYPE_LINK.as_bytes() {
            WatchMessage::Link
        } else if kind == TYPE_LOCATION.as_bytes() {
            WatchMessage::Location(WatchLocation::parse(std::str::from_utf8(content)?)?)
        } else {
            WatchMessage::Raw(String::from_utf8_lossy(kind).into_owned())
        };

        Ok(WatchPacket {
            company: company.to_string(),
            device_id: device_id.to_string(),
            content_length,
            content: String::from_utf8_lossy(content).into_owned(),
            message,
        })
    }
}

impl FrameDecoder for WatchDecoder {
    const NAME: &'static str = "watch";

    type Packet = WatchPacket;

    fn new(_options: &DecoderOptions) -> Self {
        WatchDecoder
    }

    fn decode_frame(&mut self, buf: &[u8]) -> Result<Option<(WatchPacket, usize)>, DecodeError> {
        let Some(first) = buf.first() else {
            return Ok(None);
        };
        if *first != START {
            return Err(DecodeError::framing(format!("bad preamble {:#04x}", first)));
        }
        let Some(end) = buf.iter().position(|byte| *byte == END) else {
            return Ok(None);
        };
        Ok(Some((Self::parse(&buf[1..end])?, end + 1)))
    }
}
