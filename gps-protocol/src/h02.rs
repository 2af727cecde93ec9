//! H02 protocol. One port carries two sub-formats, told apart by the first byte:
//!
//! * `*` starts a comma separated text record terminated by `#`.
//! * `$` starts a fixed 50 byte binary record without terminator.
//!
//! Only the text location record is acknowledged.
use std::io::{self, Write};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::error::DecodeError;
use crate::protocol::{CanonicalRecord, DecoderOptions, FrameDecoder, Packet};
use crate::units::{KNOTS_TO_KMH, battery_percentage, ddm_to_degrees, parse_finite};

const ASCII_START: u8 = b'*';
const ASCII_END: u8 = b'#';
const BINARY_START: u8 = b'$';
const BINARY_LEN: usize = 50;

const CMD_LOCATION: &str = "V1";
const CMD_SIM_DATA: &str = "V19";

/// `[11]` is the last field a location record cannot do without.
const ASCII_REQUIRED_FIELDS: usize = 12;
const ASCII_BATTERY_FIELD: usize = 17;

const FLAG_VALID: u8 = 0b0010;
const FLAG_SOUTH: u8 = 0b0100;
const FLAG_WEST: u8 = 0b1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum H02Format {
    Ascii,
    Binary,
}

#[derive(Clone, Debug, PartialEq)]
pub struct H02Packet {
    format: H02Format,
    device_id: String,
    timestamp: DateTime<FixedOffset>,
    latitude: f64,
    longitude: f64,
    speed: f64,
    heading: f64,
    position_valid: bool,
    battery: f64,
}

impl H02Packet {
    pub fn format(&self) -> H02Format {
        self.format
    }

    fn parse_ascii(record: &str) -> Result<H02Packet, DecodeError> {
        let fields: Vec<&str> = record.split(',').collect();
        if fields.len() < 3 {
            return Err(DecodeError::framing(format!("bad packet ({})", record)));
        }
        match (fields[0], fields[2]) {
            ("HQ", CMD_LOCATION) => {}
            ("HQ", CMD_SIM_DATA) => {
                return Err(DecodeError::Unsupported(format!(
                    "{}:{} packets",
                    fields[0], fields[2]
                )));
            }
            (prefix, command) => {
                return Err(DecodeError::framing(format!(
                    "bad packet ({}:{})",
                    prefix, command
                )));
            }
        }
        if fields.len() < ASCII_REQUIRED_FIELDS {
            return Err(DecodeError::field(format!(
                "location record has {} fields, needs {}",
                fields.len(),
                ASCII_REQUIRED_FIELDS
            )));
        }

        let timestamp = parse_utc(&format!("{}{}", fields[11], fields[3]), "%d%m%y%H%M%S")?;
        let latitude = ddm_to_degrees(2, fields[5], fields[6].eq_ignore_ascii_case("S"))?;
        let longitude = ddm_to_degrees(3, fields[7], fields[8].eq_ignore_ascii_case("W"))?;
        let speed = parse_finite(fields[9])? * KNOTS_TO_KMH;
        let heading = match fields[10] {
            "" => 0.0,
            heading => parse_finite(heading)?,
        };
        let battery = match fields.get(ASCII_BATTERY_FIELD) {
            Some(code) if !code.is_empty() => battery_percentage(code.parse::<i64>()?),
            _ => 0.0,
        };

        Ok(H02Packet {
            format: H02Format::Ascii,
            device_id: fields[1].to_string(),
            timestamp,
            latitude,
            longitude,
            speed,
            heading,
            position_valid: fields[4].eq_ignore_ascii_case("A"),
            battery,
        })
    }

    fn parse_binary(data: &[u8]) -> Result<H02Packet, DecodeError> {
        let flags = data[20] & 0x0F;

        let timestamp = parse_utc(&hex::encode(&data[5..11]), "%H%M%S%y%m%d")?;

        let latitude = format!("{}.{}", hex::encode(&data[11..13]), hex::encode(&data[13..15]));
        let latitude = ddm_to_degrees(2, &latitude, flags & FLAG_SOUTH != 0)?;

        // the last nibble of the longitude bytes holds the flags
        let longitude = hex::encode(&data[16..21]);
        let longitude = format!("{}.{}", &longitude[..5], &longitude[5..9]);
        let longitude = ddm_to_degrees(3, &longitude, flags & FLAG_WEST != 0)?;

        let speed_heading = hex::encode(&data[21..24]);
        let speed = speed_heading[..3].parse::<f64>()? * KNOTS_TO_KMH;
        let heading = speed_heading[3..].parse::<f64>()?;

        Ok(H02Packet {
            format: H02Format::Binary,
            device_id: hex::encode(&data[..5]),
            timestamp,
            latitude,
            longitude,
            speed,
            heading,
            position_valid: flags & FLAG_VALID != 0,
            battery: battery_percentage(i64::from(data[15])),
        })
    }
}

fn parse_utc(text: &str, format: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    Ok(NaiveDateTime::parse_from_str(text, format)?
        .and_utc()
        .fixed_offset())
}

impl Packet for H02Packet {
    fn device(&self) -> String {
        self.device_id.clone()
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn wants_response(&self) -> bool {
        self.format == H02Format::Ascii
    }

    fn write_response(&self, writer: &mut impl Write) -> io::Result<()> {
        if !self.wants_response() {
            return Ok(());
        }
        write!(
            writer,
            "*HQ,{},V4,{},{}#",
            self.device_id,
            CMD_LOCATION,
            Utc::now().format("%Y%m%d%H%M%S")
        )
    }

    fn record(&self) -> Option<CanonicalRecord> {
        Some(CanonicalRecord {
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            speed: self.speed,
            altitude: None,
            satellites: None,
            battery: Some(self.battery),
            signal: None,
            position_valid: self.position_valid,
            valid: true,
        })
    }

    fn attributes(&self) -> Vec<(&'static str, String)> {
        let format = match self.format {
            H02Format::Ascii => "ascii",
            H02Format::Binary => "binary",
        };
        vec![("format", format.to_string())]
    }
}

#[derive(Debug, Default)]
pub struct H02Decoder;

impl FrameDecoder for H02Decoder {
    const NAME: &'static str = "h02";

    type Packet = H02Packet;

    fn new(_options: &DecoderOptions) -> Self {
        H02Decoder
    }

    fn decode_frame(&mut self, buf: &[u8]) -> Result<Option<(H02Packet, usize)>, DecodeError> {
        match buf.first() {
            None => Ok(None),
            Some(&ASCII_START) => {
                let Some(end) = buf.iter().position(|byte| *byte == ASCII_END) else {
                    return Ok(None);
                };
                let record = std::str::from_utf8(&buf[1..end])?;
                Ok(Some((H02Packet::parse_ascii(record)?, end + 1)))
            }
            Some(&BINARY_START) => {
                if buf.len() < 1 + BINARY_LEN {
                    return Ok(None);
                }
                let packet = H02Packet::parse_binary(&buf[1..=BINARY_LEN])?;
                Ok(Some((packet, 1 + BINARY_LEN)))
            }
            Some(other) => Err(DecodeError::framing(format!(
                "unrecognized leading byte {:#04x}",
                other
            ))),
        }
    }
}
