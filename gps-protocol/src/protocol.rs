use std::fmt::Debug;
use std::io::{self, Write};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::error::DecodeError;

/// The protocol independent location record handed to the publisher.
///
/// Records are built by the decoders and are never modified afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub(crate) device_id: String,
    pub(crate) timestamp: DateTime<FixedOffset>,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) heading: f64,
    pub(crate) speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) satellites: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) battery: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) signal: Option<f64>,
    pub(crate) position_valid: bool,
    pub(crate) valid: bool,
}

impl CanonicalRecord {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The time the device took the fix, in the offset the device reports in.
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Signed decimal degrees, negative in the southern hemisphere.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Signed decimal degrees, negative in the western hemisphere.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Course over ground in degrees.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// Speed in km/h.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Altitude in meters, if the protocol reports one.
    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    pub fn satellites(&self) -> Option<u32> {
        self.satellites
    }

    /// Battery charge in percent.
    pub fn battery(&self) -> Option<f64> {
        self.battery
    }

    pub fn signal(&self) -> Option<f64> {
        self.signal
    }

    /// Whether the device had a satellite fix for this position.
    pub fn position_valid(&self) -> bool {
        self.position_valid
    }

    /// Whether this record is telemetry that should be forwarded.
    pub fn valid(&self) -> bool {
        self.valid
    }
}

/// Behaviour shared by the packets of every protocol.
pub trait Packet: Debug + Send + 'static {
    /// The identity checked against the whitelist.
    fn device(&self) -> String;

    /// An identity that is safe to use as a topic or key segment.
    fn mqtt_id(&self) -> String {
        self.device()
    }

    /// Whether the packet carries telemetry that should be forwarded.
    fn is_valid(&self) -> bool;

    /// Whether the device expects an acknowledgement for this packet.
    fn wants_response(&self) -> bool;

    /// Writes the acknowledgement for this packet. Writes nothing for packets
    /// that do not want a response.
    fn write_response(&self, writer: &mut impl Write) -> io::Result<()>;

    /// The location carried by the packet, if any.
    fn record(&self) -> Option<CanonicalRecord>;

    /// Protocol specific extras that have no place in [CanonicalRecord].
    fn attributes(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Tunables that decoders are created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// The largest incomplete frame that is buffered before giving up on the stream.
    pub max_frame_len: usize,
    /// Enforce the XOR checksum of protocols that do not enforce it by default.
    pub verify_checksum: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_frame_len: 4096,
            verify_checksum: false,
        }
    }
}

/// A per-connection decoder for one wire protocol.
///
/// A decoder lives as long as the connection it reads from, so it may keep
/// state that the protocol learns along the way, such as the device identity
/// announced by a login frame.
pub trait FrameDecoder: Send + Unpin + 'static {
    /// The name the protocol is registered and configured under.
    const NAME: &'static str;

    type Packet: Packet;

    fn new(options: &DecoderOptions) -> Self;

    /// Decodes the frame at the start of `buf`.
    ///
    /// Returns the packet and the number of bytes it occupied, or `None` when
    /// `buf` does not hold a complete frame yet.
    fn decode_frame(
        &mut self,
        buf: &[u8],
    ) -> Result<Option<(Self::Packet, usize)>, DecodeError>;
}
