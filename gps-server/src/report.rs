use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gps_protocol::{CanonicalRecord, Packet};
use serde::Serialize;

/// One accepted packet as handed to the publisher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    protocol: &'static str,
    mqtt_id: String,
    device: String,
    received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<CanonicalRecord>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<&'static str, String>,
}

impl Report {
    pub fn new<P: Packet>(protocol: &'static str, packet: &P) -> Report {
        Report {
            protocol,
            mqtt_id: packet.mqtt_id(),
            device: packet.device(),
            received_at: Utc::now(),
            record: packet.record(),
            attributes: packet.attributes().into_iter().collect(),
        }
    }

    /// Name of the protocol the packet arrived on.
    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// Identity that is safe to use in topic names.
    pub fn mqtt_id(&self) -> &str {
        &self.mqtt_id
    }

    /// Identity the whitelist was checked against.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn record(&self) -> Option<&CanonicalRecord> {
        self.record.as_ref()
    }

    pub fn attributes(&self) -> &BTreeMap<&'static str, String> {
        &self.attributes
    }
}
