//! The gateway configuration file.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gps_server::error::ConfigError;
use gps_server::server::Config;
use gps_server::{Configuration, Whitelist};
use serde::{Deserialize, Serialize};

const DEFAULT_CHANNEL_CAPACITY: usize = 10;

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Reports that may wait for the publisher before sessions block.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Settings per protocol. Only protocols listed here are started.
    #[serde(default)]
    pub protocol: BTreeMap<String, ProtocolSection>,
    /// Known devices by device key. Devices not listed here are rejected.
    #[serde(default)]
    pub meta: BTreeMap<String, DeviceMeta>,
}

/// Overrides for the defaults of one protocol.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSection {
    pub listen: Option<String>,
    pub read_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub max_frame_len: Option<usize>,
    pub verify_checksum: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Allows exactly the devices that have a `[meta]` entry.
#[derive(Debug)]
struct KnownDevices(BTreeSet<String>);

impl Whitelist for KnownDevices {
    fn allows(&self, device: &str) -> bool {
        self.0.contains(device)
    }
}

impl GatewayConfig {
    pub fn load(path: &Path) -> anyhow::Result<GatewayConfig> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config = GatewayConfig::parse(&text)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        log::debug!(
            "Loaded {} protocol sections and {} devices from {}",
            config.protocol.len(),
            config.meta.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<GatewayConfig> {
        let config: GatewayConfig = toml::from_str(text)?;
        if config.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be at least 1");
        }
        Ok(config)
    }
}

fn timeout(protocol: &str, key: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            protocol: protocol.to_string(),
            message: format!("{} must be at least one second", key),
        });
    }
    Ok(Duration::from_secs(secs))
}

impl Configuration for GatewayConfig {
    fn whitelist(&self) -> Arc<dyn Whitelist> {
        Arc::new(KnownDevices(self.meta.keys().cloned().collect()))
    }

    fn configure(&self, protocol: &str, config: &mut Config) -> Result<(), ConfigError> {
        let section = self
            .protocol
            .get(protocol)
            .ok_or_else(|| ConfigError::MissingSection(protocol.to_string()))?;

        if let Some(listen) = &section.listen {
            config.listen = Some(listen.clone());
        }
        if let Some(secs) = section.read_timeout_secs {
            config.read_timeout = timeout(protocol, "read_timeout_secs", secs)?;
        }
        if let Some(secs) = section.write_timeout_secs {
            config.write_timeout = timeout(protocol, "write_timeout_secs", secs)?;
        }
        if let Some(len) = section.max_frame_len {
            config.max_frame_len = len;
        }
        if let Some(verify) = section.verify_checksum {
            config.verify_checksum = verify;
        }
        Ok(())
    }
}
