//! # GPS Server Library
//!
//! This crate terminates TCP connections from GPS trackers, drives the decoders of the
//! [`gps_protocol`] crate and hands every accepted packet to a publisher as a [Report].
//!
//! ## Architecture
//!
//! - **[`server::Server`]**: accepts connections for one protocol and spawns one task per
//!   connection
//! - **[`session::Session`]**: the read loop of one connection. It checks the device against
//!   the [Whitelist], answers handshakes and forwards telemetry
//! - **[`registry::Registry`]**: maps protocol names to their decoders and default
//!   configuration
//! - **[`connections::ConnectionTable`]**: the open connections of a listener, for protocols
//!   that track them
//!
//! ## How It Works
//!
//! 1. A [Configuration] supplies the whitelist and the settings of every protocol
//! 2. [`registry::Registry::setup`] turns a protocol name into a ready to run
//!    [`registry::Listener`]
//! 3. The listener accepts connections and runs a session per connection
//! 4. Sessions push reports into a bounded channel. A full channel blocks the session, so a
//!    slow publisher slows down reading from devices instead of losing reports
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gps_protocol::watch::WatchDecoder;
//! use gps_server::server::Builder;
//!
//! # async fn run() -> Result<(), gps_server::error::ServerError> {
//! let (tx, mut rx) = tokio::sync::mpsc::channel(10);
//! let server = Builder::new()
//!     .listen("0.0.0.0:5093")
//!     .build::<WatchDecoder>(Arc::new(|device: &str| device == "3G*8800000015"));
//! tokio::spawn(async move {
//!     while let Some(report) = rx.recv().await {
//!         println!("{:?}", report);
//!     }
//! });
//! server.listen(tx).await
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Everything that goes wrong on one connection ends that connection only and is reported as
//! a [`session::SessionEnd`]. Devices never receive an error frame. Failing to bind or to
//! accept ends the listener with a [`error::ServerError`].
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics:
//! - Listener start, client connections and disconnections at info level
//! - Whitelist rejections at warn level
//! - Decode errors and failed handshakes at error level
//! - Decoded packets at debug level, raw frames at trace level
use std::sync::Arc;

pub mod connections;
pub mod error;
pub mod registry;
mod report;
pub mod server;
pub mod session;

pub use report::Report;

use error::ConfigError;
use server::Config;

/// Decides which devices may report through the gateway.
///
/// Implementations are shared by every session of every listener and are only read after
/// startup.
pub trait Whitelist: Send + Sync {
    fn allows(&self, device: &str) -> bool;
}

impl<F> Whitelist for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn allows(&self, device: &str) -> bool {
        self(device)
    }
}

/// Supplies listener settings and the whitelist.
pub trait Configuration {
    fn whitelist(&self) -> Arc<dyn Whitelist>;

    /// Overlays the configured settings for `protocol` onto `config`, which holds the
    /// protocol's defaults.
    ///
    /// Fails if the protocol is not configured at all.
    fn configure(&self, protocol: &str, config: &mut Config) -> Result<(), ConfigError>;
}
