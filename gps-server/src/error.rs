use std::io;

use thiserror::Error;

/// Errors raised while applying protocol configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration for protocol {0}")]
    MissingSection(String),
    #[error("invalid configuration for protocol {protocol}: {message}")]
    Invalid { protocol: String, message: String },
}

/// Errors that end a protocol listener. Errors of a single connection never
/// show up here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unknown protocol {0}")]
    UnknownProtocol(String),
    #[error("protocol {0} has no listen address")]
    NoListenAddress(&'static str),
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
