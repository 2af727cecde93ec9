//! # GPS Gateway
//!
//! Terminates TCP connections from GPS trackers of several protocol families and publishes
//! every accepted report as one JSON line on standard output.
//!
//! ## Overview
//!
//! The gateway reads a TOML configuration file (see [`config::GatewayConfig`]). Every protocol
//! with a `[protocol.<name>]` section is started on its configured or default port, and only
//! devices with a `[meta."<device>"]` entry are accepted. All listeners feed one bounded
//! channel that is drained by the JSON lines sink.
mod config;
mod sink;

use std::future::Future;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use gps_server::error::ServerError;
use gps_server::registry::Registry;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::GatewayConfig;

#[derive(Parser)]
#[command(about = "Gateway that terminates GPS tracker connections and publishes decoded positions", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml", help = "Path to the configuration file")]
    config: PathBuf,

    #[arg(short, long, help = "Log at debug level unless RUST_LOG says otherwise")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();
    log::info!("Starting GPS gateway");

    let config = GatewayConfig::load(&args.config)?;
    let registry = Registry::builtin();

    let mut configured = Vec::new();
    for name in config.protocol.keys() {
        let listener = registry
            .setup(name, &config)
            .with_context(|| format!("cannot set up protocol {}", name))?;
        configured.push(listener);
    }
    if configured.is_empty() {
        anyhow::bail!(
            "no protocols configured in {}, known protocols are {}",
            args.config.display(),
            registry.names().collect::<Vec<_>>().join(", ")
        );
    }

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let mut listeners = JoinSet::new();
    for listener in configured {
        let protocol = listener.protocol();
        let run = listener.run(tx.clone());
        listeners.spawn(async move { (protocol, run.await) });
    }
    drop(tx);

    let meta = config.meta;
    let sink = tokio::spawn(async move {
        let mut out = tokio::io::stdout();
        sink::publish(rx, &meta, &mut out).await
    });

    supervise(listeners, sink, tokio::signal::ctrl_c()).await
}

type ListenerResult = (&'static str, Result<(), ServerError>);

/// Waits until a listener or the sink stops, which is fatal, or until `shutdown` completes.
async fn supervise(
    mut listeners: JoinSet<ListenerResult>,
    sink: JoinHandle<io::Result<()>>,
    shutdown: impl Future<Output = io::Result<()>>,
) -> anyhow::Result<()> {
    tokio::select! {
        Some(finished) = listeners.join_next() => {
            let (protocol, result) = finished.context("listener task panicked")?;
            result.with_context(|| format!("listener for {} failed", protocol))?;
            anyhow::bail!("listener for {} stopped", protocol)
        }
        published = sink => {
            published
                .context("publisher task panicked")?
                .context("cannot publish reports")?;
            anyhow::bail!("publisher stopped")
        }
        signal = shutdown => {
            signal.context("cannot listen for shutdown signal")?;
            log::info!("Shutting down");
            Ok(())
        }
    }
}
