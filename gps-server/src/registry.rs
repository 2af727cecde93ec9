//! Protocol name to decoder mapping used at startup.
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use gps_protocol::FrameDecoder;
use gps_protocol::gt06::Gt06Decoder;
use gps_protocol::h02::H02Decoder;
use gps_protocol::huabao::HuabaoDecoder;
use gps_protocol::watch::WatchDecoder;
use tokio::sync::mpsc;

use crate::error::ServerError;
use crate::server::{Builder, Config, Server};
use crate::{Configuration, Report, Whitelist};

pub type ListenerFuture = Pin<Box<dyn Future<Output = Result<(), ServerError>> + Send>>;

type Launch = Box<dyn FnOnce(mpsc::Sender<Report>) -> ListenerFuture + Send>;

/// A configured protocol listener, ready to run.
pub struct Listener {
    protocol: &'static str,
    config: Config,
    launch: Launch,
}

impl Listener {
    fn new<D: FrameDecoder>(config: Config, whitelist: Arc<dyn Whitelist>) -> Listener {
        let server = Server::<D>::new(config.clone(), whitelist);
        Listener {
            protocol: D::NAME,
            config,
            launch: Box::new(move |output| Box::pin(async move { server.listen(output).await })),
        }
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Binds and serves until accepting a connection fails.
    pub fn run(self, output: mpsc::Sender<Report>) -> ListenerFuture {
        (self.launch)(output)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("protocol", &self.protocol)
            .field("config", &self.config)
            .finish()
    }
}

/// A registered protocol: its decoder and its default settings.
#[derive(Debug)]
pub struct ProtocolFamily {
    name: &'static str,
    defaults: Config,
    listener: fn(Config, Arc<dyn Whitelist>) -> Listener,
}

impl ProtocolFamily {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn defaults(&self) -> &Config {
        &self.defaults
    }

    /// Applies `configuration` on top of the defaults and creates the listener.
    pub fn setup(&self, configuration: &dyn Configuration) -> Result<Listener, ServerError> {
        let mut config = self.defaults.clone();
        configuration.configure(self.name, &mut config)?;
        if config.listen.is_none() {
            return Err(ServerError::NoListenAddress(self.name));
        }
        log::debug!("Configured {}: {:?}", self.name, config);
        Ok((self.listener)(config, configuration.whitelist()))
    }
}

/// The protocols the gateway knows how to serve.
#[derive(Debug, Default)]
pub struct Registry {
    families: BTreeMap<&'static str, ProtocolFamily>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// A registry with every protocol of [gps_protocol] and its default ports.
    pub fn builtin() -> Registry {
        let mut registry = Registry::new();
        registry
            .register::<Gt06Decoder>(
                Builder::new()
                    .listen("0.0.0.0:5023")
                    .write_timeout(Duration::from_secs(60))
                    .config(),
            )
            .register::<HuabaoDecoder>(
                Builder::new()
                    .listen("0.0.0.0:5015")
                    .track_connections(true)
                    .config(),
            )
            .register::<H02Decoder>(Builder::new().config())
            .register::<WatchDecoder>(Builder::new().listen("0.0.0.0:5093").config());
        registry
    }

    /// Registers `D` under its name, replacing an earlier registration.
    pub fn register<D: FrameDecoder>(&mut self, defaults: Config) -> &mut Registry {
        self.families.insert(
            D::NAME,
            ProtocolFamily {
                name: D::NAME,
                defaults,
                listener: Listener::new::<D>,
            },
        );
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.families.keys().copied()
    }

    pub fn get(&self, name: &str) -> Option<&ProtocolFamily> {
        self.families.get(name)
    }

    pub fn setup(
        &self,
        name: &str,
        configuration: &dyn Configuration,
    ) -> Result<Listener, ServerError> {
        self.get(name)
            .ok_or_else(|| ServerError::UnknownProtocol(name.to_string()))?
            .setup(configuration)
    }
}
