use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use gps_protocol::{DecoderOptions, FrameDecoder};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::connections::ConnectionTable;
use crate::error::ServerError;
use crate::session::{Session, SessionContext, SessionEnd};
use crate::{Report, Whitelist};

/// Settings of one protocol listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address to listen on. A protocol without one cannot be started.
    pub listen: Option<String>,
    /// Longest wait for the next frame before a connection is dropped.
    pub read_timeout: Duration,
    /// Longest wait for a handshake response to be written.
    pub write_timeout: Duration,
    pub max_frame_len: usize,
    /// Verify checksums that the protocol does not verify by default.
    pub verify_checksum: bool,
    /// Keep a [ConnectionTable] of the open connections.
    pub track_connections: bool,
}

impl Default for Config {
    fn default() -> Self {
        let decoder = DecoderOptions::default();
        Self {
            listen: None,
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(1),
            max_frame_len: decoder.max_frame_len,
            verify_checksum: decoder.verify_checksum,
            track_connections: false,
        }
    }
}

impl Config {
    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            max_frame_len: self.max_frame_len,
            verify_checksum: self.verify_checksum,
        }
    }
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use gps_protocol::huabao::HuabaoDecoder;
/// use gps_server::server::Builder;
///
/// let server = Builder::new()
///     .listen("127.0.0.1:5015")
///     .write_timeout(Duration::from_secs(2))
///     .track_connections(true)
///     .build::<HuabaoDecoder>(Arc::new(|_: &str| true));
/// assert!(server.connections().is_some());
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn from_config(config: Config) -> Builder {
        Builder { config }
    }

    pub fn listen(mut self, addr: impl Into<String>) -> Self {
        self.config.listen = Some(addr.into());
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the largest incomplete frame that is buffered per connection.
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    pub fn verify_checksum(mut self, verify: bool) -> Self {
        self.config.verify_checksum = verify;
        self
    }

    pub fn track_connections(mut self, track: bool) -> Self {
        self.config.track_connections = track;
        self
    }

    /// Return the configuration without building a server
    pub fn config(self) -> Config {
        self.config
    }

    /// Build and return the server
    pub fn build<D: FrameDecoder>(self, whitelist: Arc<dyn Whitelist>) -> Server<D> {
        Server::new(self.config, whitelist)
    }
}

/// Accepts connections for the protocol decoded by `D`.
pub struct Server<D> {
    config: Config,
    whitelist: Arc<dyn Whitelist>,
    connections: Option<ConnectionTable>,
    decoder: PhantomData<fn() -> D>,
}

impl<D: FrameDecoder> Server<D> {
    pub fn new(config: Config, whitelist: Arc<dyn Whitelist>) -> Server<D> {
        let connections = config.track_connections.then(ConnectionTable::new);
        Server {
            config,
            whitelist,
            connections,
            decoder: PhantomData,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The open connections, if this server tracks them.
    pub fn connections(&self) -> Option<&ConnectionTable> {
        self.connections.as_ref()
    }

    /// Bind the configured address and serve connections until accepting fails.
    pub async fn listen(&self, output: mpsc::Sender<Report>) -> Result<(), ServerError> {
        let addr = self
            .config
            .listen
            .as_deref()
            .ok_or(ServerError::NoListenAddress(D::NAME))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        self.serve(listener, output).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        output: mpsc::Sender<Report>,
    ) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(addr) => log::info!("Listening for {} connections on {}", D::NAME, addr),
            Err(_) => log::info!("Listening for {} connections", D::NAME),
        }

        loop {
            let (stream, peer) = listener.accept().await.map_err(ServerError::Accept)?;
            log::info!("New {} client connection from {}", D::NAME, peer);
            let local = match stream.local_addr() {
                Ok(local) => local,
                Err(err) => {
                    log::error!("Dropping connection from {}: {}", peer, err);
                    continue;
                }
            };

            let mut context = SessionContext::new(
                D::NAME,
                self.config.clone(),
                self.whitelist.clone(),
                output.clone(),
            );
            if let Some(connections) = &self.connections {
                connections.connected(peer, local).await;
                context = context.with_connections(connections.clone());
            }
            let connections = self.connections.clone();

            tokio::spawn(async move {
                let mut session = Session::<TcpStream, D>::new(stream, peer, context);
                match session.run().await {
                    SessionEnd::Closed => log::info!("Client {} disconnected", peer),
                    SessionEnd::TimedOut => log::info!("Client {} timed out", peer),
                    end => log::info!("Closed connection to {}: {}", peer, end),
                }
                if let Some(connections) = connections {
                    connections.disconnected(peer).await;
                }
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use gps_protocol::watch::WatchDecoder;

    fn allow_all() -> Arc<dyn Whitelist> {
        Arc::new(|_: &str| true)
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Builder::new()
            .listen("0.0.0.0:5023")
            .read_timeout(Duration::from_secs(30))
            .write_timeout(Duration::from_secs(60))
            .max_frame_len(512)
            .verify_checksum(true)
            .config();
        assert_eq!(config.listen.as_deref(), Some("0.0.0.0:5023"));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(60));
        assert!(!config.track_connections);
        assert_eq!(
            config.decoder_options(),
            DecoderOptions {
                max_frame_len: 512,
                verify_checksum: true
            }
        );
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.listen, None);
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.write_timeout, Duration::from_secs(1));
        assert_eq!(config.max_frame_len, 4096);
        assert!(!config.verify_checksum);
    }

    #[tokio::test]
    async fn listener_outlives_dropped_connections() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let server = Builder::new()
            .track_connections(true)
            .build::<WatchDecoder>(allow_all());
        let serving = tokio::spawn(async move { server.serve(listener, tx).await });

        for _ in 0..3 {
            drop(TcpStream::connect(addr).await.unwrap());
        }

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"[3G*1*0002*LK]").await.unwrap();
        let mut reply = [0; 14];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"[3G*1*0002*LK]");
        assert!(!serving.is_finished());
    }

    #[tokio::test]
    async fn listen_without_address() {
        let (tx, _rx) = mpsc::channel(1);
        let server = Builder::new().build::<WatchDecoder>(allow_all());
        assert!(matches!(
            server.listen(tx).await,
            Err(ServerError::NoListenAddress("watch"))
        ));
    }

    #[tokio::test]
    async fn listen_on_bad_address() {
        let (tx, _rx) = mpsc::channel(1);
        let server = Builder::new()
            .listen("not an address")
            .build::<WatchDecoder>(allow_all());
        assert!(matches!(
            server.listen(tx).await,
            Err(ServerError::Bind { .. })
        ));
    }
}
