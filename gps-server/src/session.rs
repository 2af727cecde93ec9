//! The read loop of a single device connection.
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use gps_protocol::codec::FrameCodec;
use gps_protocol::error::DecodeError;
use gps_protocol::{FrameDecoder, Packet};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use crate::connections::ConnectionTable;
use crate::server::Config;
use crate::{Report, Whitelist};

/// Where a session currently is in its read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    AwaitingFrame,
    Decoding,
    Responding,
    Forwarding,
    Rejected,
    Closing,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The device closed or reset the connection.
    Closed,
    /// The device is not on the whitelist.
    Rejected { device: String },
    /// No frame arrived within the read timeout.
    TimedOut,
    DecodeFailed(DecodeError),
    /// Nobody consumes reports anymore.
    OutputClosed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Closed => write!(f, "connection closed"),
            SessionEnd::Rejected { device } => write!(f, "device {:?} is not whitelisted", device),
            SessionEnd::TimedOut => write!(f, "read timed out"),
            SessionEnd::DecodeFailed(err) => write!(f, "{}", err),
            SessionEnd::OutputClosed => write!(f, "report channel closed"),
        }
    }
}

/// Everything a session shares with the listener that spawned it.
#[derive(Clone)]
pub struct SessionContext {
    protocol: &'static str,
    config: Config,
    whitelist: Arc<dyn Whitelist>,
    output: mpsc::Sender<Report>,
    connections: Option<ConnectionTable>,
}

impl SessionContext {
    pub fn new(
        protocol: &'static str,
        config: Config,
        whitelist: Arc<dyn Whitelist>,
        output: mpsc::Sender<Report>,
    ) -> SessionContext {
        SessionContext {
            protocol,
            config,
            whitelist,
            output,
            connections: None,
        }
    }

    /// Report accepted packets to `connections`.
    pub fn with_connections(mut self, connections: ConnectionTable) -> SessionContext {
        self.connections = Some(connections);
        self
    }
}

/// One device connection.
///
/// Frames are processed strictly in the order they arrive. For each frame the
/// session
///
/// 1. closes the connection if the device is not whitelisted, without responding
/// 2. writes the handshake response, if the packet wants one
/// 3. forwards the packet if it carries telemetry, waiting for room in the channel
pub struct Session<S, D: FrameDecoder> {
    framed: Framed<S, FrameCodec<D>>,
    peer: SocketAddr,
    context: SessionContext,
    state: SessionState,
}

impl<S, D> Session<S, D>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: FrameDecoder,
{
    pub fn new(stream: S, peer: SocketAddr, context: SessionContext) -> Session<S, D> {
        let codec = FrameCodec::new(&context.config.decoder_options());
        Session {
            framed: Framed::new(stream, codec),
            peer,
            context,
            state: SessionState::Connected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Runs the session until the connection ends.
    pub async fn run(&mut self) -> SessionEnd {
        let end = self.read_loop().await;
        if self.state != SessionState::Rejected {
            self.state = SessionState::Closing;
        }
        end
    }

    async fn read_loop(&mut self) -> SessionEnd {
        loop {
            self.state = SessionState::AwaitingFrame;
            let next = timeout(self.context.config.read_timeout, self.framed.next()).await;
            let packet = match next {
                Err(_) => return SessionEnd::TimedOut,
                Ok(None) => return SessionEnd::Closed,
                Ok(Some(Err(err))) if err.is_connection_gone() => return SessionEnd::Closed,
                Ok(Some(Err(err))) => {
                    log::error!(
                        "Failed to read {} packet from {}: {}",
                        self.context.protocol,
                        self.peer,
                        err
                    );
                    return SessionEnd::DecodeFailed(err);
                }
                Ok(Some(Ok(packet))) => packet,
            };

            self.state = SessionState::Decoding;
            log::debug!("Received packet from {}: {:?}", self.peer, packet);

            let device = packet.device();
            if !self.context.whitelist.allows(&device) {
                log::warn!(
                    "Device {:?} on {} is not whitelisted, closing connection",
                    device,
                    self.peer
                );
                self.state = SessionState::Rejected;
                return SessionEnd::Rejected { device };
            }

            let report = Report::new(self.context.protocol, &packet);
            if let Some(connections) = &self.context.connections {
                connections.packet(self.peer, report.clone()).await;
            }

            if packet.wants_response() {
                self.state = SessionState::Responding;
                let mut response = Vec::new();
                let written = packet.write_response(&mut response);
                match written {
                    Ok(()) => self.respond(response).await,
                    Err(err) => log::error!("Failed to build response: {}", err),
                }
            }

            if packet.is_valid() {
                self.state = SessionState::Forwarding;
                if self.context.output.send(report).await.is_err() {
                    return SessionEnd::OutputClosed;
                }
            }
        }
    }

    /// Writes a handshake response. Failures are logged and the session goes on.
    async fn respond(&mut self, response: Vec<u8>) {
        log::trace!("Sending response to {}: {:02x?}", self.peer, response);
        match timeout(self.context.config.write_timeout, self.framed.send(response)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::error!("Failed to finish handshake with {}: {}", self.peer, err),
            Err(_) => log::error!("Handshake with {} timed out", self.peer),
        }
    }
}
