//! Helpers for running listeners on loopback sockets.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gps_protocol::FrameDecoder;
use gps_server::connections::ConnectionTable;
use gps_server::server::Builder;
use gps_server::{Report, Whitelist};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Upper bound for anything a test waits on.
pub const PATIENCE: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub reports: mpsc::Receiver<Report>,
    pub connections: Option<ConnectionTable>,
}

impl TestServer {
    /// Serves `D` on an ephemeral loopback port.
    pub async fn start<D: FrameDecoder>(
        builder: Builder,
        whitelist: impl Whitelist + 'static,
    ) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = builder.build::<D>(Arc::new(whitelist));
        let connections = server.connections().cloned();
        let (tx, reports) = mpsc::channel(16);
        tokio::spawn(async move { server.serve(listener, tx).await });
        TestServer {
            addr,
            reports,
            connections,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    pub async fn next_report(&mut self) -> Report {
        timeout(PATIENCE, self.reports.recv())
            .await
            .expect("no report in time")
            .expect("report channel closed")
    }
}

pub async fn send_hex(stream: &mut TcpStream, frame: &str) {
    stream.write_all(&hex::decode(frame).unwrap()).await.unwrap();
}

pub async fn read_hex(stream: &mut TcpStream, len: usize) -> String {
    let mut buf = vec![0; len];
    timeout(PATIENCE, stream.read_exact(&mut buf))
        .await
        .expect("no response in time")
        .unwrap();
    hex::encode(buf)
}

/// Reads until the server closes the connection.
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    timeout(PATIENCE, stream.read_to_end(&mut buf))
        .await
        .expect("connection was not closed in time")
        .unwrap();
    buf
}
