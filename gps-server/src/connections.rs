use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Report;

#[derive(Debug, Clone)]
struct ConnectionStatus {
    local: SocketAddr,
    connected_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    last_report: Option<Report>,
}

/// A point in time copy of one entry of a [ConnectionTable].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_report: Option<Report>,
}

/// The currently open connections of one listener, keyed by peer address.
///
/// Entries are added on accept, refreshed with every accepted packet and
/// removed when the session ends. Cloning the table shares it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    connections: Arc<RwLock<HashMap<SocketAddr, ConnectionStatus>>>,
}

impl ConnectionTable {
    pub fn new() -> ConnectionTable {
        ConnectionTable::default()
    }

    pub async fn connected(&self, remote: SocketAddr, local: SocketAddr) {
        let now = Utc::now();
        self.connections.write().await.insert(
            remote,
            ConnectionStatus {
                local,
                connected_at: now,
                last_seen: now,
                last_report: None,
            },
        );
    }

    /// Records a packet that passed the whitelist.
    pub async fn packet(&self, remote: SocketAddr, report: Report) {
        if let Some(status) = self.connections.write().await.get_mut(&remote) {
            status.last_seen = report.received_at();
            status.last_report = Some(report);
        }
    }

    pub async fn disconnected(&self, remote: SocketAddr) {
        self.connections.write().await.remove(&remote);
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// All entries, ordered by peer address.
    pub async fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let mut snapshot: Vec<_> = self
            .connections
            .read()
            .await
            .iter()
            .map(|(remote, status)| ConnectionSnapshot {
                local: status.local,
                remote: *remote,
                connected_at: status.connected_at,
                last_seen: status.last_seen,
                last_report: status.last_report.clone(),
            })
            .collect();
        snapshot.sort_by_key(|entry| entry.remote);
        snapshot
    }
}
