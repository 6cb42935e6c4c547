/// Registry of open WebSocket sessions

use crate::errors::{DaemonError, DaemonResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// One open connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub client_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Connection registry
pub struct ConnectionRegistry {
    max_connections: usize,
    connections: DashMap<Uuid, ConnectionInfo>,
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        ConnectionRegistry {
            max_connections,
            connections: DashMap::new(),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register a new connection; the returned id doubles as the session id.
    pub fn register(&self, client_addr: SocketAddr) -> DaemonResult<Uuid> {
        let max = self.max_connections;
        self.active_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map_err(|n| {
                DaemonError::PoolError(format!("Connection limit reached ({} of {})", n, max))
            })?;

        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            ConnectionInfo {
                id,
                client_addr,
                connected_at: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Unregister a connection
    pub fn unregister(&self, id: &Uuid) {
        if self.connections.remove(id).is_some() {
            self.active_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|r| r.clone())
    }

    /// Get all active connections
    pub fn get_all(&self) -> Vec<ConnectionInfo> {
        self.connections.iter().map(|r| r.clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}
