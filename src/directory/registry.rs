use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::core::PeerInfo;

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub id: String,
    pub addr: String,
    pub last_seen: Instant,
}

/// The directory's membership table.
///
/// Reads (`peers_except`) share the lock; register, heartbeat and eviction
/// take it exclusively.
#[derive(Clone)]
pub struct Registry {
    peers: Arc<RwLock<HashMap<String, PeerRecord>>>,
    eviction_ttl: Duration,
}

impl Registry {
    pub fn new(eviction_ttl: Duration) -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            eviction_ttl,
        }
    }

    /// Upsert; a repeated id replaces the previous address.
    pub async fn register(&self, id: &str, addr: &str) {
        let mut peers = self.peers.write().await;
        let record = PeerRecord {
            id: id.to_string(),
            addr: addr.to_string(),
            last_seen: Instant::now(),
        };
        if let Some(previous) = peers.insert(id.to_string(), record) {
            debug!("Peer {} re-registered (was {})", id, previous.addr);
        }
        info!("Registered peer: {} ({})", id, addr);
    }

    /// Returns false for ids the table does not know; those are not added.
    pub async fn heartbeat(&self, id: &str) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get_mut(id) {
            Some(record) => {
                record.last_seen = Instant::now();
                true
            }
            None => {
                debug!("Heartbeat from unknown peer {} ignored", id);
                false
            }
        }
    }

    /// Every peer except `id`, in table iteration order.
    pub async fn peers_except(&self, id: &str) -> Vec<PeerInfo> {
        let peers = self.peers.read().await;
        peers
            .values()
            .filter(|record| record.id != id)
            .map(|record| PeerInfo::new(record.id.clone(), record.addr.clone()))
            .collect()
    }

    /// Drops every record idle for strictly longer than the TTL at `now`.
    pub async fn evict_expired(&self, now: Instant) -> Vec<String> {
        let mut peers = self.peers.write().await;

        let expired: Vec<String> = peers
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.last_seen) > self.eviction_ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            peers.remove(id);
            info!("Removed inactive peer: {}", id);
        }

        expired
    }

    pub async fn get(&self, id: &str) -> Option<PeerRecord> {
        self.peers.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
