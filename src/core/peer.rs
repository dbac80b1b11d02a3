use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::network::DiscoveredPeer;

/// A peer as other peers see it: an identity and a `host:port` to dial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub addr: String,
}

impl PeerInfo {
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
        }
    }

    pub fn from_socket(id: impl Into<String>, addr: SocketAddr) -> Self {
        Self::new(id, addr.to_string())
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.addr)
    }
}

impl From<DiscoveredPeer> for PeerInfo {
    fn from(peer: DiscoveredPeer) -> Self {
        Self::new(peer.id, peer.addr)
    }
}

/// Local view of who can be dialed.
///
/// The directory roster is replaced wholesale on each refresh; LAN-discovered
/// peers accumulate and are only overwritten by a newer announcement.
pub struct PeerManager {
    directory_peers: HashMap<String, PeerInfo>,
    discovered_peers: HashMap<String, PeerInfo>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self {
            directory_peers: HashMap::new(),
            discovered_peers: HashMap::new(),
        }
    }

    pub fn replace_directory_roster(&mut self, peers: Vec<PeerInfo>) {
        self.directory_peers = peers.into_iter().map(|p| (p.id.clone(), p)).collect();
        debug!("Directory roster now holds {} peers", self.directory_peers.len());
    }

    pub fn add_discovered_peer(&mut self, peer: PeerInfo) {
        if self.discovered_peers.get(&peer.id) != Some(&peer) {
            info!("Discovered peer on LAN: {}", peer);
            self.discovered_peers.insert(peer.id.clone(), peer);
        }
    }

    /// Directory entries take precedence over discovered ones.
    pub fn resolve(&self, peer_id: &str) -> Option<&PeerInfo> {
        self.directory_peers
            .get(peer_id)
            .or_else(|| self.discovered_peers.get(peer_id))
    }

    pub fn get_all_peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.directory_peers.values().cloned().collect();
        peers.extend(
            self.discovered_peers
                .values()
                .filter(|p| !self.directory_peers.contains_key(&p.id))
                .cloned(),
        );
        peers
    }

    pub fn peer_count(&self) -> usize {
        self.get_all_peers().len()
    }
}

impl Default for PeerManager {
    fn default() -> Self {
        Self::new()
    }
}
