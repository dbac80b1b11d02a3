//! LAN presence broadcast.
//!
//! Each peer floods `PING:<ip>:<port>` to the broadcast address at a fixed
//! interval and listens on the same port for everyone else's pings. There is
//! no convergence protocol and no dedup; consumers merge what they receive.

use log::{debug, info, warn};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

use crate::utils::{NetUtils, P2PError, Result};

pub const DEFAULT_DISCOVERY_PORT: u16 = 9998;
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(5);
const PING_PREFIX: &str = "PING:";
const RECV_BUFFER_SIZE: usize = 1024;

/// A peer heard on the LAN. `id` is the datagram's source address, `addr`
/// the `host:port` it announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub id: String,
    pub addr: String,
}

pub struct Discovery {
    local_addr: String,
    bind_addr: SocketAddr,
    target: SocketAddr,
    interval: Duration,
}

impl Discovery {
    /// `local_addr` is this peer's transfer address, announced verbatim.
    pub fn new(local_addr: impl Into<String>, port: u16) -> Self {
        Self {
            local_addr: local_addr.into(),
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)),
            target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)),
            interval: BROADCAST_INTERVAL,
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Binds both sockets and spawns the announce and listen loops.
    ///
    /// Socket setup failures are returned; everything after that is logged
    /// and retried on the next iteration.
    pub async fn start(self) -> Result<(DiscoveryHandle, mpsc::UnboundedReceiver<DiscoveredPeer>)> {
        let recv_socket = NetUtils::create_reusable_udp_socket(self.bind_addr)?;
        let listen_addr = recv_socket.local_addr()?;

        let send_socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| {
            P2PError::NetworkError(format!("Failed to bind broadcast socket: {}", e))
        })?;
        send_socket
            .set_broadcast(true)
            .map_err(|e| P2PError::NetworkError(format!("Failed to set broadcast: {}", e)))?;

        info!(
            "Discovery listening on {} and announcing {} to {} every {:?}",
            listen_addr, self.local_addr, self.target, self.interval
        );

        let (tx, rx) = mpsc::unbounded_channel();

        let announcer = tokio::spawn(Self::announce_loop(
            send_socket,
            self.target,
            self.local_addr.clone(),
            self.interval,
        ));
        let listener = tokio::spawn(Self::listen_loop(recv_socket, self.local_addr, tx));

        Ok((
            DiscoveryHandle {
                listen_addr,
                announcer,
                listener,
            },
            rx,
        ))
    }

    async fn announce_loop(
        socket: UdpSocket,
        target: SocketAddr,
        local_addr: String,
        period: Duration,
    ) {
        let payload = format!("{}{}", PING_PREFIX, local_addr);
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            match socket.send_to(payload.as_bytes(), target).await {
                Ok(_) => debug!("Announced {} to {}", local_addr, target),
                Err(e) => warn!("Discovery send error: {}", e),
            }
        }
    }

    async fn listen_loop(
        socket: UdpSocket,
        local_addr: String,
        tx: mpsc::UnboundedSender<DiscoveredPeer>,
    ) {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, sender) = match socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Discovery read error: {}", e);
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let payload = String::from_utf8_lossy(&buffer[..len]);
            let Some(peer) = parse_announcement(&payload, sender, &local_addr) else {
                continue;
            };

            info!("Discovered peer: {} @ {}", peer.id, peer.addr);
            if tx.send(peer).is_err() {
                debug!("Discovery consumer gone, stopping listener");
                return;
            }
        }
    }
}

/// Turns one datagram into a peer, skipping our own echo, non-ping traffic
/// and announcements that are not `host:port`.
pub fn parse_announcement(
    payload: &str,
    sender: SocketAddr,
    local_addr: &str,
) -> Option<DiscoveredPeer> {
    let announced = payload.trim_end().strip_prefix(PING_PREFIX)?;
    if announced == local_addr {
        return None;
    }
    if NetUtils::split_host_port(announced).is_none() {
        warn!("Ignoring malformed announcement {:?} from {}", announced, sender);
        return None;
    }

    Some(DiscoveredPeer {
        id: sender.to_string(),
        addr: announced.to_string(),
    })
}

/// Keeps the discovery loops alive; `stop` ends both.
pub struct DiscoveryHandle {
    listen_addr: SocketAddr,
    announcer: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl DiscoveryHandle {
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn stop(&self) {
        self.announcer.abort();
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn sender() -> SocketAddr {
        "192.168.1.20:40000".parse().unwrap()
    }

    #[test]
    fn test_parse_ping() {
        let peer = parse_announcement("PING:192.168.1.20:9001", sender(), "192.168.1.5:9001");
        assert_eq!(
            peer,
            Some(DiscoveredPeer {
                id: "192.168.1.20:40000".to_string(),
                addr: "192.168.1.20:9001".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_skips_self_and_noise() {
        let local = "192.168.1.5:9001";
        assert!(parse_announcement("PING:192.168.1.5:9001", sender(), local).is_none());
        assert!(parse_announcement("PONG:192.168.1.20:9001", sender(), local).is_none());
        assert!(parse_announcement("PING:garbage", sender(), local).is_none());
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_announcement_reaches_listener() {
        let (listener_handle, mut found) = Discovery::new("127.0.0.1:7001", 0)
            .with_bind_addr(loopback())
            .with_target("127.0.0.1:9".parse().unwrap())
            .start()
            .await
            .unwrap();

        let (announcer_handle, _rx) = Discovery::new("127.0.0.1:7002", 0)
            .with_bind_addr(loopback())
            .with_target(listener_handle.listen_addr())
            .with_interval(Duration::from_millis(50))
            .start()
            .await
            .unwrap();

        let peer = timeout(Duration::from_secs(5), found.recv())
            .await
            .expect("no announcement within 5s")
            .unwrap();
        assert_eq!(peer.addr, "127.0.0.1:7002");
        assert!(peer.id.starts_with("127.0.0.1:"));

        announcer_handle.stop();
        listener_handle.stop();
    }

    #[tokio::test]
    async fn test_own_announcement_is_ignored() {
        let (listener_handle, mut found) = Discovery::new("127.0.0.1:7003", 0)
            .with_bind_addr(loopback())
            .with_target("127.0.0.1:9".parse().unwrap())
            .start()
            .await
            .unwrap();

        let (echo_handle, _rx) = Discovery::new("127.0.0.1:7003", 0)
            .with_bind_addr(loopback())
            .with_target(listener_handle.listen_addr())
            .with_interval(Duration::from_millis(20))
            .start()
            .await
            .unwrap();

        let result = timeout(Duration::from_millis(300), found.recv()).await;
        assert!(result.is_err(), "self-announcement must not be emitted");

        echo_handle.stop();
        listener_handle.stop();
    }
}
