use log::{debug, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

use crate::utils::{P2PError, Result};

pub struct NetUtils;

impl NetUtils {
    /// Create a UDP socket with SO_REUSEADDR (and SO_REUSEPORT on Unix if available)
    /// so several peers on one host can listen on the discovery port.
    pub fn create_reusable_udp_socket(addr: SocketAddr) -> Result<UdpSocket> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| P2PError::NetworkError(format!("Failed to create socket: {}", e)))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| P2PError::NetworkError(format!("Failed to set reuse_address: {}", e)))?;

        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        {
            if let Err(e) = socket.set_reuse_port(true) {
                warn!("Could not set SO_REUSEPORT (not critical): {}", e);
            }
        }

        socket
            .set_broadcast(true)
            .map_err(|e| P2PError::NetworkError(format!("Failed to set broadcast: {}", e)))?;

        socket
            .bind(&addr.into())
            .map_err(|e| P2PError::NetworkError(format!("Failed to bind to {}: {}", addr, e)))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| P2PError::NetworkError(format!("Failed to set nonblocking: {}", e)))?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket).map_err(|e| {
            P2PError::NetworkError(format!("Failed to convert to tokio socket: {}", e))
        })
    }

    /// Best guess at the address other hosts on the LAN can reach us on.
    ///
    /// Connecting a UDP socket sends nothing; it only makes the kernel pick the
    /// outbound interface. Falls back to loopback when there is no route.
    pub async fn local_ip() -> IpAddr {
        if let Ok(socket) = UdpSocket::bind("0.0.0.0:0").await {
            if socket.connect("8.8.8.8:80").await.is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    debug!("Detected local IP {}", local_addr.ip());
                    return local_addr.ip();
                }
            }
        }

        warn!("Could not detect a LAN address, falling back to 127.0.0.1");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    /// Split `host:port`, accepting bracketed IPv6 hosts.
    pub fn split_host_port(addr: &str) -> Option<(&str, u16)> {
        let (host, port) = addr.rsplit_once(':')?;
        let port = port.parse().ok()?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() || (host.contains(':') && !addr.starts_with('[')) {
            return None;
        }
        Some((host, port))
    }
}
