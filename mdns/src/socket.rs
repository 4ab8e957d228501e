//! Socket utilities for mDNS.
//!
//! [`MulticastSocket`] builds a UDP socket configured the way the engine's
//! transmit queue expects: bound to the mDNS port, joined to 224.0.0.251,
//! multicast TTL 255 (RFC 6762 §11) and loopback disabled so the host does
//! not answer its own probes.
//!
//! ```rust,ignore
//! use mdns::MulticastSocket;
//!
//! let std_socket = MulticastSocket::new().into_std()?;
//!
//! // For tokio:
//! let socket = tokio::net::UdpSocket::from_std(std_socket)?;
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::proto::{MDNS_MULTICAST_IPV4, MDNS_PORT};

/// A builder for multicast UDP sockets suitable for mDNS.
///
/// The resulting socket is:
///
/// - Bound to the mDNS port with `SO_REUSEADDR` (and `SO_REUSEPORT` on
///   supported platforms) so it can coexist with other responders
/// - Set to non-blocking mode for async compatibility
/// - Joined to the mDNS multicast group (224.0.0.251)
/// - Configured with multicast TTL 255 and loopback off
#[derive(Debug, Clone)]
pub struct MulticastSocket {
    multicast_local_ipv4: Option<Ipv4Addr>,
    multicast_local_port: Option<u16>,
    interface: Option<Ipv4Addr>,
}

impl Default for MulticastSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl MulticastSocket {
    /// Creates a new builder with default bind parameters (all interfaces,
    /// port 5353).
    pub fn new() -> Self {
        Self {
            multicast_local_ipv4: None,
            multicast_local_port: None,
            interface: None,
        }
    }

    /// Overrides the local address the socket binds to.
    pub fn with_multicast_local_ipv4(mut self, multicast_local_ipv4: Ipv4Addr) -> Self {
        self.multicast_local_ipv4 = Some(multicast_local_ipv4);
        self
    }

    /// Overrides the local port the socket binds to.
    pub fn with_multicast_local_port(mut self, multicast_local_port: u16) -> Self {
        self.multicast_local_port = Some(multicast_local_port);
        self
    }

    /// Sets a specific network interface for multicast operations. If not
    /// set, the socket joins the multicast group on all interfaces.
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Converts this builder into a configured `std::net::UdpSocket`.
    ///
    /// # Errors
    ///
    /// Returns an error if socket creation, configuration, binding or
    /// joining the multicast group fails.
    pub fn into_std(self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        // Allow coexistence with other mDNS responders on the same host.
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;

        // RFC 6762 §11: responses should be sent with IP TTL 255.
        socket.set_multicast_ttl_v4(255)?;

        // The engine must not hear its own transmissions back.
        socket.set_multicast_loop_v4(false)?;

        let multicast_local_ip = if let Some(multicast_local_ipv4) = self.multicast_local_ipv4 {
            IpAddr::V4(multicast_local_ipv4)
        } else if cfg!(target_os = "linux") {
            IpAddr::V4(MDNS_MULTICAST_IPV4)
        } else {
            // Binding the group address doesn't work on Mac/Win; only
            // 0.0.0.0 does.
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };

        let multicast_local_port = self.multicast_local_port.unwrap_or(MDNS_PORT);
        let multicast_local_addr = SocketAddr::new(multicast_local_ip, multicast_local_port);

        socket.bind(&multicast_local_addr.into())?;

        let iface = self.interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(&MDNS_MULTICAST_IPV4, &iface)?;

        Ok(socket.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_multicast_constants() {
        assert_eq!(MDNS_MULTICAST_IPV4, Ipv4Addr::new(224, 0, 0, 251));
        assert_eq!(MDNS_PORT, 5353);
    }

    #[test]
    fn test_multicast_socket_builder() {
        let builder = MulticastSocket::new()
            .with_multicast_local_ipv4(Ipv4Addr::from_str("0.0.0.0").unwrap())
            .with_multicast_local_port(5353);
        assert!(builder.multicast_local_ipv4.is_some());
        assert!(builder.multicast_local_port.is_some());
        assert!(builder.interface.is_none());
    }

    #[test]
    fn test_multicast_socket_with_interface() {
        let interface = Ipv4Addr::new(192, 168, 1, 100);
        let builder = MulticastSocket::new()
            .with_multicast_local_ipv4(Ipv4Addr::from_str("0.0.0.0").unwrap())
            .with_multicast_local_port(5353)
            .with_interface(interface);
        assert_eq!(builder.interface, Some(interface));
    }

    // Socket creation tests would require actual network access and might
    // conflict with other mDNS services, so we keep them minimal.
}
