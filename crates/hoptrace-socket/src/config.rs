//! Socket options applied when a raw socket is opened.

use std::net::IpAddr;
use std::time::Duration;

/// Address family of a raw socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Returns the family of `addr`.
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "ipv4"),
            AddressFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// Options applied to a socket at open time.
///
/// Both can be changed afterwards through [`crate::RawSocket::set_timeout`]
/// and [`crate::RawSocket::set_ttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    /// How long a receive blocks before failing with a read timeout.
    pub timeout: Duration,
    /// IPv4 TTL or IPv6 unicast hop limit of outgoing packets.
    pub ttl: u8,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            ttl: 64,
        }
    }
}
