//! Raw socket abstraction for hoptrace.
//!
//! Wraps one OS raw socket per address family behind the [`RawSocket`]
//! trait. The socket knows nothing about the protocol it carries; it only
//! moves bytes and applies the receive timeout and hop limit.

pub mod config;
pub mod socket;

pub use config::{AddressFamily, SocketConfig};
pub use socket::{Datagram, IpSocket, Ipv4Socket, Ipv6Socket, RawSocket};
pub use socket2::Protocol;
