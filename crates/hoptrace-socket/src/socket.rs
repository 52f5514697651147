//! Raw IPv4/IPv6 sockets.

use crate::{AddressFamily, SocketConfig};
use hoptrace_core::{TracerouteError, TracerouteResult};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tracing::trace;

/// A packet read from a raw socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Bytes as delivered by the kernel. IPv4 raw sockets include the IP
    /// header, IPv6 raw sockets do not.
    pub bytes: Vec<u8>,
    /// Address the packet came from.
    pub source: IpAddr,
    /// Source port, always 0 for raw IP sockets.
    pub port: u16,
}

/// Send/receive of raw packets plus the two options a traceroute changes
/// between probes.
pub trait RawSocket {
    /// Address family the socket was opened for.
    fn family(&self) -> AddressFamily;

    /// Sends `packet` to `destination`, returning the number of bytes written.
    fn send(&self, packet: &[u8], destination: IpAddr, port: u16) -> TracerouteResult<usize>;

    /// Blocks until a packet arrives or the configured timeout passes.
    ///
    /// Fails with [`TracerouteError::ReadTimeout`] when nothing arrived in time.
    fn receive(&self, max_size: usize) -> TracerouteResult<Datagram>;

    /// Current receive timeout.
    fn timeout(&self) -> Duration;

    /// Changes the receive timeout used by the next [`RawSocket::receive`].
    fn set_timeout(&mut self, timeout: Duration) -> TracerouteResult<()>;

    /// Current hop limit of outgoing packets.
    fn ttl(&self) -> u8;

    /// Changes the hop limit used by every later [`RawSocket::send`].
    fn set_ttl(&mut self, ttl: u8) -> TracerouteResult<()>;
}

/// The OS socket shared by both address families.
#[derive(Debug)]
struct SocketHandle {
    socket: Socket,
    family: AddressFamily,
    config: SocketConfig,
}

impl SocketHandle {
    fn open(
        family: AddressFamily,
        protocol: Protocol,
        source: Option<IpAddr>,
        timeout: Duration,
    ) -> TracerouteResult<Self> {
        let domain = match family {
            AddressFamily::V4 => Domain::IPV4,
            AddressFamily::V6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::RAW, Some(protocol))
            .map_err(TracerouteError::socket_creation)?;

        if let Some(addr) = source {
            socket
                .bind(&SockAddr::from(SocketAddr::new(addr, 0)))
                .map_err(|source| TracerouteError::SocketBind { addr, source })?;
        }

        let mut handle = Self {
            socket,
            family,
            config: SocketConfig {
                timeout,
                ..Default::default()
            },
        };
        handle.set_timeout(timeout)?;
        Ok(handle)
    }

    fn send(&self, packet: &[u8], destination: IpAddr, port: u16) -> TracerouteResult<usize> {
        if AddressFamily::of(destination) != self.family {
            return Err(TracerouteError::InvalidConfig(format!(
                "cannot send to {} on an {} socket",
                destination, self.family
            )));
        }

        let addr = SockAddr::from(SocketAddr::new(destination, port));
        let written = self
            .socket
            .send_to(packet, &addr)
            .map_err(TracerouteError::WriteFailed)?;
        trace!(dst = %destination, len = written, "Sent raw packet");
        Ok(written)
    }

    fn receive(&self, max_size: usize) -> TracerouteResult<Datagram> {
        let mut buf = vec![MaybeUninit::<u8>::uninit(); max_size];
        let (n, addr) = self.socket.recv_from(&mut buf)?;

        // SAFETY: recv_from initialised the first `n` bytes.
        let bytes: Vec<u8> = buf[..n].iter().map(|b| unsafe { b.assume_init() }).collect();

        let sender = addr.as_socket().ok_or_else(|| {
            TracerouteError::MalformedPacket("Sender is not an IP address".to_string())
        })?;
        trace!(src = %sender.ip(), len = n, "Received raw packet");

        Ok(Datagram {
            bytes,
            source: sender.ip(),
            port: sender.port(),
        })
    }

    fn set_timeout(&mut self, timeout: Duration) -> TracerouteResult<()> {
        if timeout.is_zero() {
            return Err(TracerouteError::InvalidConfig(
                "socket timeout must be greater than zero".to_string(),
            ));
        }
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(|source| TracerouteError::SocketOption {
                option: "SO_RCVTIMEO",
                source,
            })?;
        self.config.timeout = timeout;
        Ok(())
    }
}

/// Raw IPv4 socket.
#[derive(Debug)]
pub struct Ipv4Socket {
    handle: SocketHandle,
    broadcast: bool,
}

impl Ipv4Socket {
    /// Opens a raw IPv4 socket for `protocol`, optionally bound to `source`.
    ///
    /// Fails with [`TracerouteError::PermissionDenied`] without the
    /// privilege to open raw sockets.
    pub fn open(
        protocol: Protocol,
        source: Option<Ipv4Addr>,
        config: SocketConfig,
    ) -> TracerouteResult<Self> {
        let handle = SocketHandle::open(
            AddressFamily::V4,
            protocol,
            source.map(IpAddr::V4),
            config.timeout,
        )?;
        let mut socket = Self {
            handle,
            broadcast: false,
        };
        socket.set_ttl(config.ttl)?;
        Ok(socket)
    }

    pub fn broadcast(&self) -> bool {
        self.broadcast
    }

    /// Allows or forbids sending to broadcast addresses.
    pub fn set_broadcast(&mut self, allow: bool) -> TracerouteResult<()> {
        self.handle
            .socket
            .set_broadcast(allow)
            .map_err(|source| TracerouteError::SocketOption {
                option: "SO_BROADCAST",
                source,
            })?;
        self.broadcast = allow;
        Ok(())
    }
}

impl RawSocket for Ipv4Socket {
    fn family(&self) -> AddressFamily {
        AddressFamily::V4
    }

    fn send(&self, packet: &[u8], destination: IpAddr, port: u16) -> TracerouteResult<usize> {
        self.handle.send(packet, destination, port)
    }

    fn receive(&self, max_size: usize) -> TracerouteResult<Datagram> {
        self.handle.receive(max_size)
    }

    fn timeout(&self) -> Duration {
        self.handle.config.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> TracerouteResult<()> {
        self.handle.set_timeout(timeout)
    }

    fn ttl(&self) -> u8 {
        self.handle.config.ttl
    }

    fn set_ttl(&mut self, ttl: u8) -> TracerouteResult<()> {
        self.handle
            .socket
            .set_ttl(u32::from(ttl))
            .map_err(|source| TracerouteError::SocketOption {
                option: "IP_TTL",
                source,
            })?;
        self.handle.config.ttl = ttl;
        Ok(())
    }
}

/// Raw IPv6 socket.
#[derive(Debug)]
pub struct Ipv6Socket {
    handle: SocketHandle,
}

impl Ipv6Socket {
    /// Opens a raw IPv6 socket for `protocol`, optionally bound to `source`.
    ///
    /// Fails with [`TracerouteError::PermissionDenied`] without the
    /// privilege to open raw sockets.
    pub fn open(
        protocol: Protocol,
        source: Option<Ipv6Addr>,
        config: SocketConfig,
    ) -> TracerouteResult<Self> {
        let handle = SocketHandle::open(
            AddressFamily::V6,
            protocol,
            source.map(IpAddr::V6),
            config.timeout,
        )?;
        let mut socket = Self { handle };
        socket.set_ttl(config.ttl)?;
        Ok(socket)
    }
}

impl RawSocket for Ipv6Socket {
    fn family(&self) -> AddressFamily {
        AddressFamily::V6
    }

    fn send(&self, packet: &[u8], destination: IpAddr, port: u16) -> TracerouteResult<usize> {
        self.handle.send(packet, destination, port)
    }

    fn receive(&self, max_size: usize) -> TracerouteResult<Datagram> {
        self.handle.receive(max_size)
    }

    fn timeout(&self) -> Duration {
        self.handle.config.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> TracerouteResult<()> {
        self.handle.set_timeout(timeout)
    }

    fn ttl(&self) -> u8 {
        self.handle.config.ttl
    }

    // IPv6 has no TTL; the unicast hop limit plays the same role.
    fn set_ttl(&mut self, ttl: u8) -> TracerouteResult<()> {
        self.handle
            .socket
            .set_unicast_hops_v6(u32::from(ttl))
            .map_err(|source| TracerouteError::SocketOption {
                option: "IPV6_UNICAST_HOPS",
                source,
            })?;
        self.handle.config.ttl = ttl;
        Ok(())
    }
}

/// A raw socket of either family, chosen at open time.
#[derive(Debug)]
pub enum IpSocket {
    V4(Ipv4Socket),
    V6(Ipv6Socket),
}

impl IpSocket {
    /// Opens a raw socket of `family`.
    ///
    /// `source`, when given, must belong to `family`.
    pub fn open(
        family: AddressFamily,
        protocol: Protocol,
        source: Option<IpAddr>,
        config: SocketConfig,
    ) -> TracerouteResult<Self> {
        match (family, source) {
            (AddressFamily::V4, None) => Ok(IpSocket::V4(Ipv4Socket::open(protocol, None, config)?)),
            (AddressFamily::V4, Some(IpAddr::V4(addr))) => {
                Ok(IpSocket::V4(Ipv4Socket::open(protocol, Some(addr), config)?))
            }
            (AddressFamily::V6, None) => Ok(IpSocket::V6(Ipv6Socket::open(protocol, None, config)?)),
            (AddressFamily::V6, Some(IpAddr::V6(addr))) => {
                Ok(IpSocket::V6(Ipv6Socket::open(protocol, Some(addr), config)?))
            }
            (family, Some(addr)) => Err(TracerouteError::InvalidConfig(format!(
                "source address {} is not an {} address",
                addr, family
            ))),
        }
    }

    fn inner(&self) -> &dyn RawSocket {
        match self {
            IpSocket::V4(socket) => socket,
            IpSocket::V6(socket) => socket,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RawSocket {
        match self {
            IpSocket::V4(socket) => socket,
            IpSocket::V6(socket) => socket,
        }
    }
}

impl RawSocket for IpSocket {
    fn family(&self) -> AddressFamily {
        self.inner().family()
    }

    fn send(&self, packet: &[u8], destination: IpAddr, port: u16) -> TracerouteResult<usize> {
        self.inner().send(packet, destination, port)
    }

    fn receive(&self, max_size: usize) -> TracerouteResult<Datagram> {
        self.inner().receive(max_size)
    }

    fn timeout(&self) -> Duration {
        self.inner().timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> TracerouteResult<()> {
        self.inner_mut().set_timeout(timeout)
    }

    fn ttl(&self) -> u8 {
        self.inner().ttl()
    }

    fn set_ttl(&mut self, ttl: u8) -> TracerouteResult<()> {
        self.inner_mut().set_ttl(ttl)
    }
}
