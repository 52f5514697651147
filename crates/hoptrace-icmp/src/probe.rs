//! ICMP probe socket.

use crate::codec::{decode_reply, encode_echo_request_v4, encode_echo_request_v6};
use hoptrace_core::{
    ProbeReply, ProbeRequest, ProbeSocket, SentProbe, TracerouteError, TracerouteResult,
};
use hoptrace_socket::{AddressFamily, IpSocket, Protocol, RawSocket, SocketConfig};
use rand::Rng;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Largest packet read from the socket.
const RECEIVE_BUFFER_SIZE: usize = 1500;

/// Shortest receive timeout applied while waiting out a deadline.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Sends ICMP echo requests over a raw socket and waits for the reply that
/// matches each one.
///
/// One request is outstanding at a time, so correlation is an equality
/// check on identifier and sequence. Anything else arriving on the socket is
/// dropped.
#[derive(Debug)]
pub struct IcmpProbeSocket<R: RawSocket = IpSocket> {
    socket: Option<R>,
    family: AddressFamily,
    /// Bound source address, used for the ICMPv6 checksum.
    source: Option<IpAddr>,
}

impl IcmpProbeSocket {
    /// Opens a raw ICMP socket for `family`, optionally bound to `source`.
    ///
    /// Fails with [`TracerouteError::PermissionDenied`] without the
    /// privilege to open raw sockets.
    pub fn open(family: AddressFamily, source: Option<IpAddr>) -> TracerouteResult<Self> {
        let protocol = match family {
            AddressFamily::V4 => Protocol::ICMPV4,
            AddressFamily::V6 => Protocol::ICMPV6,
        };
        let socket = IpSocket::open(family, protocol, source, SocketConfig::default())?;
        debug!(family = %family, source = ?source, "Opened raw ICMP socket");

        Ok(Self::from_socket(socket, source))
    }
}

impl<R: RawSocket> IcmpProbeSocket<R> {
    /// Wraps an already opened raw socket.
    pub fn from_socket(socket: R, source: Option<IpAddr>) -> Self {
        Self {
            family: socket.family(),
            socket: Some(socket),
            source,
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    fn socket_mut(&mut self) -> TracerouteResult<&mut R> {
        self.socket
            .as_mut()
            .ok_or_else(|| TracerouteError::Internal("Probe socket is closed".to_string()))
    }

    fn build_packet(&self, request: &ProbeRequest) -> TracerouteResult<Vec<u8>> {
        let mut payload = vec![0u8; request.payload_size];
        rand::thread_rng().fill(&mut payload[..]);

        match (self.family, request.destination) {
            (AddressFamily::V4, IpAddr::V4(_)) => {
                encode_echo_request_v4(request.identifier, request.sequence, &payload)
            }
            (AddressFamily::V6, IpAddr::V6(destination)) => {
                let addresses = match self.source {
                    Some(IpAddr::V6(source)) => Some((source, destination)),
                    _ => None,
                };
                encode_echo_request_v6(request.identifier, request.sequence, &payload, addresses)
            }
            _ => Err(TracerouteError::InvalidConfig(format!(
                "cannot probe {} from an {} socket",
                request.destination, self.family
            ))),
        }
    }
}

impl<R: RawSocket> ProbeSocket for IcmpProbeSocket<R> {
    fn send_probe(&mut self, request: &ProbeRequest) -> Result<SentProbe, TracerouteError> {
        let packet = self.build_packet(request)?;

        let socket = self.socket_mut()?;
        if socket.ttl() != request.ttl {
            socket.set_ttl(request.ttl)?;
        }

        trace!(
            ttl = request.ttl,
            echo_id = request.identifier,
            seq = request.sequence,
            "Sending ICMP Echo Request probe"
        );

        // ICMP has no port; 0 is a placeholder.
        let sent_at = Instant::now();
        socket.send(&packet, request.destination, 0)?;

        Ok(SentProbe {
            request: request.clone(),
            sent_at,
        })
    }

    fn receive_probe(&mut self, sent: &SentProbe) -> Result<ProbeReply, TracerouteError> {
        let family = self.family;
        let deadline = sent.deadline();
        let socket = self.socket_mut()?;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(TracerouteError::ReadTimeout);
            }
            socket.set_timeout((deadline - now).max(MIN_READ_TIMEOUT))?;

            let datagram = socket.receive(RECEIVE_BUFFER_SIZE)?;
            let received_at = Instant::now();

            let decoded = match decode_reply(family, &datagram.bytes) {
                Ok(decoded) => decoded,
                Err(e) if e.is_retryable() => {
                    trace!(src = %datagram.source, error = %e, "Ignored packet");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let reply = ProbeReply {
                source: datagram.source,
                identifier: decoded.identifier,
                sequence: decoded.sequence,
                outcome: decoded.outcome,
                received_at,
            };

            if !reply.matches(&sent.request) {
                trace!(
                    expected_id = sent.request.identifier,
                    expected_seq = sent.request.sequence,
                    actual_id = reply.identifier,
                    actual_seq = reply.sequence,
                    "Ignored reply to a different probe"
                );
                continue;
            }

            return Ok(reply);
        }
    }

    fn close(&mut self) -> Result<(), TracerouteError> {
        // The descriptor is closed when the socket is dropped.
        if self.socket.take().is_some() {
            debug!(family = %self.family, "Closed raw ICMP socket");
        }
        Ok(())
    }
}
