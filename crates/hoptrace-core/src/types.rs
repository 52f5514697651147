//! Core types for traceroute operations.

use crate::TracerouteError;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Default number of probes sent per TTL.
pub const DEFAULT_COUNT: u16 = 3;
/// Default pause after a time-exceeded reply.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);
/// Default time to wait for each reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default highest TTL probed.
pub const DEFAULT_MAX_HOPS: u8 = 30;
/// Default echo payload length, the classic ping payload.
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;

/// Returns the identifier shared by every probe this process sends.
///
/// This is the process id truncated to 16 bits. Concurrent traceroutes from
/// the same process must pick their own identifiers.
pub fn default_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

/// Classification of a received ICMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Echo reply from the destination itself.
    EchoReply,
    /// An intermediate router dropped the probe when its TTL reached zero.
    TimeExceeded { code: u8 },
    /// The path cannot proceed (host, network, port or policy unreachable).
    DestinationUnreachable { code: u8 },
    /// Any other ICMP message.
    Other { icmp_type: u8, code: u8 },
}

impl ProbeOutcome {
    /// Returns true for the outcomes that contribute an RTT sample to a hop.
    pub fn is_response(&self) -> bool {
        matches!(self, Self::EchoReply | Self::TimeExceeded { .. })
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::EchoReply => write!(f, "echo reply"),
            ProbeOutcome::TimeExceeded { code } => write!(f, "time exceeded (code {})", code),
            ProbeOutcome::DestinationUnreachable { code } => {
                write!(f, "destination unreachable (code {})", code)
            }
            ProbeOutcome::Other { icmp_type, code } => {
                write!(f, "icmp type {} code {}", icmp_type, code)
            }
        }
    }
}

/// A single echo request to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Address the probe is sent to.
    pub destination: IpAddr,
    /// Echo identifier shared by every probe of a run.
    pub identifier: u16,
    /// Echo sequence number, unique within a run.
    pub sequence: u16,
    /// IPv4 TTL or IPv6 hop limit of the outgoing packet.
    pub ttl: u8,
    /// How long to wait for the matching reply.
    pub timeout: Duration,
    /// Number of payload bytes after the echo header.
    pub payload_size: usize,
}

/// A request that has left the host.
#[derive(Debug, Clone)]
pub struct SentProbe {
    pub request: ProbeRequest,
    /// Taken immediately before the packet was handed to the socket.
    pub sent_at: Instant,
}

impl SentProbe {
    /// Instant after which no reply to this probe is accepted.
    pub fn deadline(&self) -> Instant {
        self.sent_at + self.request.timeout
    }
}

/// A reply correlated with an outstanding request.
#[derive(Debug, Clone)]
pub struct ProbeReply {
    /// The address that actually answered.
    pub source: IpAddr,
    /// Echo identifier carried by (or quoted in) the reply.
    pub identifier: u16,
    /// Echo sequence number carried by (or quoted in) the reply.
    pub sequence: u16,
    pub outcome: ProbeOutcome,
    pub received_at: Instant,
}

impl ProbeReply {
    /// Returns true if this reply answers `request`.
    pub fn matches(&self, request: &ProbeRequest) -> bool {
        self.identifier == request.identifier && self.sequence == request.sequence
    }

    /// Round-trip time in milliseconds measured from the send timestamp.
    pub fn round_trip_ms(&self, sent: &SentProbe) -> f64 {
        self.received_at
            .saturating_duration_since(sent.sent_at)
            .as_secs_f64()
            * 1000.0
    }
}

/// Parameters for the TTL sweep.
#[derive(Debug, Clone)]
pub struct TracerouteParams {
    /// Probes sent per TTL (upper bound in fast mode).
    pub count: u16,
    /// Pause after each time-exceeded reply.
    pub interval: Duration,
    /// Timeout for each probe.
    pub timeout: Duration,
    /// Echo identifier used to recognise replies.
    pub identifier: u16,
    /// Maximum TTL to probe.
    pub max_hops: u8,
    /// Move to the next TTL as soon as one reply arrives.
    pub fast_mode: bool,
    /// Echo payload length in bytes.
    pub payload_size: usize,
}

impl Default for TracerouteParams {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            identifier: default_identifier(),
            max_hops: DEFAULT_MAX_HOPS,
            fast_mode: false,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

impl TracerouteParams {
    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), TracerouteError> {
        if self.count == 0 {
            return Err(TracerouteError::InvalidConfig(
                "count must be at least 1".to_string(),
            ));
        }
        if self.max_hops == 0 {
            return Err(TracerouteError::InvalidConfig(
                "max_hops must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(TracerouteError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Worst-case duration of a sweep in which nothing ever answers.
    ///
    /// Saturates at [`Duration::MAX`].
    pub fn max_duration(&self) -> Duration {
        let probes = u32::from(self.count) * u32::from(self.max_hops);
        self.timeout.checked_mul(probes).unwrap_or(Duration::MAX)
    }
}

/// High-level traceroute configuration.
#[derive(Debug, Clone)]
pub struct TracerouteConfig {
    /// Target IP address.
    pub destination: IpAddr,
    /// Local address to send from, if any.
    pub source: Option<IpAddr>,
    /// Sweep parameters.
    pub params: TracerouteParams,
}

impl TracerouteConfig {
    pub fn new(destination: IpAddr) -> Self {
        Self {
            destination,
            source: None,
            params: TracerouteParams::default(),
        }
    }

    /// Validates the parameters and the address pair.
    pub fn validate(&self) -> Result<(), TracerouteError> {
        if let Some(source) = self.source {
            if source.is_ipv4() != self.destination.is_ipv4() {
                return Err(TracerouteError::AddressFamilyMismatch {
                    source_addr: source,
                    destination: self.destination,
                });
            }
        }
        self.params.validate()
    }
}
