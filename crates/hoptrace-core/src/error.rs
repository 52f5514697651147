//! Error types for traceroute operations.

use std::net::IpAddr;
use thiserror::Error;

/// Main error type for traceroute operations.
#[derive(Error, Debug)]
pub enum TracerouteError {
    // Socket/IO errors
    #[error("Insufficient privileges to open a raw socket: {0}")]
    PermissionDenied(#[source] std::io::Error),

    #[error("Failed to create socket: {0}")]
    SocketCreation(#[source] std::io::Error),

    #[error("Failed to bind to address {addr}: {source}")]
    SocketBind {
        addr: IpAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Read timeout exceeded")]
    ReadTimeout,

    #[error("Write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    // Packet errors
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Failed to parse {layer} layer: {reason}")]
    PacketParseFailed { layer: &'static str, reason: String },

    #[error("Packet did not match traceroute")]
    PacketMismatch,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Address family mismatch: source {source_addr} cannot reach {destination}")]
    AddressFamilyMismatch {
        source_addr: IpAddr,
        destination: IpAddr,
    },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl TracerouteError {
    /// Returns true if this error is retryable (e.g., packet mismatch, parse failure).
    ///
    /// Retryable errors mean the probe socket should keep reading until its
    /// deadline rather than give up, since a raw socket also sees ICMP traffic
    /// that belongs to other processes. A read timeout is not retryable: the
    /// deadline has already passed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PacketMismatch
                | Self::MalformedPacket(_)
                | Self::PacketParseFailed { .. }
                | Self::PacketTooShort { .. }
        )
    }

    /// Returns true if this error must abort the whole traceroute.
    ///
    /// Everything else only costs the current probe its sample.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::SocketCreation(_)
                | Self::SocketBind { .. }
                | Self::InvalidConfig(_)
                | Self::AddressFamilyMismatch { .. }
                | Self::Cancelled
        )
    }

    /// Classifies a failure to create a raw socket.
    ///
    /// Lack of privilege gets its own variant so callers can tell it apart
    /// from every per-probe condition.
    pub fn socket_creation(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => TracerouteError::PermissionDenied(err),
            _ => TracerouteError::SocketCreation(err),
        }
    }
}

impl From<std::io::Error> for TracerouteError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => TracerouteError::ReadTimeout,
            std::io::ErrorKind::WouldBlock => TracerouteError::ReadTimeout,
            std::io::ErrorKind::PermissionDenied => TracerouteError::PermissionDenied(err),
            _ => TracerouteError::Internal(err.to_string()),
        }
    }
}

/// Result type alias for traceroute operations.
pub type TracerouteResult<T> = Result<T, TracerouteError>;
