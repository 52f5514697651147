//! ICMP echo request construction and reply classification.

use etherparse::{
    Icmpv4Slice, Icmpv4Type, Icmpv6Slice, Icmpv6Type, Ipv4HeaderSlice, Ipv6HeaderSlice,
};
use hoptrace_core::{ProbeOutcome, TracerouteError};
use hoptrace_socket::AddressFamily;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet};
use std::net::Ipv6Addr;

/// Length of an ICMP/ICMPv6 echo header.
pub const ICMP_HEADER_LEN: usize = 8;

const IPV6_HEADER_LEN: usize = 40;

const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV6_ECHO_REQUEST: u8 = 128;

/// The parts of a received message needed to correlate and classify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedReply {
    pub outcome: ProbeOutcome,
    /// Echo identifier, read from the reply itself or from the datagram
    /// quoted by an error message.
    pub identifier: u16,
    /// Echo sequence number, read the same way as `identifier`.
    pub sequence: u16,
}

/// Creates an ICMPv4 Echo Request with its checksum set.
pub fn encode_echo_request_v4(
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<Vec<u8>, TracerouteError> {
    let mut buffer = vec![0u8; ICMP_HEADER_LEN + payload.len()];

    {
        let mut packet = MutableEchoRequestPacket::new(&mut buffer)
            .ok_or_else(|| TracerouteError::Internal("Failed to create ICMP packet".to_string()))?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.set_payload(payload);
    }

    let checksum = {
        let view = IcmpPacket::new(&buffer)
            .ok_or_else(|| TracerouteError::Internal("Failed to create ICMP view".to_string()))?;
        pnet_packet::icmp::checksum(&view)
    };
    buffer[2..4].copy_from_slice(&checksum.to_be_bytes());

    Ok(buffer)
}

/// Creates an ICMPv6 Echo Request.
///
/// The ICMPv6 checksum covers a pseudo-header with both addresses. When
/// `addresses` (source, destination) is given the checksum is filled in;
/// otherwise it is left zero for the kernel to compute, which Linux always
/// does for raw ICMPv6 sockets.
pub fn encode_echo_request_v6(
    identifier: u16,
    sequence: u16,
    payload: &[u8],
    addresses: Option<(Ipv6Addr, Ipv6Addr)>,
) -> Result<Vec<u8>, TracerouteError> {
    let mut buffer = vec![0u8; ICMP_HEADER_LEN + payload.len()];

    {
        let mut packet = MutableIcmpv6Packet::new(&mut buffer).ok_or_else(|| {
            TracerouteError::Internal("Failed to create ICMPv6 packet".to_string())
        })?;
        packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
        packet.set_icmpv6_code(Icmpv6Code::new(0));
    }
    // Echo identifier and sequence are the first four bytes of the ICMPv6 body.
    buffer[4..6].copy_from_slice(&identifier.to_be_bytes());
    buffer[6..8].copy_from_slice(&sequence.to_be_bytes());
    buffer[ICMP_HEADER_LEN..].copy_from_slice(payload);

    if let Some((source, destination)) = addresses {
        let checksum = {
            let view = Icmpv6Packet::new(&buffer).ok_or_else(|| {
                TracerouteError::Internal("Failed to create ICMPv6 view".to_string())
            })?;
            pnet_packet::icmpv6::checksum(&view, &source, &destination)
        };
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    Ok(buffer)
}

/// Classifies a packet read from a raw socket of `family`.
///
/// A leading IP header is detected and skipped. Echo replies are
/// correlated through their own identifier and sequence, error messages
/// through the echo request they quote.
///
/// Every error returned here is retryable: the packet was unusable, not the
/// socket.
pub fn decode_reply(family: AddressFamily, bytes: &[u8]) -> Result<DecodedReply, TracerouteError> {
    let icmp = strip_ip_header(family, bytes)?;
    match family {
        AddressFamily::V4 => decode_icmpv4(icmp),
        AddressFamily::V6 => decode_icmpv6(icmp),
    }
}

/// Returns `bytes` without the IP header, if one is present.
///
/// IPv4 raw sockets deliver the IP header, IPv6 raw sockets usually do not.
/// The version nibble tells them apart: no echo or error type we care about
/// starts with 0x4_ or 0x6_.
fn strip_ip_header(family: AddressFamily, bytes: &[u8]) -> Result<&[u8], TracerouteError> {
    let version = match bytes.first() {
        Some(first) => first >> 4,
        None => {
            return Err(TracerouteError::PacketTooShort {
                expected: ICMP_HEADER_LEN,
                actual: 0,
            })
        }
    };

    match (family, version) {
        (AddressFamily::V4, 4) => {
            let header = Ipv4HeaderSlice::from_slice(bytes).map_err(|e| {
                TracerouteError::PacketParseFailed {
                    layer: "IPv4",
                    reason: e.to_string(),
                }
            })?;
            Ok(&bytes[header.slice().len()..])
        }
        (AddressFamily::V6, 6) if bytes.len() >= IPV6_HEADER_LEN => {
            let header = Ipv6HeaderSlice::from_slice(bytes).map_err(|e| {
                TracerouteError::PacketParseFailed {
                    layer: "IPv6",
                    reason: e.to_string(),
                }
            })?;
            Ok(&bytes[header.slice().len()..])
        }
        _ => Ok(bytes),
    }
}

fn decode_icmpv4(bytes: &[u8]) -> Result<DecodedReply, TracerouteError> {
    let icmp = Icmpv4Slice::from_slice(bytes).map_err(|e| TracerouteError::PacketParseFailed {
        layer: "ICMPv4",
        reason: e.to_string(),
    })?;
    let code = icmp.code_u8();

    let outcome = match icmp.icmp_type() {
        Icmpv4Type::EchoReply(echo) => {
            return Ok(DecodedReply {
                outcome: ProbeOutcome::EchoReply,
                identifier: echo.id,
                sequence: echo.seq,
            })
        }
        // Our own requests show up when tracing a local address.
        Icmpv4Type::EchoRequest(_) => return Err(TracerouteError::PacketMismatch),
        Icmpv4Type::TimeExceeded(_) => ProbeOutcome::TimeExceeded { code },
        Icmpv4Type::DestinationUnreachable(_) => ProbeOutcome::DestinationUnreachable { code },
        _ => ProbeOutcome::Other {
            icmp_type: icmp.type_u8(),
            code,
        },
    };

    let (identifier, sequence) = quoted_echo(AddressFamily::V4, icmp.payload())?;
    Ok(DecodedReply {
        outcome,
        identifier,
        sequence,
    })
}

fn decode_icmpv6(bytes: &[u8]) -> Result<DecodedReply, TracerouteError> {
    let icmp = Icmpv6Slice::from_slice(bytes).map_err(|e| TracerouteError::PacketParseFailed {
        layer: "ICMPv6",
        reason: e.to_string(),
    })?;
    let code = icmp.code_u8();

    let outcome = match icmp.icmp_type() {
        Icmpv6Type::EchoReply(echo) => {
            return Ok(DecodedReply {
                outcome: ProbeOutcome::EchoReply,
                identifier: echo.id,
                sequence: echo.seq,
            })
        }
        Icmpv6Type::EchoRequest(_) => return Err(TracerouteError::PacketMismatch),
        Icmpv6Type::TimeExceeded(_) => ProbeOutcome::TimeExceeded { code },
        Icmpv6Type::DestinationUnreachable(_) => ProbeOutcome::DestinationUnreachable { code },
        _ => ProbeOutcome::Other {
            icmp_type: icmp.type_u8(),
            code,
        },
    };

    let (identifier, sequence) = quoted_echo(AddressFamily::V6, icmp.payload())?;
    Ok(DecodedReply {
        outcome,
        identifier,
        sequence,
    })
}

/// Reads the echo identifier and sequence out of the datagram quoted by an
/// ICMP error message.
fn quoted_echo(family: AddressFamily, quoted: &[u8]) -> Result<(u16, u16), TracerouteError> {
    let (header_len, echo_request) = match family {
        AddressFamily::V4 => {
            let header = Ipv4HeaderSlice::from_slice(quoted).map_err(|e| {
                TracerouteError::PacketParseFailed {
                    layer: "Inner IPv4",
                    reason: e.to_string(),
                }
            })?;
            (header.slice().len(), ICMPV4_ECHO_REQUEST)
        }
        AddressFamily::V6 => {
            let header = Ipv6HeaderSlice::from_slice(quoted).map_err(|e| {
                TracerouteError::PacketParseFailed {
                    layer: "Inner IPv6",
                    reason: e.to_string(),
                }
            })?;
            (header.slice().len(), ICMPV6_ECHO_REQUEST)
        }
    };

    let inner = &quoted[header_len..];
    if inner.len() < ICMP_HEADER_LEN {
        return Err(TracerouteError::PacketTooShort {
            expected: header_len + ICMP_HEADER_LEN,
            actual: quoted.len(),
        });
    }
    if inner[0] != echo_request {
        return Err(TracerouteError::PacketMismatch);
    }

    let identifier = u16::from_be_bytes([inner[4], inner[5]]);
    let sequence = u16::from_be_bytes([inner[6], inner[7]]);
    Ok((identifier, sequence))
}
