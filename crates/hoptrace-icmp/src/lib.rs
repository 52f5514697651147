//! ICMP traceroute for hoptrace.
//!
//! Probes are ICMP (or ICMPv6) Echo Requests sent over a raw socket with an
//! increasing TTL. Routers on the path answer with Time Exceeded and the
//! destination answers with an Echo Reply.
//!
//! ```no_run
//! use hoptrace_core::TracerouteConfig;
//!
//! let config = TracerouteConfig::new("1.1.1.1".parse().unwrap());
//! let sweep = hoptrace_icmp::traceroute(&config)?;
//! for hop in &sweep.hops {
//!     println!("{} {} {:.3} ms", hop.distance, hop.address, hop.avg_rtt);
//! }
//! # Ok::<(), hoptrace_core::TracerouteError>(())
//! ```

pub mod codec;
pub mod probe;

pub use codec::{decode_reply, encode_echo_request_v4, encode_echo_request_v6, DecodedReply};
pub use probe::IcmpProbeSocket;

use hoptrace_core::{traceroute_with, CancelFlag, SweepResult, TracerouteConfig, TracerouteResult};
use hoptrace_socket::AddressFamily;
use tracing::debug;

/// Runs an ICMP traceroute described by `config`.
///
/// Requires the privilege to open raw sockets; without it this fails with
/// [`hoptrace_core::TracerouteError::PermissionDenied`] before any probe
/// is sent.
pub fn traceroute(config: &TracerouteConfig) -> TracerouteResult<SweepResult> {
    traceroute_with_cancel(config, &CancelFlag::new())
}

/// Like [`traceroute`], stopping with
/// [`hoptrace_core::TracerouteError::Cancelled`] once `cancel` is set.
pub fn traceroute_with_cancel(
    config: &TracerouteConfig,
    cancel: &CancelFlag,
) -> TracerouteResult<SweepResult> {
    let family = AddressFamily::of(config.destination);
    let result = traceroute_with(
        || IcmpProbeSocket::open(family, config.source),
        config,
        cancel,
    )?;

    debug!(
        destination = %config.destination,
        hops = result.hops.len(),
        reached = result.reached,
        "ICMP traceroute finished"
    );
    Ok(result)
}
