//! Serial TTL sweep.
//!
//! Sends `count` probes per TTL, one at a time, waiting for each reply (or
//! timeout) before the next, and folds the replies into one [`Hop`] per TTL.

use crate::{
    CancelFlag, Hop, ProbeOutcome, ProbeRequest, ProbeSocket, TracerouteConfig, TracerouteError,
    TracerouteParams,
};
use std::net::IpAddr;
use tracing::{debug, trace};

/// Hops discovered by a sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    /// One record per TTL that produced a reply, in increasing distance.
    pub hops: Vec<Hop>,
    /// Whether the destination answered an echo request.
    pub reached: bool,
}

/// Per-TTL accumulator.
#[derive(Debug, Default)]
struct LevelStats {
    transmitted: u32,
    received: u32,
    min_rtt: f64,
    rtt_sum: f64,
    max_rtt: f64,
    last_source: Option<IpAddr>,
}

impl LevelStats {
    fn record(&mut self, rtt_ms: f64, source: IpAddr) {
        if self.received == 0 || rtt_ms < self.min_rtt {
            self.min_rtt = rtt_ms;
        }
        if rtt_ms > self.max_rtt {
            self.max_rtt = rtt_ms;
        }
        self.rtt_sum += rtt_ms;
        self.received += 1;
        self.last_source = Some(source);
    }

    fn into_hop(self, distance: u8) -> Option<Hop> {
        let address = self.last_source?;
        if self.received == 0 {
            return None;
        }
        Some(Hop {
            distance,
            address,
            transmitted: self.transmitted,
            received: self.received,
            min_rtt: self.min_rtt,
            avg_rtt: self.rtt_sum / f64::from(self.received),
            max_rtt: self.max_rtt,
        })
    }
}

/// Executes a traceroute towards `destination` over `socket`.
///
/// The sweep starts at TTL 1 and stops after the TTL at which the
/// destination answered, or after `max_hops`. A TTL with no echo reply or
/// time-exceeded answer yields no hop. Only fatal errors (see
/// [`TracerouteError::is_fatal`]) end the sweep early.
pub fn traceroute_sweep<S: ProbeSocket + ?Sized>(
    socket: &mut S,
    destination: IpAddr,
    params: &TracerouteParams,
    cancel: &CancelFlag,
) -> Result<SweepResult, TracerouteError> {
    params.validate()?;
    sweep(socket, destination, params, cancel)
}

fn sweep<S: ProbeSocket + ?Sized>(
    socket: &mut S,
    destination: IpAddr,
    params: &TracerouteParams,
    cancel: &CancelFlag,
) -> Result<SweepResult, TracerouteError> {
    let mut result = SweepResult::default();
    let mut sequence: u16 = 0;

    for ttl in 1..=params.max_hops {
        let mut level = LevelStats::default();

        for _ in 0..params.count {
            cancel.check()?;

            let request = ProbeRequest {
                destination,
                identifier: params.identifier,
                sequence,
                ttl,
                timeout: params.timeout,
                payload_size: params.payload_size,
            };
            sequence = sequence.wrapping_add(1);

            trace!(ttl = ttl, seq = request.sequence, "Sending probe");
            let sent = match socket.send_probe(&request) {
                Ok(sent) => sent,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(ttl = ttl, seq = request.sequence, error = %e, "Probe not sent");
                    continue;
                }
            };
            level.transmitted += 1;

            let reply = match socket.receive_probe(&sent) {
                Ok(reply) => reply,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    trace!(ttl = ttl, seq = request.sequence, error = %e, "No reply");
                    continue;
                }
            };

            if !reply.outcome.is_response() {
                debug!(
                    ttl = ttl,
                    seq = request.sequence,
                    ip = %reply.source,
                    outcome = %reply.outcome,
                    "Probe answered with an error"
                );
                continue;
            }

            if reply.outcome == ProbeOutcome::EchoReply {
                result.reached = true;
            } else if !params.interval.is_zero() {
                std::thread::sleep(params.interval);
            }

            let rtt_ms = reply.round_trip_ms(&sent);
            debug!(
                ttl = ttl,
                seq = request.sequence,
                ip = %reply.source,
                rtt_ms = rtt_ms,
                is_dest = result.reached,
                "Received probe response"
            );
            level.record(rtt_ms, reply.source);

            if params.fast_mode {
                break;
            }
        }

        if let Some(hop) = level.into_hop(ttl) {
            result.hops.push(hop);
        } else {
            debug!(ttl = ttl, "No response at this distance");
        }

        if result.reached {
            debug!(ttl = ttl, "Reached destination, stopping");
            break;
        }
    }

    Ok(result)
}

/// Validates `config`, opens a probe socket with `open`, sweeps, and closes
/// the socket.
///
/// An invalid config is rejected before `open` is called. A failure to open
/// (typically [`TracerouteError::PermissionDenied`]) is returned before any
/// probe is built.
pub fn traceroute_with<S, F>(
    open: F,
    config: &TracerouteConfig,
    cancel: &CancelFlag,
) -> Result<SweepResult, TracerouteError>
where
    S: ProbeSocket,
    F: FnOnce() -> Result<S, TracerouteError>,
{
    config.validate()?;

    let mut socket = open()?;
    let result = sweep(&mut socket, config.destination, &config.params, cancel);
    let closed = socket.close();

    let result = result?;
    closed?;
    Ok(result)
}
