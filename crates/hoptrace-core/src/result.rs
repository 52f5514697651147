//! Result types for traceroute output.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One router position along the path.
///
/// Only built for TTLs that produced at least one reply, so a missing
/// distance in a hop list means that TTL stayed silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    /// The TTL that elicited this hop, starting at 1.
    pub distance: u8,
    /// Source address of the last reply received at this distance.
    pub address: IpAddr,
    /// Probes that actually left the host.
    pub transmitted: u32,
    /// Probes answered by an echo reply or a time-exceeded message.
    pub received: u32,
    /// Minimum round-trip time in milliseconds.
    pub min_rtt: f64,
    /// Average round-trip time of received probes in milliseconds.
    pub avg_rtt: f64,
    /// Maximum round-trip time in milliseconds.
    pub max_rtt: f64,
}

impl Hop {
    /// Fraction of transmitted probes that went unanswered, in `0.0..=1.0`.
    pub fn packet_loss(&self) -> f64 {
        if self.transmitted == 0 {
            return 1.0;
        }
        1.0 - f64::from(self.received) / f64::from(self.transmitted)
    }

    pub fn is_alive(&self) -> bool {
        self.received > 0
    }
}

/// A single traceroute run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteRun {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Source address, if one was bound or discovered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<IpAddr>,
    /// Destination address.
    pub destination: IpAddr,
    /// Whether the destination answered an echo request.
    pub reached: bool,
    /// The hops discovered in this run, ordered by distance.
    pub hops: Vec<Hop>,
}

impl TracerouteRun {
    /// Distances between the first and last hop that produced no record.
    pub fn missing_distances(&self) -> Vec<u8> {
        let mut missing = Vec::new();
        let mut expected = 1u8;
        for hop in &self.hops {
            while expected < hop.distance {
                missing.push(expected);
                expected += 1;
            }
            expected = hop.distance.saturating_add(1);
        }
        missing
    }

    /// Serializes the run to JSON with indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serializes the run to compact JSON.
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
