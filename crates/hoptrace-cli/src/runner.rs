//! Runs a traceroute and renders the report.

use hoptrace_core::{TracerouteConfig, TracerouteError, TracerouteRun};
use std::fmt::Write;
use tracing::debug;
use uuid::Uuid;

/// Run a traceroute and wrap the hops in a report.
pub fn run_traceroute(config: &TracerouteConfig) -> Result<TracerouteRun, TracerouteError> {
    let run_id = Uuid::new_v4().to_string();
    debug!(run_id = %run_id, destination = %config.destination, "Running traceroute");

    let sweep = hoptrace_icmp::traceroute(config)?;

    Ok(TracerouteRun {
        run_id,
        source: config.source,
        destination: config.destination,
        reached: sweep.reached,
        hops: sweep.hops,
    })
}

/// Renders one line per hop, with a `*` line for every silent distance.
pub fn render_text(run: &TracerouteRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "traceroute to {}", run.destination);

    let missing = run.missing_distances();
    let mut missing = missing.into_iter().peekable();
    for hop in &run.hops {
        while let Some(distance) = missing.next_if(|&d| d < hop.distance) {
            let _ = writeln!(out, "{:>3}  *", distance);
        }
        let _ = writeln!(
            out,
            "{:>3}  {:<39} {:>9.3} ms  {:>9.3} ms  {:>9.3} ms  {}/{}",
            hop.distance,
            hop.address,
            hop.min_rtt,
            hop.avg_rtt,
            hop.max_rtt,
            hop.received,
            hop.transmitted
        );
    }

    if !run.reached {
        let _ = writeln!(out, "destination not reached");
    }
    out
}
