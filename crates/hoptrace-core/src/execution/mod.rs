//! Execution of the TTL sweep.
//!
//! Probes are strictly serial: one outstanding request at a time, hops
//! emitted in increasing TTL order.

pub mod sweep;

pub use sweep::{traceroute_sweep, traceroute_with, SweepResult};
