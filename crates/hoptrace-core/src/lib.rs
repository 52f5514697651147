//! Core types, traits, and error handling for hoptrace.
//!
//! This crate provides the fundamental abstractions used throughout the
//! traceroute implementation:
//!
//! - [`ProbeSocket`] trait for anything that can send a probe and wait for its reply
//! - [`ProbeRequest`], [`ProbeReply`] and the [`ProbeOutcome`] classification
//! - [`TracerouteError`] for error handling
//! - [`Hop`] and [`TracerouteRun`] for output
//! - The TTL sweep itself in [`execution`]

pub mod cancel;
pub mod error;
pub mod execution;
pub mod result;
pub mod traits;
pub mod types;

pub use cancel::CancelFlag;
pub use error::{TracerouteError, TracerouteResult};
pub use execution::{traceroute_sweep, traceroute_with, SweepResult};
pub use result::{Hop, TracerouteRun};
pub use traits::ProbeSocket;
pub use types::{
    default_identifier, ProbeOutcome, ProbeReply, ProbeRequest, SentProbe, TracerouteConfig,
    TracerouteParams,
};
