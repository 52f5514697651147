//! Sweep behaviour against a simulated path.
//!
//! The simulated socket answers each request from a script instead of the
//! network, so these tests need no privileges and never sleep on timeouts.

use hoptrace_core::{
    traceroute_sweep, traceroute_with, CancelFlag, ProbeOutcome, ProbeReply, ProbeRequest,
    ProbeSocket, SentProbe, TracerouteConfig, TracerouteError, TracerouteParams,
};
use std::cell::Cell;
use std::io;
use std::net::IpAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

const DESTINATION: &str = "203.0.113.9";

/// What the simulated network does with one probe.
#[derive(Debug, Clone, Copy)]
enum Answer {
    Echo(IpAddr),
    TimeExceeded(IpAddr),
    Unreachable(IpAddr),
    Silent,
    SendFails,
    Fatal,
}

type Script = Box<dyn FnMut(&ProbeRequest) -> Answer>;

struct SimulatedPath {
    script: Script,
    sent: Vec<ProbeRequest>,
    closed: Rc<Cell<bool>>,
}

impl SimulatedPath {
    fn new(script: impl FnMut(&ProbeRequest) -> Answer + 'static) -> Self {
        Self {
            script: Box::new(script),
            sent: Vec::new(),
            closed: Rc::new(Cell::new(false)),
        }
    }

    /// Routers answer at TTLs `1..distance`, the destination at `distance`.
    /// `None` entries are silent routers.
    fn linear(routers: Vec<Option<&str>>) -> Self {
        let routers: Vec<Option<IpAddr>> = routers
            .into_iter()
            .map(|r| r.map(|a| a.parse().unwrap()))
            .collect();
        let distance = routers.len() as u8 + 1;
        Self::new(move |request| {
            if request.ttl >= distance {
                Answer::Echo(request.destination)
            } else {
                match routers[request.ttl as usize - 1] {
                    Some(addr) => Answer::TimeExceeded(addr),
                    None => Answer::Silent,
                }
            }
        })
    }

    fn sent_at_ttl(&self, ttl: u8) -> usize {
        self.sent.iter().filter(|r| r.ttl == ttl).count()
    }
}

impl ProbeSocket for SimulatedPath {
    fn send_probe(&mut self, request: &ProbeRequest) -> Result<SentProbe, TracerouteError> {
        if let Answer::SendFails = (self.script)(request) {
            return Err(TracerouteError::WriteFailed(io::Error::from(
                io::ErrorKind::AddrNotAvailable,
            )));
        }
        self.sent.push(request.clone());
        Ok(SentProbe {
            request: request.clone(),
            sent_at: Instant::now(),
        })
    }

    fn receive_probe(&mut self, sent: &SentProbe) -> Result<ProbeReply, TracerouteError> {
        let request = &sent.request;
        // A deterministic RTT of (sequence + 1) milliseconds.
        let received_at = sent.sent_at + Duration::from_millis(u64::from(request.sequence) + 1);
        let (source, outcome) = match (self.script)(request) {
            Answer::Echo(addr) => (addr, ProbeOutcome::EchoReply),
            Answer::TimeExceeded(addr) => (addr, ProbeOutcome::TimeExceeded { code: 0 }),
            Answer::Unreachable(addr) => (addr, ProbeOutcome::DestinationUnreachable { code: 1 }),
            Answer::Silent | Answer::SendFails => return Err(TracerouteError::ReadTimeout),
            Answer::Fatal => {
                return Err(TracerouteError::PermissionDenied(io::Error::from(
                    io::ErrorKind::PermissionDenied,
                )))
            }
        };
        Ok(ProbeReply {
            source,
            identifier: request.identifier,
            sequence: request.sequence,
            outcome,
            received_at,
        })
    }

    fn close(&mut self) -> Result<(), TracerouteError> {
        self.closed.set(true);
        Ok(())
    }
}

fn params(count: u16, max_hops: u8) -> TracerouteParams {
    TracerouteParams {
        count,
        max_hops,
        interval: Duration::ZERO,
        timeout: Duration::from_millis(100),
        identifier: 0xbeef,
        ..Default::default()
    }
}

fn destination() -> IpAddr {
    DESTINATION.parse().unwrap()
}

fn config(count: u16, max_hops: u8) -> TracerouteConfig {
    TracerouteConfig {
        destination: destination(),
        source: None,
        params: params(count, max_hops),
    }
}

#[test]
fn test_silent_hops_then_destination() {
    let mut path = SimulatedPath::linear(vec![None, None, None]);
    let result = traceroute_sweep(&mut path, destination(), &params(3, 10), &CancelFlag::new())
        .unwrap();

    assert!(result.reached);
    assert_eq!(result.hops.len(), 1);
    let hop = &result.hops[0];
    assert_eq!(hop.distance, 4);
    assert_eq!(hop.address, destination());
    assert!(hop.received >= 1 && hop.received <= 3);
    assert_eq!(hop.transmitted, 3);

    assert!(path.sent.iter().all(|r| r.ttl <= 4));
    assert_eq!(path.sent_at_ttl(1), 3);
    assert_eq!(path.sent_at_ttl(4), 3);
}

#[test]
fn test_fast_mode_stops_after_first_reply() {
    let mut path = SimulatedPath::linear(vec![Some("10.0.0.1"), Some("10.0.1.1")]);
    let mut fast = params(5, 10);
    fast.fast_mode = true;

    let result = traceroute_sweep(&mut path, destination(), &fast, &CancelFlag::new()).unwrap();

    assert_eq!(result.hops.len(), 3);
    for hop in &result.hops {
        assert_eq!(hop.transmitted, 1);
        assert_eq!(hop.received, 1);
    }
    assert_eq!(path.sent.len(), 3);
    assert_eq!(path.sent_at_ttl(1), 1);
}

#[test]
fn test_fast_mode_keeps_probing_silent_hops() {
    let mut path = SimulatedPath::new(|request| match (request.ttl, request.sequence) {
        // Only the third probe at TTL 1 gets an answer.
        (1, 2) => Answer::TimeExceeded("10.0.0.1".parse().unwrap()),
        (1, _) => Answer::Silent,
        _ => Answer::Echo(request.destination),
    });
    let mut fast = params(5, 10);
    fast.fast_mode = true;

    let result = traceroute_sweep(&mut path, destination(), &fast, &CancelFlag::new()).unwrap();

    let first = &result.hops[0];
    assert_eq!(first.distance, 1);
    assert_eq!(first.transmitted, 3);
    assert_eq!(first.received, 1);
    assert_eq!(path.sent_at_ttl(1), 3);
}

#[test]
fn test_permission_denied_before_any_probe() {
    let opened = Rc::new(Cell::new(false));
    let opened_flag = opened.clone();

    let result = traceroute_with(
        move || -> Result<SimulatedPath, TracerouteError> {
            opened_flag.set(true);
            Err(TracerouteError::socket_creation(io::Error::from(
                io::ErrorKind::PermissionDenied,
            )))
        },
        &config(3, 30),
        &CancelFlag::new(),
    );

    assert!(opened.get());
    assert!(matches!(result, Err(TracerouteError::PermissionDenied(_))));
}

#[test]
fn test_traceroute_with_closes_socket() {
    let path = SimulatedPath::linear(vec![Some("10.0.0.1")]);
    let closed = path.closed.clone();

    let result = traceroute_with(
        move || Ok(path),
        &config(2, 30),
        &CancelFlag::new(),
    )
    .unwrap();

    assert!(result.reached);
    assert_eq!(result.hops.len(), 2);
    assert!(closed.get());
}

#[test]
fn test_invalid_params_fail_before_open() {
    let result = traceroute_with(
        || -> Result<SimulatedPath, TracerouteError> { panic!("socket must not be opened") },
        &config(0, 30),
        &CancelFlag::new(),
    );
    assert!(matches!(result, Err(TracerouteError::InvalidConfig(_))));
}

#[test]
fn test_family_mismatch_fails_before_open() {
    let mut mismatched = config(3, 30);
    mismatched.source = Some("2001:db8::1".parse().unwrap());

    let result = traceroute_with(
        || -> Result<SimulatedPath, TracerouteError> { panic!("socket must not be opened") },
        &mismatched,
        &CancelFlag::new(),
    );
    assert!(matches!(
        result,
        Err(TracerouteError::AddressFamilyMismatch { .. })
    ));
}

#[test]
fn test_interval_follows_time_exceeded() {
    // 2 routers x 2 probes answer with time exceeded.
    let mut path = SimulatedPath::linear(vec![Some("10.0.0.1"), Some("10.0.1.1")]);
    let mut paced = params(2, 10);
    paced.interval = Duration::from_millis(40);

    let started = Instant::now();
    let result = traceroute_sweep(&mut path, destination(), &paced, &CancelFlag::new()).unwrap();
    let elapsed = started.elapsed();

    assert!(result.reached);
    assert!(elapsed >= Duration::from_millis(160), "took {:?}", elapsed);
}

#[test]
fn test_no_interval_after_echo_reply() {
    let mut path = SimulatedPath::linear(vec![]);
    let mut paced = params(3, 10);
    paced.interval = Duration::from_secs(1);

    let started = Instant::now();
    let result = traceroute_sweep(&mut path, destination(), &paced, &CancelFlag::new()).unwrap();

    assert!(result.reached);
    assert_eq!(result.hops[0].received, 3);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_no_interval_after_timeout_or_unreachable() {
    let mut path = SimulatedPath::new(|request| match request.ttl {
        1 | 2 => Answer::Silent,
        _ => Answer::Unreachable("10.0.2.1".parse().unwrap()),
    });
    let mut paced = params(3, 4);
    paced.interval = Duration::from_secs(1);

    let started = Instant::now();
    let result = traceroute_sweep(&mut path, destination(), &paced, &CancelFlag::new()).unwrap();

    assert!(result.hops.is_empty());
    assert_eq!(path.sent.len(), 12);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_distances_increase_and_respect_max_hops() {
    // The destination sits beyond max_hops, behind a lossy router at TTL 3.
    let mut path = SimulatedPath::new(|request| match request.ttl {
        3 if request.sequence % 2 == 0 => Answer::Silent,
        6 => Answer::Silent,
        ttl => Answer::TimeExceeded(format!("10.0.{}.1", ttl).parse().unwrap()),
    });

    let result = traceroute_sweep(&mut path, destination(), &params(3, 8), &CancelFlag::new())
        .unwrap();

    assert!(!result.reached);
    let distances: Vec<u8> = result.hops.iter().map(|h| h.distance).collect();
    assert_eq!(distances, vec![1, 2, 3, 4, 5, 7, 8]);
    assert!(distances.windows(2).all(|w| w[0] < w[1]));

    for hop in &result.hops {
        assert!(hop.distance <= 8);
        assert!(hop.transmitted >= hop.received);
        assert!(hop.received <= 3);
        assert!(hop.min_rtt >= 0.0);
        assert!(hop.min_rtt <= hop.avg_rtt && hop.avg_rtt <= hop.max_rtt);
    }
    assert!(path.sent.iter().all(|r| r.ttl <= 8));
}

#[test]
fn test_rtt_statistics_use_received_probes_only() {
    // Sequences at TTL 1 are 0, 1, 2; the middle one is lost.
    let mut path = SimulatedPath::new(|request| match (request.ttl, request.sequence) {
        (1, 1) => Answer::Silent,
        (1, _) => Answer::TimeExceeded("10.0.0.1".parse().unwrap()),
        _ => Answer::Echo(request.destination),
    });

    let result = traceroute_sweep(&mut path, destination(), &params(3, 5), &CancelFlag::new())
        .unwrap();

    let hop = &result.hops[0];
    assert_eq!(hop.transmitted, 3);
    assert_eq!(hop.received, 2);
    // RTTs are sequence + 1 ms: 1 ms and 3 ms.
    assert!((hop.min_rtt - 1.0).abs() < 1e-6);
    assert!((hop.avg_rtt - 2.0).abs() < 1e-6);
    assert!((hop.max_rtt - 3.0).abs() < 1e-6);
}

#[test]
fn test_runs_are_repeatable() {
    let run = || {
        let mut path = SimulatedPath::linear(vec![
            Some("10.0.0.1"),
            None,
            Some("10.0.2.1"),
            Some("10.0.3.1"),
        ]);
        traceroute_sweep(&mut path, destination(), &params(3, 30), &CancelFlag::new()).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.hops.len(), second.hops.len());
    for (a, b) in first.hops.iter().zip(&second.hops) {
        assert_eq!(a.distance, b.distance);
        assert_eq!(a.address, b.address);
    }
}

#[test]
fn test_destination_reached_finishes_current_level() {
    let mut path = SimulatedPath::linear(vec![Some("10.0.0.1")]);
    let result = traceroute_sweep(&mut path, destination(), &params(3, 30), &CancelFlag::new())
        .unwrap();

    assert!(result.reached);
    let last = result.hops.last().unwrap();
    assert_eq!(last.distance, 2);
    assert_eq!(last.transmitted, 3);
    assert_eq!(last.received, 3);
    assert_eq!(path.sent_at_ttl(3), 0);
}

#[test]
fn test_unreachable_does_not_abort_sweep() {
    let mut path = SimulatedPath::new(|request| match request.ttl {
        1 => Answer::TimeExceeded("10.0.0.1".parse().unwrap()),
        2 => Answer::Unreachable("10.0.1.1".parse().unwrap()),
        3 if request.sequence % 3 == 0 => Answer::Unreachable("10.0.2.1".parse().unwrap()),
        3 => Answer::TimeExceeded("10.0.2.1".parse().unwrap()),
        _ => Answer::Echo(request.destination),
    });

    let result = traceroute_sweep(&mut path, destination(), &params(3, 30), &CancelFlag::new())
        .unwrap();

    let distances: Vec<u8> = result.hops.iter().map(|h| h.distance).collect();
    assert_eq!(distances, vec![1, 3, 4]);
    assert_eq!(path.sent_at_ttl(2), 3);
    let third = &result.hops[1];
    assert_eq!(third.transmitted, 3);
    assert_eq!(third.received, 2);
}

#[test]
fn test_send_failure_is_not_transmitted() {
    let mut path = SimulatedPath::new(|request| match (request.ttl, request.sequence) {
        (1, 0) => Answer::SendFails,
        (1, _) => Answer::TimeExceeded("10.0.0.1".parse().unwrap()),
        _ => Answer::Echo(request.destination),
    });

    let result = traceroute_sweep(&mut path, destination(), &params(3, 30), &CancelFlag::new())
        .unwrap();

    let hop = &result.hops[0];
    assert_eq!(hop.transmitted, 2);
    assert_eq!(hop.received, 2);
}

#[test]
fn test_fatal_error_stops_sweep() {
    let mut path = SimulatedPath::new(|request| match request.ttl {
        1 => Answer::TimeExceeded("10.0.0.1".parse().unwrap()),
        _ => Answer::Fatal,
    });

    let result = traceroute_sweep(&mut path, destination(), &params(3, 30), &CancelFlag::new());
    assert!(matches!(result, Err(TracerouteError::PermissionDenied(_))));
    assert_eq!(path.sent_at_ttl(2), 1);
}

#[test]
fn test_address_is_last_reply_source() {
    // A load-balanced first hop answers from two routers.
    let mut path = SimulatedPath::new(|request| match (request.ttl, request.sequence) {
        (1, 2) => Answer::TimeExceeded("10.0.0.2".parse().unwrap()),
        (1, _) => Answer::TimeExceeded("10.0.0.1".parse().unwrap()),
        _ => Answer::Echo(request.destination),
    });

    let result = traceroute_sweep(&mut path, destination(), &params(3, 30), &CancelFlag::new())
        .unwrap();
    assert_eq!(result.hops[0].address, "10.0.0.2".parse::<IpAddr>().unwrap());
}

#[test]
fn test_sequence_numbers_increase_across_hops() {
    let mut path = SimulatedPath::linear(vec![Some("10.0.0.1"), None, Some("10.0.2.1")]);
    traceroute_sweep(&mut path, destination(), &params(3, 30), &CancelFlag::new()).unwrap();

    let sequences: Vec<u16> = path.sent.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (0..12).collect::<Vec<u16>>());
    assert!(path.sent.iter().all(|r| r.identifier == 0xbeef));

    let ttls: Vec<u8> = path.sent.iter().map(|r| r.ttl).collect();
    assert!(ttls.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_cancelled_before_start() {
    let cancel = CancelFlag::new();
    cancel.cancel();

    let mut path = SimulatedPath::linear(vec![Some("10.0.0.1")]);
    let result = traceroute_sweep(&mut path, destination(), &params(3, 30), &cancel);

    assert!(matches!(result, Err(TracerouteError::Cancelled)));
    assert!(path.sent.is_empty());
}

#[test]
fn test_cancelled_between_probes() {
    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    let mut path = SimulatedPath::new(move |request| {
        if request.ttl == 2 {
            handle.cancel();
        }
        Answer::TimeExceeded("10.0.0.1".parse().unwrap())
    });

    let result = traceroute_sweep(&mut path, destination(), &params(3, 30), &cancel);

    assert!(matches!(result, Err(TracerouteError::Cancelled)));
    assert_eq!(path.sent_at_ttl(2), 1);
    assert_eq!(path.sent_at_ttl(3), 0);
}
