//! CLI for hoptrace.

mod runner;

use clap::Parser;
use hoptrace_core::{default_identifier, TracerouteConfig, TracerouteError, TracerouteParams};
use std::net::IpAddr;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// hoptrace - ICMP traceroute.
#[derive(Parser, Debug)]
#[command(name = "hoptrace")]
#[command(version)]
#[command(about = "hoptrace - ICMP traceroute")]
pub struct Args {
    /// Destination IP address.
    #[arg(required = true)]
    pub destination: IpAddr,

    /// Local address to send probes from.
    #[arg(long)]
    pub source: Option<IpAddr>,

    /// Probes sent per TTL.
    #[arg(short, long, default_value = "3")]
    pub count: u16,

    /// Pause after each time-exceeded reply, in milliseconds.
    #[arg(short, long, default_value = "50")]
    pub interval: u64,

    /// Timeout per probe in milliseconds.
    #[arg(short, long, default_value = "2000")]
    pub timeout: u64,

    /// Echo identifier (defaults to the process id).
    #[arg(long, conflicts_with = "random_id")]
    pub id: Option<u16>,

    /// Use a random echo identifier.
    #[arg(long = "random-id")]
    pub random_id: bool,

    /// Maximum TTL.
    #[arg(short = 'm', long = "max-hops", default_value = "30")]
    pub max_hops: u8,

    /// Move to the next TTL after the first reply.
    #[arg(short, long)]
    pub fast: bool,

    /// Echo payload size in bytes.
    #[arg(short = 's', long = "payload-size", default_value = "56")]
    pub payload_size: usize,

    /// Print the run as JSON.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Convert CLI args to TracerouteConfig.
    ///
    /// The config is validated when the traceroute starts.
    fn to_config(&self) -> TracerouteConfig {
        let identifier = match (self.id, self.random_id) {
            (Some(id), _) => id,
            (None, true) => rand::random(),
            (None, false) => default_identifier(),
        };

        TracerouteConfig {
            destination: self.destination,
            source: self.source,
            params: TracerouteParams {
                count: self.count,
                interval: Duration::from_millis(self.interval),
                timeout: Duration::from_millis(self.timeout),
                identifier,
                max_hops: self.max_hops,
                fast_mode: self.fast,
                payload_size: self.payload_size,
            },
        }
    }
}

/// Log filter used when `RUST_LOG` is not set.
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the report.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(args.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = args.to_config();

    tracing::info!(
        destination = %config.destination,
        max_hops = config.params.max_hops,
        count = config.params.count,
        worst_case_ms = config.params.max_duration().as_millis() as u64,
        "Starting traceroute"
    );

    let run = match runner::run_traceroute(&config) {
        Ok(run) => run,
        Err(
            e @ (TracerouteError::InvalidConfig(_) | TracerouteError::AddressFamilyMismatch { .. }),
        ) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e @ TracerouteError::PermissionDenied(_)) => {
            eprintln!("Traceroute failed: {}", e);
            eprintln!("Raw sockets need root or the CAP_NET_RAW capability.");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Traceroute failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match run.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize results: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", runner::render_text(&run));
    }

    ExitCode::SUCCESS
}
