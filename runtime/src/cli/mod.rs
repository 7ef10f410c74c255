//! CLI subcommand implementations for the Fuzzscout binary.

pub mod classify_cmd;
pub mod discover_cmd;
pub mod doctor;
pub mod execute_cmd;
pub mod output;
pub mod run_cmd;
pub mod serve;
pub mod submit_cmd;
pub mod triage_cmd;

use crate::discovery::DiscoveryError;
use fuzzscout::{DiscoveryRequest, ScoutError};
use tracing_subscriber::EnvFilter;

/// A run was stopped by a signal.
#[derive(Debug, thiserror::Error)]
#[error("interrupted by signal; live tasks were terminated")]
pub struct Interrupted;

/// Process exit code for a failed command: 2 for rejected input or policy,
/// 130 for an interrupted run, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<Interrupted>().is_some()
        || matches!(err.downcast_ref::<DiscoveryError>(), Some(DiscoveryError::Interrupted))
    {
        return 130;
    }
    let preflight = match err.downcast_ref::<DiscoveryError>() {
        Some(DiscoveryError::Rejected(e)) => e.is_preflight(),
        _ => err
            .downcast_ref::<ScoutError>()
            .is_some_and(ScoutError::is_preflight),
    };
    if preflight {
        2
    } else {
        1
    }
}

/// Install the global tracing subscriber on stderr.
///
/// `RUST_LOG` wins over `level`; `FUZZSCOUT_LOG_FORMAT=json` selects JSON lines.
pub fn init_logging(level: &str, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,fuzzscout={level},fuzzscout_runtime={level}"))
    });
    let json = std::env::var("FUZZSCOUT_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("logging already initialized: {e}");
    }
}

/// Discovery flags shared by `discover` and `run`.
#[derive(Debug, Clone, clap::Args)]
pub struct DiscoverArgs {
    /// Target URL (loopback hosts only unless --allow-non-local)
    pub url: String,
    /// Permit a non-loopback target you are authorized to test
    #[arg(long)]
    pub allow_non_local: bool,
    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
    /// Per-attempt navigation budget in milliseconds
    #[arg(long, default_value = "30000")]
    pub timeout_ms: u64,
    /// Maximum endpoints kept (clamped to 50..=1000)
    #[arg(long, default_value = "300")]
    pub max_endpoints: usize,
    /// Resource classes to abort, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "image,stylesheet,font,media")]
    pub block: Vec<String>,
    /// Keep network observations from other hosts
    #[arg(long)]
    pub all_hosts: bool,
}

impl DiscoverArgs {
    pub fn to_request(&self) -> DiscoveryRequest {
        DiscoveryRequest {
            url: self.url.clone(),
            headless: !self.headed,
            timeout_ms: self.timeout_ms,
            allow_non_local: self.allow_non_local,
            max_endpoints: self.max_endpoints,
            block_resource_types: self.block.clone(),
            same_host_only: !self.all_hosts,
        }
    }
}

/// Gate flags shared by `run` and `execute`. Both must be given to execute.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct GateArgs {
    /// Leave dry-run mode
    #[arg(long)]
    pub no_dry_run: bool,
    /// Confirm that generated commands may be executed
    #[arg(long)]
    pub allow_execution: bool,
}

impl GateArgs {
    pub fn gate(&self) -> crate::harness::SafetyGate {
        crate::harness::SafetyGate {
            dry_run: !self.no_dry_run,
            allow_execution: self.allow_execution,
        }
    }
}
