//! CLI entry point for the licscan license inventory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use licscan::config::{self, ScanConfig};
use licscan::hosts;
use licscan::logging;
use licscan::orchestrator::{self, ScanOrchestrator};
use licscan::probe::HostProber;

/// Exit status for `--strict` runs where a host ended in Error or Timeout.
const EXIT_HOST_FAILURES: u8 = 2;

#[derive(Parser)]
#[command(name = "licscan")]
#[command(about = "Check Windows license status on multiple hosts")]
struct Cli {
    /// Hostnames or IPs to process.
    hosts: Vec<String>,

    /// Timeout in seconds for each license query.
    #[arg(long)]
    timeout: Option<u64>,

    /// Merge into the existing report instead of rewriting it.
    #[arg(long)]
    append: bool,

    /// Path to the remote-execution transport (PsExec.exe).
    #[arg(long)]
    psexec_path: Option<PathBuf>,

    /// Report file to read prior results from and write to.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Host list used when no hosts are given.
    #[arg(long)]
    host_file: Option<PathBuf>,

    /// Debug log file (appended to).
    #[arg(long)]
    debug_log: Option<PathBuf>,

    /// Maximum hosts probed at once.
    #[arg(long)]
    workers: Option<usize>,

    /// Exit with status 2 when any host ends in Error or Timeout.
    #[arg(long)]
    strict: bool,

    /// Config file prefix (default: licscan).
    #[arg(short, long, default_value = "licscan")]
    config: String,
}

impl Cli {
    /// Command-line flags override file and environment settings.
    fn apply(&self, config: &mut ScanConfig) {
        if let Some(timeout) = self.timeout {
            config.query_timeout_secs = timeout;
        }
        if let Some(path) = &self.psexec_path {
            config.psexec_path = path.clone();
        }
        if let Some(path) = &self.report {
            config.report_path = path.clone();
        }
        if let Some(path) = &self.host_file {
            config.host_file = path.clone();
        }
        if let Some(path) = &self.debug_log {
            config.debug_log = path.clone();
        }
        if let Some(workers) = self.workers {
            config.max_workers = Some(workers);
        }
        config.append |= self.append;
        config.strict |= self.strict;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut scan_config = config::load(&cli.config)?;
    cli.apply(&mut scan_config);

    let _log = logging::init(&scan_config.debug_log, scan_config.log_json)?;

    let (hosts, source) =
        hosts::collect_hosts(&cli.hosts, &scan_config.host_file, hosts::prompt_stdin)?;
    tracing::info!(count = hosts.len(), source = ?source, "Host list loaded");

    let prober = HostProber::from_config(&scan_config);
    let orchestrator = ScanOrchestrator::new(prober, scan_config.worker_count());
    let run = orchestrator::run_inventory(&orchestrator, &scan_config, &hosts).await?;

    println!(
        "Processing complete. Results saved to {}.",
        scan_config.report_path.display()
    );
    println!("{}", run.summary());
    println!("\nDebug Information:");
    for entry in &run.debug_entries {
        println!("{entry}");
    }

    if scan_config.strict && run.has_failures() {
        return Ok(ExitCode::from(EXIT_HOST_FAILURES));
    }
    Ok(ExitCode::SUCCESS)
}
