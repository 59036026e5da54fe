//! Configuration for the licscan inventory scanner.

use std::path::PathBuf;

use serde::Deserialize;

/// Default location of the license management script on Windows.
pub const DEFAULT_SLMGR_PATH: &str = r"C:\Windows\System32\slmgr.vbs";

/// Upper bound on concurrent host probes.
pub const MAX_WORKER_CAP: usize = 32;

/// Top-level scan configuration.
///
/// Loaded from `licscan.toml` `[scan]` section or
/// `LICSCAN_SCAN__` environment variables. Command-line flags override both.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Path to the remote-execution transport (PsExec-compatible).
    #[serde(default = "default_psexec_path")]
    pub psexec_path: PathBuf,

    /// Path of `slmgr.vbs` on the target machines.
    #[serde(default = "default_slmgr_path")]
    pub slmgr_path: String,

    /// Timeout in seconds for one license query.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Deadline in milliseconds for the single reachability ping.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,

    /// Maximum concurrent host probes. Unset means scaled to the machine.
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// CSV report, read for prior state and written at end of run.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Newline-delimited host list used when no hosts are given on the command line.
    #[serde(default = "default_host_file")]
    pub host_file: PathBuf,

    /// Append-only diagnostic log.
    #[serde(default = "default_debug_log")]
    pub debug_log: PathBuf,

    /// Write the debug log as JSON lines instead of plain text.
    #[serde(default)]
    pub log_json: bool,

    /// Merge into the existing report instead of rewriting it for this run's hosts.
    #[serde(default)]
    pub append: bool,

    /// Exit non-zero when any host ends in Error or Timeout.
    #[serde(default)]
    pub strict: bool,

    /// Extra names that refer to the machine running the scan.
    #[serde(default)]
    pub local_aliases: Vec<String>,

    /// Working directory for query commands. Defaults to the executable's directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl ScanConfig {
    /// Resolve the worker pool size: configured value or `min(32, cpus + 4)`,
    /// never zero.
    pub fn worker_count(&self) -> usize {
        let n = self.max_workers.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            (cpus + 4).min(MAX_WORKER_CAP)
        });
        n.max(1)
    }
}

/// Directory holding the running executable, used for the default PsExec
/// location and query working directory.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_psexec_path() -> PathBuf {
    exe_dir().join("PsExec.exe")
}

fn default_slmgr_path() -> String {
    DEFAULT_SLMGR_PATH.to_string()
}

fn default_query_timeout() -> u64 {
    90
}

fn default_ping_timeout() -> u64 {
    1000
}

fn default_report_path() -> PathBuf {
    PathBuf::from("results.csv")
}

fn default_host_file() -> PathBuf {
    PathBuf::from("host.txt")
}

fn default_debug_log() -> PathBuf {
    PathBuf::from("debug.log")
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            psexec_path: default_psexec_path(),
            slmgr_path: default_slmgr_path(),
            query_timeout_secs: default_query_timeout(),
            ping_timeout_ms: default_ping_timeout(),
            max_workers: None,
            report_path: default_report_path(),
            host_file: default_host_file(),
            debug_log: default_debug_log(),
            log_json: false,
            append: false,
            strict: false,
            local_aliases: Vec::new(),
            work_dir: None,
        }
    }
}

/// Load `[scan]` from `<file_prefix>.toml` and `LICSCAN_SCAN__*` variables.
///
/// A missing file or section yields the defaults.
pub fn load(file_prefix: &str) -> crate::error::Result<ScanConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LICSCAN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<ScanConfig>("scan") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(ScanConfig::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.query_timeout_secs, 90);
        assert_eq!(config.ping_timeout_ms, 1000);
        assert_eq!(config.report_path, PathBuf::from("results.csv"));
        assert_eq!(config.host_file, PathBuf::from("host.txt"));
        assert_eq!(config.slmgr_path, DEFAULT_SLMGR_PATH);
        assert!(config.psexec_path.ends_with("PsExec.exe"));
        assert!(!config.append);
        assert!(!config.strict);
    }

    #[test]
    fn test_worker_count_is_bounded() {
        let config = ScanConfig::default();
        let n = config.worker_count();
        assert!((1..=MAX_WORKER_CAP).contains(&n));

        let config = ScanConfig {
            max_workers: Some(0),
            ..Default::default()
        };
        assert_eq!(config.worker_count(), 1);

        let config = ScanConfig {
            max_workers: Some(8),
            ..Default::default()
        };
        assert_eq!(config.worker_count(), 8);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("licscan");
        std::fs::write(
            dir.path().join("licscan.toml"),
            "[scan]\nquery_timeout_secs = 30\nappend = true\nlocal_aliases = [\"buildbox\"]\n",
        )
        .unwrap();

        let config = load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.query_timeout_secs, 30);
        assert!(config.append);
        assert_eq!(config.local_aliases, vec!["buildbox".to_string()]);
        assert_eq!(config.ping_timeout_ms, 1000);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.query_timeout_secs, 90);
    }
}
