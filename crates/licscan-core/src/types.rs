//! Core domain types for the license inventory.
//!
//! These types are shared between the scanner, the report store, and the
//! orchestrator. A `HostKey` is derived once per host and never recomputed
//! mid-scan.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// License status reported by `slmgr /dli` for an activated machine.
pub const LICENSED: &str = "Licensed";
/// Edition recorded when the reachability probe fails.
pub const OFFLINE: &str = "Offline";
/// Placeholder status when no license query was made or it did not finish.
pub const NOT_APPLICABLE: &str = "N/A";
/// Edition and status recorded when the query command fails.
pub const ERROR: &str = "Error";
/// Edition recorded when the query command exceeds its timeout.
pub const TIMEOUT: &str = "Timeout";
/// Default edition and status when the query output lacks the expected lines.
pub const UNKNOWN: &str = "Unknown";

// ── Host Identity ─────────────────────────────────────────────────

/// Canonical host identity: domain-stripped and uppercased.
///
/// IP literals are kept whole since they carry no domain suffix. A name with
/// nothing before its first `.` is kept whole as well.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostKey(String);

impl HostKey {
    /// Build a key from an already-resolved host name (or the raw input when
    /// resolution failed).
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::BlankHost);
        }

        Ok(Self(host_label(name).to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HostKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl From<HostKey> for String {
    fn from(key: HostKey) -> Self {
        key.0
    }
}

/// The short name used for keys, dispatch and the remote target.
///
/// IP literals and names like `.corp.local` come back unchanged.
pub fn host_label(name: &str) -> &str {
    if name.parse::<IpAddr>().is_ok() {
        return name;
    }
    match strip_domain(name) {
        "" => name,
        label => label,
    }
}

/// Keep only the part of a host name before the first `.`.
pub fn strip_domain(name: &str) -> &str {
    match name.split_once('.') {
        Some((host, _)) => host,
        None => name,
    }
}

// ── Report ────────────────────────────────────────────────────────

/// One persisted line of the license report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Hostname")]
    pub host: HostKey,
    #[serde(rename = "Windows Edition")]
    pub edition: String,
    #[serde(rename = "License Status")]
    pub license_status: String,
}

impl ReportRow {
    pub fn is_licensed(&self) -> bool {
        self.license_status == LICENSED
    }
}

// ── Scan Outcomes ─────────────────────────────────────────────────

/// Terminal classification of a scanned host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// The query ran and exited zero; edition and status come from its output.
    Queried,
    /// The reachability probe failed.
    Offline,
    /// The query could not be launched or exited non-zero.
    Failed,
    /// The query exceeded its timeout.
    TimedOut,
}

impl OutcomeKind {
    /// Whether this outcome counts as a host-level failure for exit status.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

/// Fully populated result of probing and querying one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub host: HostKey,
    pub kind: OutcomeKind,
    pub edition: String,
    pub license_status: String,
    pub debug: String,
}

impl ScanOutcome {
    pub fn offline(host: HostKey) -> Self {
        Self {
            host,
            kind: OutcomeKind::Offline,
            edition: OFFLINE.to_string(),
            license_status: NOT_APPLICABLE.to_string(),
            debug: "Ping failed".to_string(),
        }
    }

    pub fn failed(host: HostKey, debug: String) -> Self {
        Self {
            host,
            kind: OutcomeKind::Failed,
            edition: ERROR.to_string(),
            license_status: ERROR.to_string(),
            debug,
        }
    }

    pub fn timed_out(host: HostKey, timeout_secs: u64) -> Self {
        Self {
            host,
            kind: OutcomeKind::TimedOut,
            edition: TIMEOUT.to_string(),
            license_status: NOT_APPLICABLE.to_string(),
            debug: format!("TimedOut after {timeout_secs}s"),
        }
    }

    pub fn to_row(&self) -> ReportRow {
        ReportRow {
            host: self.host.clone(),
            edition: self.edition.clone(),
            license_status: self.license_status.clone(),
        }
    }
}

/// What one run of the per-host protocol produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostResult {
    /// Blank input; nothing was attempted.
    Invalid(String),
    /// Already licensed in the prior report; the prior row stands.
    Skipped(HostKey),
    /// The host was probed and classified.
    Scanned(ScanOutcome),
}

impl HostResult {
    pub fn outcome(&self) -> Option<&ScanOutcome> {
        match self {
            Self::Scanned(outcome) => Some(outcome),
            _ => None,
        }
    }
}
