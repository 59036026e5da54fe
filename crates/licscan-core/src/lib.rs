//! licscan-core: Shared types and error handling for the licscan inventory tool.
//!
//! This crate provides the foundational types used by the scanner:
//! - `HostKey`, the canonical identity used for dedup and report merge
//! - `ReportRow`, one persisted line of the license report
//! - `ScanOutcome` and `HostResult`, the per-host result of a scan run
//! - Common error types

pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{HostKey, HostResult, OutcomeKind, ReportRow, ScanOutcome};
