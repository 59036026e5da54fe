//! licscan: Windows license inventory for a fleet of hosts.
//!
//! Pings each host, runs `slmgr.vbs /dli` locally or through a
//! remote-execution transport, and merges the edition and license status
//! into a CSV report. Hosts already recorded as licensed are skipped.

pub mod config;
pub mod error;
pub mod hosts;
pub mod logging;
pub mod orchestrator;
pub mod ping;
pub mod probe;
pub mod query;
pub mod report;
pub mod resolve;
pub mod runner;
