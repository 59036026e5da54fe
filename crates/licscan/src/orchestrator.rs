//! Scan orchestration.
//!
//! Spawns one tokio task per input host. A semaphore bounds how many hosts
//! are probed at once. Workers hand their result back over a channel; the
//! orchestrator is the only owner of the result and debug buffers.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use licscan_core::{HostKey, HostResult, OutcomeKind, ReportRow, ScanOutcome};

use crate::config::ScanConfig;
use crate::error::Result;
use crate::probe::HostProber;
use crate::report::{self, ReportMode, ReportStore, Snapshot};

/// Everything one run produced, in completion order.
#[derive(Debug)]
pub struct ScanRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcomes: Vec<ScanOutcome>,
    pub skipped: Vec<HostKey>,
    pub invalid: Vec<String>,
    pub debug_entries: Vec<String>,
}

impl ScanRun {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            outcomes: Vec::new(),
            skipped: Vec::new(),
            invalid: Vec::new(),
            debug_entries: Vec::new(),
        }
    }

    fn record(&mut self, result: HostResult) {
        match result {
            HostResult::Scanned(outcome) => {
                self.debug_entries
                    .push(format!("Host: {}\n{}\n", outcome.host, outcome.debug));
                self.outcomes.push(outcome);
            }
            HostResult::Skipped(key) => self.skipped.push(key),
            HostResult::Invalid(raw) => self.invalid.push(raw),
        }
    }

    /// Report rows for this run's outcomes, in completion order.
    pub fn rows(&self) -> Vec<ReportRow> {
        self.outcomes.iter().map(ScanOutcome::to_row).collect()
    }

    /// Whether any host ended in Error or Timeout.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.kind.is_failure())
    }

    pub fn summary(&self) -> RunSummary {
        let count = |kind: OutcomeKind| self.outcomes.iter().filter(|o| o.kind == kind).count();
        RunSummary {
            queried: count(OutcomeKind::Queried),
            offline: count(OutcomeKind::Offline),
            failed: count(OutcomeKind::Failed),
            timed_out: count(OutcomeKind::TimedOut),
            skipped: self.skipped.len(),
            invalid: self.invalid.len(),
            duration: self.duration,
        }
    }
}

/// Per-classification counts for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub queried: usize,
    pub offline: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub duration: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.queried + self.offline + self.failed + self.timed_out + self.skipped + self.invalid
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hosts: {} queried, {} offline, {} error, {} timeout, {} already licensed, {} invalid ({:.1}s)",
            self.total(),
            self.queried,
            self.offline,
            self.failed,
            self.timed_out,
            self.skipped,
            self.invalid,
            self.duration.as_secs_f64()
        )
    }
}

/// Fans hosts out over a bounded worker pool.
pub struct ScanOrchestrator {
    prober: Arc<HostProber>,
    workers: usize,
}

impl ScanOrchestrator {
    pub fn new(prober: HostProber, workers: usize) -> Self {
        Self {
            prober: Arc::new(prober),
            workers: workers.max(1),
        }
    }

    /// Probe every host and collect results as they complete.
    ///
    /// Input entries are not deduplicated. The snapshot is shared read-only
    /// with every worker.
    pub async fn run(&self, hosts: &[String], snapshot: Arc<Snapshot>) -> ScanRun {
        let start = Instant::now();
        let mut run = ScanRun::new(Uuid::new_v4());

        tracing::info!(
            run_id = %run.run_id,
            hosts = hosts.len(),
            workers = self.workers,
            "Starting license scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let (tx, mut rx) = mpsc::channel::<HostResult>(self.workers);
        let mut handles = Vec::with_capacity(hosts.len());

        for host in hosts {
            let prober = self.prober.clone();
            let snapshot = snapshot.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let host = host.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = prober.probe(&host, &snapshot).await;
                let _ = tx.send(result).await;
            }));
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            run.record(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Host scan task panicked");
            }
        }

        run.duration = start.elapsed();
        let summary = run.summary();
        tracing::info!(
            run_id = %run.run_id,
            queried = summary.queried,
            offline = summary.offline,
            failed = summary.failed,
            timed_out = summary.timed_out,
            skipped = summary.skipped,
            invalid = summary.invalid,
            duration_ms = run.duration.as_millis(),
            "License scan complete"
        );

        run
    }
}

/// Execute a full inventory: load report → scan → merge → persist.
pub async fn run_inventory(
    orchestrator: &ScanOrchestrator,
    config: &ScanConfig,
    hosts: &[String],
) -> Result<ScanRun> {
    let store = ReportStore::new(&config.report_path);
    let prior = store.load_report()?;

    let run = orchestrator.run(hosts, Arc::new(prior.rows.clone())).await;

    let mode = if config.append {
        ReportMode::Append
    } else {
        ReportMode::Overwrite
    };
    let plan = report::plan_write(&prior, &run.rows(), &run.skipped, mode);
    store.apply(&plan)?;

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(host: &str) -> HostKey {
        HostKey::from_name(host).unwrap()
    }

    #[test]
    fn test_record_routes_results() {
        let mut run = ScanRun::new(Uuid::nil());
        run.record(HostResult::Scanned(ScanOutcome::offline(key("host1"))));
        run.record(HostResult::Skipped(key("host2")));
        run.record(HostResult::Invalid(String::new()));
        run.record(HostResult::Scanned(ScanOutcome::timed_out(key("host3"), 90)));

        assert_eq!(run.outcomes.len(), 2);
        assert_eq!(run.skipped, vec![key("host2")]);
        assert_eq!(run.invalid, vec![String::new()]);
        assert_eq!(
            run.debug_entries,
            vec![
                "Host: HOST1\nPing failed\n".to_string(),
                "Host: HOST3\nTimedOut after 90s\n".to_string()
            ]
        );
        assert!(run.has_failures());

        let summary = run.summary();
        assert_eq!(summary.offline, 1);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_offline_only_run_has_no_failures() {
        let mut run = ScanRun::new(Uuid::nil());
        run.record(HostResult::Scanned(ScanOutcome::offline(key("host1"))));
        assert!(!run.has_failures());
        assert_eq!(run.rows()[0].edition, "Offline");
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            queried: 2,
            failed: 1,
            skipped: 3,
            ..Default::default()
        };
        assert_eq!(
            summary.to_string(),
            "6 hosts: 2 queried, 0 offline, 1 error, 0 timeout, 3 already licensed, 0 invalid (0.0s)"
        );
    }
}
