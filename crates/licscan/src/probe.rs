//! Per-host probe-and-query protocol.
//!
//! Resolve → skip check → ping → query → classify. Every path ends in a
//! `HostResult`; failures are recorded on the host and never propagate.

use std::sync::Arc;
use std::time::Duration;

use licscan_core::{HostKey, HostResult, OutcomeKind, ScanOutcome};

use crate::config::ScanConfig;
use crate::ping::{Pinger, SystemPing};
use crate::query::{self, Dispatch, LocalAliases, QueryCommand};
use crate::report::Snapshot;
use crate::resolve::{self, Resolver, SystemResolver};
use crate::runner::{CommandRunner, ProcessRunner, RunnerError};

/// Runs the protocol for one host at a time; shared by all workers.
pub struct HostProber {
    resolver: Arc<dyn Resolver>,
    pinger: Arc<dyn Pinger>,
    runner: Arc<dyn CommandRunner>,
    query: QueryCommand,
    aliases: LocalAliases,
    query_timeout: Duration,
}

impl HostProber {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        pinger: Arc<dyn Pinger>,
        runner: Arc<dyn CommandRunner>,
        query: QueryCommand,
        aliases: LocalAliases,
        query_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            pinger,
            runner,
            query,
            aliases,
            query_timeout,
        }
    }

    /// Prober wired to the system resolver, `ping`, and real processes.
    pub fn from_config(config: &ScanConfig) -> Self {
        let work_dir = config
            .work_dir
            .clone()
            .unwrap_or_else(crate::config::exe_dir);
        Self::new(
            Arc::new(SystemResolver),
            Arc::new(SystemPing::new(Duration::from_millis(config.ping_timeout_ms))),
            Arc::new(ProcessRunner),
            QueryCommand::new(&config.psexec_path, &config.slmgr_path, Some(work_dir)),
            LocalAliases::from_env(&config.local_aliases),
            Duration::from_secs(config.query_timeout_secs),
        )
    }

    /// Run the full protocol for one raw host identifier.
    pub async fn probe(&self, raw: &str, snapshot: &Snapshot) -> HostResult {
        let host = match resolve::normalize(self.resolver.as_ref(), raw).await {
            Ok(host) => host,
            Err(e) => {
                tracing::error!(input = ?raw, error = %e, "Invalid host identifier");
                return HostResult::Invalid(raw.to_string());
            }
        };

        if snapshot.get(&host.key).is_some_and(|row| row.is_licensed()) {
            tracing::info!(host = %host.key, "Already licensed, skipping");
            return HostResult::Skipped(host.key);
        }

        if !self.pinger.is_reachable(&host.name).await {
            tracing::info!(host = %host.key, "Ping failed");
            return HostResult::Scanned(ScanOutcome::offline(host.key));
        }

        let dispatch = self.aliases.dispatch_for(&host.name);
        HostResult::Scanned(self.query(host.key, &host.name, dispatch).await)
    }

    async fn query(&self, key: HostKey, name: &str, dispatch: Dispatch) -> ScanOutcome {
        let cmd = self.query.build(name, dispatch);
        tracing::info!(host = %key, dispatch = ?dispatch, command = %cmd.display(), "Running license query");

        match self.runner.run(&cmd, self.query_timeout).await {
            Ok(output) if output.success() => {
                let combined = format!("{}\n{}", output.stdout, output.stderr);
                let info = query::parse_license_output(&combined);
                tracing::info!(
                    host = %key,
                    edition = %info.edition,
                    status = %info.status,
                    "License query complete"
                );
                ScanOutcome {
                    host: key,
                    kind: OutcomeKind::Queried,
                    edition: info.edition,
                    license_status: info.status,
                    debug: format!("Stdout:\n{}\nStderr:\n{}", output.stdout, output.stderr),
                }
            }
            Ok(output) => {
                let reason = match output.code {
                    Some(code) => format!("Query exited with code {code}"),
                    None => "Query terminated without an exit code".to_string(),
                };
                tracing::error!(host = %key, code = ?output.code, "License query failed");
                ScanOutcome::failed(key, format!("{reason}\nStderr: {}", output.stderr))
            }
            Err(RunnerError::Timeout(_)) => {
                tracing::error!(host = %key, timeout_secs = self.query_timeout.as_secs(), "License query timed out");
                ScanOutcome::timed_out(key, self.query_timeout.as_secs())
            }
            Err(e) => {
                tracing::error!(host = %key, error = %e, "License query could not start");
                ScanOutcome::failed(key, e.to_string())
            }
        }
    }
}
