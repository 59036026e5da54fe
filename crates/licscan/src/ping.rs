//! Reachability probe.
//!
//! A single echo request through the system `ping` executable with a short
//! fixed deadline. Cheap compared to a remote-execution attempt that would
//! otherwise run into the full query timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Extra wall-clock allowance on top of ping's own deadline.
const PING_GRACE: Duration = Duration::from_secs(1);

/// Answers whether a host responds to a reachability probe.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn is_reachable(&self, host: &str) -> bool;
}

/// `ping` with one packet and a fixed deadline.
#[derive(Debug, Clone)]
pub struct SystemPing {
    deadline: Duration,
}

impl SystemPing {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Platform-specific arguments for a single bounded echo request.
    fn args(&self, host: &str) -> Vec<String> {
        if cfg!(windows) {
            vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                self.deadline.as_millis().to_string(),
                host.to_string(),
            ]
        } else {
            let secs = self.deadline.as_secs_f64().ceil().max(1.0) as u64;
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                secs.to_string(),
                host.to_string(),
            ]
        }
    }
}

#[async_trait]
impl Pinger for SystemPing {
    async fn is_reachable(&self, host: &str) -> bool {
        let status = Command::new("ping")
            .args(self.args(host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.deadline + PING_GRACE, status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::warn!(host = %host, error = %e, "Could not run ping");
                false
            }
            Err(_) => false,
        }
    }
}
