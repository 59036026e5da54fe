//! Debug log setup.
//!
//! Initialized once at process start. Every event goes to the append-only
//! debug log, one timestamped line each; warnings and errors are mirrored to
//! stderr, filtered by `RUST_LOG`.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{Result, ScanError};

const FILE_FILTER: &str = "info,licscan=debug,licscan_core=debug";

/// Keeps the debug log open. Events are written unbuffered; on drop the
/// file's data is synced to disk.
pub struct LogGuard {
    file: Arc<File>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync_data() {
            tracing::warn!(error = %e, "Could not sync debug log");
        }
    }
}

fn open_debug_log(path: &Path) -> io::Result<Arc<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

/// Install the global subscriber. Call once.
pub fn init(debug_log: &Path, json: bool) -> Result<LogGuard> {
    let file = open_debug_log(debug_log)?;

    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_writer(file.clone())
            .with_ansi(false)
            .with_filter(EnvFilter::new(FILE_FILTER))
    });
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_writer(file.clone())
            .with_filter(EnvFilter::new(FILE_FILTER))
    });

    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| ScanError::Logging(e.to_string()))?;

    Ok(LogGuard { file })
}
