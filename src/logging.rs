//! Tracing setup.
//!
//! Alert runs keep a JSON audit trail under `~/.safesearch/logs/`, so every
//! send, failure and history write can be reviewed after the fact, while
//! the terminal only shows warnings. Contact management logs to stderr.
//! Both honour `RUST_LOG`.

use std::path::Path;

use anyhow::Context;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Prefix of the daily-rotated audit files (`safesearch.log.YYYY-MM-DD`).
pub const AUDIT_FILE_PREFIX: &str = "safesearch.log";

/// Keeps the audit writer alive. Dropping it flushes pending entries.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Build the alert-run dispatcher without installing it.
///
/// The JSON audit layer records `info` and above; the stderr layer only
/// `warn` and above.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn audit_dispatch(logs_dir: &Path) -> anyhow::Result<(Dispatch, LoggingGuard)> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(logs_dir, AUDIT_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let audit = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(filter_or("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter_or("warn"));

    let subscriber = tracing_subscriber::registry().with(audit).with(console);
    Ok((Dispatch::new(subscriber), LoggingGuard { _guard: guard }))
}

/// Install the audit dispatcher for an alert run.
///
/// An already installed global subscriber is left in place.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_audit(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    let (dispatch, guard) = audit_dispatch(logs_dir)?;
    let _ = tracing::dispatcher::set_global_default(dispatch);
    Ok(guard)
}

/// Stderr-only logging for contact management (default: `warn`).
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or("warn"))
        .with_writer(std::io::stderr)
        .try_init();
}
