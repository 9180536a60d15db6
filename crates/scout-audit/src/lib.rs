//! Append-only JSONL event log for LLM navigation accounting.
//!
//! Survives SIGKILL and partial writes, rotates at a size threshold, and
//! answers cost/accuracy queries in streaming fashion. The write path is
//! a single atomic line append under an internal lock; the read path
//! opens the file independently and skips malformed lines.
//!
//! ```no_run
//! use scout_audit::{AuditLog, EventFields, EventKind};
//!
//! let log = AuditLog::open_default()?;
//! log.log(
//!     EventKind::Nav,
//!     EventFields::new()
//!         .cost(0.000_003)
//!         .model("llama-3.1-8b-instant")
//!         .tokens(42, 28),
//! );
//! let spend = log.hourly_spend(1)?;
//! # Ok::<(), scout_audit::AuditError>(())
//! ```

use thiserror::Error;

mod event;
mod log;
mod query;

pub use event::{format_ts, Event, EventFields, EventKind};
pub use log::{AuditLog, AuditOptions, FSYNC_EVERY_N_LINES, FSYNC_INTERVAL, ROTATION_SIZE_BYTES};
pub use query::AccuracyMetrics;

/// Errors surfaced by explicit audit-log operations (`open`, `flush`,
/// `query`). The `log` write path never returns these; write failures
/// are reported at warning level and swallowed because losing an
/// observability event must never break a product operation.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit event encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
}
