use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::warn;

use crate::event::{format_ts, Event, EventKind};
use crate::{AuditError, AuditLog};

/// Navigation accuracy derived from the log: the share of `nav` events
/// that did not produce a `validation_fail`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyMetrics {
    pub total_nav: u64,
    pub validation_fail_count: u64,
    pub accuracy_pct: f64,
}

impl AuditLog {
    /// Streaming read of the active file. Returns events matching the
    /// `since` (inclusive) and kind filters, in file order. Malformed
    /// lines are skipped with a logged warning; a trailing line without
    /// its newline is treated as absent, so a post-crash file is always
    /// queryable.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` when the file exists but cannot be read.
    pub fn query(
        &self,
        since: Option<DateTime<Utc>>,
        kind: Option<&EventKind>,
    ) -> Result<Vec<Event>, AuditError> {
        let since_ts = since.map(format_ts);
        let mut results = Vec::new();
        self.for_each_event(|event| {
            if let Some(since_ts) = &since_ts
                && event.ts.as_str() < since_ts.as_str()
            {
                return;
            }
            if let Some(kind) = kind
                && event.event != *kind
            {
                return;
            }
            results.push(event);
        })?;
        Ok(results)
    }

    /// Sum of `cost` over the last `hours` hours, with the window
    /// aligned to the top of the current wall-clock hour.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` when the file exists but cannot be read.
    pub fn hourly_spend(&self, hours: u32) -> Result<f64, AuditError> {
        if hours == 0 {
            return Ok(0.0);
        }
        let now = Utc::now();
        let top_of_hour = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let cutoff = top_of_hour - chrono::Duration::hours(i64::from(hours));
        let events = self.query(Some(cutoff), None)?;
        Ok(events.iter().filter_map(|e| e.cost).sum())
    }

    /// Last `n` matching events, using a bounded ring during the scan so
    /// memory stays O(n) regardless of file size.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` when the file exists but cannot be read.
    pub fn last_events(
        &self,
        n: usize,
        kind: Option<&EventKind>,
    ) -> Result<Vec<Event>, AuditError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut window: VecDeque<Event> = VecDeque::with_capacity(n + 1);
        self.for_each_event(|event| {
            if let Some(kind) = kind
                && event.event != *kind
            {
                return;
            }
            window.push_back(event);
            if window.len() > n {
                window.pop_front();
            }
        })?;
        Ok(window.into())
    }

    /// Percentage of `nav` events since `since` that did not fail
    /// validation. `100.0` when there were no `nav` events at all.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` when the file exists but cannot be read.
    pub fn accuracy_metrics(&self, since: DateTime<Utc>) -> Result<AccuracyMetrics, AuditError> {
        let since_ts = format_ts(since);
        let mut total_nav = 0u64;
        let mut fail_count = 0u64;
        self.for_each_event(|event| {
            if event.ts.as_str() < since_ts.as_str() {
                return;
            }
            match event.event {
                EventKind::Nav => total_nav += 1,
                EventKind::ValidationFail => fail_count += 1,
                _ => {}
            }
        })?;

        let accuracy_pct = if total_nav == 0 {
            100.0
        } else {
            let raw = 100.0 * (total_nav - fail_count.min(total_nav)) as f64 / total_nav as f64;
            (raw * 100.0).round() / 100.0
        };
        Ok(AccuracyMetrics {
            total_nav,
            validation_fail_count: fail_count,
            accuracy_pct,
        })
    }

    /// Stream complete lines from the active file, parsing each as one
    /// event. Opens its own read handle so it tolerates the writer
    /// appending concurrently.
    fn for_each_event(&self, mut f: impl FnMut(Event)) -> Result<(), AuditError> {
        let file = match File::open(self.path()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if !line.ends_with('\n') {
                // Trailing partial line: a write was cut mid-object.
                break;
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(trimmed) {
                Ok(event) => f(event),
                Err(e) => {
                    warn!("audit log: skipping malformed line (corruption recovery): {e}");
                }
            }
        }
        Ok(())
    }
}
