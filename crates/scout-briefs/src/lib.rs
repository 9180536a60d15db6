//! Raw brief capture for calibration data.
//!
//! Every raw mid-tier LLM output that passes through the gate is written
//! once to `<scout home>/raw_briefs/{timestamp}.md` so confidence
//! calibration can be tuned offline later. Absolute paths are redacted
//! before anything touches disk; store failures never cancel a gate
//! attempt.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::warn;

/// Replacement token for redacted absolute paths.
pub const REDACTED_PLACEHOLDER: &str = "[PATH_REDACTED]";

// Absolute path patterns that may leak PII (user home, system paths).
// Compile-time list; additions do not affect already-written files.
static ABSOLUTE_PATH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)/Users/[^\s\])"']+"#,
        r#"(?i)/home/[^\s\])"']+"#,
        r#"~/[^\s\])"']+"#,
        r#"[A-Za-z]:\\[^\s\])"']+"#,
        r#"(?i)/tmp/[^\s\])"']+"#,
        r#"(?i)/var/[^\s\])"']+"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static path pattern compiles"))
    .collect()
});

/// Redact absolute paths to prevent PII leakage.
///
/// Returns the sanitized content and whether anything was redacted.
#[must_use]
pub fn sanitize_paths(raw: &str) -> (String, bool) {
    let mut had_absolute = false;
    let mut result = raw.to_string();
    for pattern in ABSOLUTE_PATH_PATTERNS.iter() {
        if pattern.is_match(&result) {
            had_absolute = true;
            result = pattern.replace_all(&result, REDACTED_PLACEHOLDER).into_owned();
        }
    }
    (result, had_absolute)
}

/// Write-once store for raw mid-tier LLM outputs.
#[derive(Debug, Clone)]
pub struct RawBriefStore {
    dir: Utf8PathBuf,
}

impl RawBriefStore {
    /// Store rooted at an explicit directory.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the platform default `<scout home>/raw_briefs/`.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(scout_utils::raw_briefs_dir())
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Store one raw brief. Returns the written path, or `None` when the
    /// input is empty/whitespace or the filesystem rejects the write.
    ///
    /// Filenames are keyed on current UTC down to seconds, extending to
    /// microseconds when that name is taken; `create_new` semantics
    /// guarantee a stored brief is never overwritten, even across
    /// processes sharing the directory.
    pub fn store(&self, raw: &str) -> Option<Utf8PathBuf> {
        if raw.trim().is_empty() {
            return None;
        }

        let (sanitized, had_absolute) = sanitize_paths(raw);
        if had_absolute {
            warn!("raw brief contained absolute paths; redacted before store");
        }
        if let Err(e) = scout_utils::ensure_dir_all(&self.dir) {
            warn!("raw brief store: cannot create {}: {e}", self.dir);
            return None;
        }

        let coarse = self.dir.join(format!("{}.md", Utc::now().format("%Y%m%dT%H%M%S")));
        let mut candidates = vec![coarse];
        // Same-second collisions fall back to microsecond resolution.
        for _ in 0..4 {
            candidates.push(
                self.dir
                    .join(format!("{}.md", Utc::now().format("%Y%m%dT%H%M%S%.6f"))),
            );
        }

        for path in candidates {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(sanitized.as_bytes()) {
                        warn!("raw brief store: write to {path} failed: {e}");
                        return None;
                    }
                    return Some(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    warn!("raw brief store: create {path} failed: {e}");
                    return None;
                }
            }
        }
        warn!("raw brief store: could not find a free filename");
        None
    }

    /// Stored brief paths ordered by modification time descending,
    /// capped at `limit`.
    #[must_use]
    pub fn list(&self, limit: usize) -> Vec<Utf8PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut paths: Vec<(std::time::SystemTime, Utf8PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = Utf8PathBuf::from_path_buf(entry.path()).ok()?;
                if path.extension() != Some("md") {
                    return None;
                }
                let mtime = entry.metadata().ok()?.modified().ok()?;
                Some((mtime, path))
            })
            .collect();
        paths.sort_by(|a, b| b.0.cmp(&a.0));
        paths.into_iter().take(limit).map(|(_, p)| p).collect()
    }
}
