use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use scout_utils::session_id;

/// Kind tag for an audit event.
///
/// The enumeration is closed over the kinds scout itself emits; lines
/// written by newer or foreign tooling deserialize into `Other` so that
/// queries over a shared log never reject a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Nav,
    Brief,
    Cascade,
    ValidationFail,
    Budget,
    Skip,
    Trigger,
    Tldr,
    TldrAutoGenerated,
    Deep,
    DocSync,
    CommitDraft,
    PrSnippet,
    ImpactAnalysis,
    ModuleBrief,
    PrSynthesis,
    RoastWithDocs,
    GateCompress,
    GateEscalate,
    Other(String),
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Nav => "nav",
            EventKind::Brief => "brief",
            EventKind::Cascade => "cascade",
            EventKind::ValidationFail => "validation_fail",
            EventKind::Budget => "budget",
            EventKind::Skip => "skip",
            EventKind::Trigger => "trigger",
            EventKind::Tldr => "tldr",
            EventKind::TldrAutoGenerated => "tldr_auto_generated",
            EventKind::Deep => "deep",
            EventKind::DocSync => "doc_sync",
            EventKind::CommitDraft => "commit_draft",
            EventKind::PrSnippet => "pr_snippet",
            EventKind::ImpactAnalysis => "impact_analysis",
            EventKind::ModuleBrief => "module_brief",
            EventKind::PrSynthesis => "pr_synthesis",
            EventKind::RoastWithDocs => "roast_with_docs",
            EventKind::GateCompress => "gate_compress",
            EventKind::GateEscalate => "gate_escalate",
            EventKind::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "nav" => EventKind::Nav,
            "brief" => EventKind::Brief,
            "cascade" => EventKind::Cascade,
            "validation_fail" => EventKind::ValidationFail,
            "budget" => EventKind::Budget,
            "skip" => EventKind::Skip,
            "trigger" => EventKind::Trigger,
            "tldr" => EventKind::Tldr,
            "tldr_auto_generated" => EventKind::TldrAutoGenerated,
            "deep" => EventKind::Deep,
            "doc_sync" => EventKind::DocSync,
            "commit_draft" => EventKind::CommitDraft,
            "pr_snippet" => EventKind::PrSnippet,
            "impact_analysis" => EventKind::ImpactAnalysis,
            "module_brief" => EventKind::ModuleBrief,
            "pr_synthesis" => EventKind::PrSynthesis,
            "roast_with_docs" => EventKind::RoastWithDocs,
            "gate_compress" => EventKind::GateCompress,
            "gate_escalate" => EventKind::GateEscalate,
            other => EventKind::Other(other.to_string()),
        })
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Format a timestamp the way the log stores it: ISO-8601 UTC with
/// millisecond precision and a `Z` suffix. Lexicographic order on the
/// formatted string matches chronological order, which is what `query`
/// relies on for `since` filtering.
#[must_use]
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A single immutable audit observation; one JSON object per log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub ts: String,
    pub event: EventKind,
    #[serde(default)]
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_t: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_t: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

/// Optional event fields, built up caller-side and handed to
/// [`AuditLog::log`](crate::AuditLog::log).
///
/// The recognized fields are typed; anything else goes through
/// [`EventFields::extra`], which keeps the value as JSON when it
/// serializes and stringifies it otherwise.
#[derive(Debug, Clone, Default)]
pub struct EventFields {
    cost: Option<f64>,
    model: Option<String>,
    input_t: Option<u64>,
    output_t: Option<u64>,
    files: Option<Vec<String>>,
    reason: Option<String>,
    confidence: Option<u32>,
    duration_ms: Option<u64>,
    config: Option<Value>,
    session_id: Option<String>,
    extras: Map<String, Value>,
}

impl EventFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// USD cost. Omit when no API call was made; LLM clients report a
    /// small epsilon when pricing rounds to zero so the log can
    /// distinguish "call made" from "no call".
    #[must_use]
    pub fn cost(mut self, usd: f64) -> Self {
        self.cost = Some(usd);
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn tokens(mut self, input_t: u64, output_t: u64) -> Self {
        self.input_t = Some(input_t);
        self.output_t = Some(output_t);
        self
    }

    #[must_use]
    pub fn files(mut self, files: Vec<String>) -> Self {
        self.files = Some(files);
        self
    }

    /// Short code, e.g. `hallucinated_path` or `hourly_budget_exhausted`.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Integer percentage in `[0, 100]`.
    #[must_use]
    pub fn confidence(mut self, pct: u32) -> Self {
        self.confidence = Some(pct);
        self
    }

    #[must_use]
    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Snapshot of configuration at event time.
    #[must_use]
    pub fn config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the process session id for this event only.
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach an arbitrary extra field. Values that fail JSON conversion
    /// are stringified instead of discarded.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Serialize + fmt::Debug) -> Self {
        let json = match serde_json::to_value(&value) {
            Ok(v) => v,
            Err(_) => Value::String(format!("{value:?}")),
        };
        self.extras.insert(key.into(), json);
        self
    }

    pub(crate) fn into_event(self, kind: EventKind, now: DateTime<Utc>) -> Event {
        Event {
            ts: format_ts(now),
            event: kind,
            session_id: self.session_id.unwrap_or_else(|| session_id().to_string()),
            cost: self.cost,
            model: self.model,
            input_t: self.input_t,
            output_t: self.output_t,
            files: self.files,
            reason: self.reason,
            confidence: self.confidence,
            duration_ms: self.duration_ms,
            config: self.config,
            extras: self.extras,
        }
    }
}
