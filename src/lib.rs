//! scout - audited context compression for LLM-assisted repository tooling
//!
//! Scout shrinks the cost of feeding large language models accurate
//! context about a source repository. Every billable or diagnostic
//! action lands in a crash-safe JSONL audit log, and every compressed
//! answer must clear a confidence gate before it reaches a more
//! expensive downstream model.
//!
//! The subsystems live in their own crates and compose by injection:
//!
//! - [`audit`] — append-only event log with rotation and streaming queries
//! - [`briefs`] — write-once raw brief capture with path redaction
//! - [`brief_parser`] — deterministic confidence/gap extraction
//! - [`llm`] — LLM client seam and the Groq backend
//! - [`gate`] — the middle-manager gate state machine

pub use scout_audit as audit;
pub use scout_brief_parser as brief_parser;
pub use scout_briefs as briefs;
pub use scout_gate as gate;
pub use scout_llm as llm;
pub use scout_utils as utils;

// Core types re-exported for external consumers
pub use scout_audit::{AccuracyMetrics, AuditError, AuditLog, Event, EventFields, EventKind};
pub use scout_brief_parser::{BriefParseError, BriefParser, ParsedBrief};
pub use scout_briefs::RawBriefStore;
pub use scout_gate::{
    ContentSource, DepsGraph, FactBundle, FactHydrator, GateConfig, GateDecision, GateOutcome,
    GateRequest, MiddleManagerGate, SymbolRef, TrustMetadata,
};
pub use scout_llm::{CompletionRequest, GroqClient, LlmClient, LlmError, LlmResponse};
