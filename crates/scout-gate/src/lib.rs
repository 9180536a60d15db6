//! Middle-manager gate: decides whether compressed mid-tier LLM output
//! is good enough to hand to a more expensive downstream model.
//!
//! Tier 1 checks deterministic freshness over the dependency closure;
//! Tier 2 compresses the working context through the mid-tier model and
//! parses the self-reported confidence; Tier 3 applies the threshold,
//! expands the context once when declared gaps point at reachable
//! symbols, and escalates to the raw context after a bounded number of
//! failed attempts. Every transition lands in the audit log.

mod gate;
mod prompt;
mod types;

pub use gate::{
    GateConfig, GateRequest, MiddleManagerGate, DEFAULT_CONFIDENCE_THRESHOLD,
    MAX_EXPANDED_CONTEXT, MAX_RETRY_ATTEMPTS,
};
pub use types::{
    ContentSource, DepsGraph, FactBundle, FactHydrator, GateDecision, GateOutcome,
    ParseSymbolRefError, SymbolRef, TrustMetadata,
};
