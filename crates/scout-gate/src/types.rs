use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Terminal outcome of a gate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Compressed output cleared the threshold and may be handed on.
    Pass,
    /// Compressed output was rejected outright.
    Reject,
    /// The caller gets the raw context for a more expensive model.
    Escalate,
}

/// Where the decision's `content` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Compressed,
    RawFacts,
    RawTldr,
}

/// Decision from the gate: pass with compressed prose, or escalate with
/// the raw working context. The gate never errors at its boundary; an
/// escalation is still a well-typed answer.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub outcome: GateOutcome,
    pub content: String,
    /// Parsed confidence of the attempt that produced this decision.
    pub confidence: Option<f64>,
    pub gaps: Vec<String>,
    pub source: ContentSource,
    pub suspicious: bool,
    /// 1-based index of the LLM attempt that produced the decision;
    /// 0 for the freshness short circuit.
    pub attempt: u32,
    pub has_gaps_declaration: bool,
    /// Canonical `path::symbol` strings added during expansion.
    pub expanded_symbols: Vec<String>,
    /// Confidence observed on the first attempt, captured when the gate
    /// expands so callers can report the before/after delta.
    pub initial_confidence: Option<f64>,
    /// Accumulated LLM spend across every attempt of this run.
    pub cost_usd: f64,
}

/// A `(repo-relative path, symbol name)` pair with the canonical
/// `path::symbol` string form used in logs and gap declarations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    pub path: Utf8PathBuf,
    pub symbol: String,
}

impl SymbolRef {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, symbol: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.path, self.symbol)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("symbol ref must have the form path::symbol, got '{0}'")]
pub struct ParseSymbolRefError(String);

impl FromStr for SymbolRef {
    type Err = ParseSymbolRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("::") {
            Some((path, symbol)) if !path.is_empty() && !symbol.is_empty() => {
                Ok(Self::new(path, symbol))
            }
            _ => Err(ParseSymbolRefError(s.to_string())),
        }
    }
}

/// Trust signals over the dependency closure of a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustMetadata {
    pub invalidation_cascade_triggered: bool,
    /// Fraction of the closure whose facts are stale, in `[0.0, 1.0]`.
    pub stale_ratio: f64,
}

/// Opaque projection of AST-derived facts into prompt text. The gate
/// never parses or enumerates the contents.
pub trait FactBundle: Send + Sync {
    /// Deterministic, length-bounded rendering into prompt text.
    fn to_prompt(&self, max_chars: usize) -> String;
    /// Stable hex digest of the underlying facts.
    fn checksum(&self) -> String;
    /// True when the bundle carries no facts worth rendering.
    fn is_empty(&self) -> bool;
}

/// Read-only view of the repository dependency graph.
pub trait DepsGraph: Send + Sync {
    /// Node ids for the closure of the query symbols.
    fn context_package(&self, query_symbols: &[SymbolRef]) -> Vec<String>;
    /// Trust signals over a set of nodes.
    fn trust_metadata(&self, nodes: &[String]) -> TrustMetadata;
    fn repo_root(&self) -> &Utf8Path;
}

/// External collaborator that loads additional facts for symbols the
/// model declared as gaps.
#[async_trait]
pub trait FactHydrator: Send + Sync {
    /// Hydrate a supplementary fact bundle. May do I/O.
    ///
    /// # Errors
    ///
    /// Any error is non-fatal to the gate; the attempt simply counts as
    /// a failure.
    async fn hydrate(
        &self,
        symbols: &[SymbolRef],
        deps_graph: Option<&dyn DepsGraph>,
        repo_root: &Utf8Path,
        max_facts: usize,
        max_depth: usize,
    ) -> anyhow::Result<Box<dyn FactBundle>>;
}
