use camino::Utf8PathBuf;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use scout_audit::{AuditLog, EventFields, EventKind};
use scout_brief_parser::{BriefParser, ParsedBrief};
use scout_briefs::RawBriefStore;
use scout_llm::{CompletionRequest, LlmClient, GROQ_70B_MODEL};
use scout_utils::truncate_chars;

use crate::prompt::{assemble_prompt, build_confidence_prompt, SYSTEM_MESSAGE};
use crate::types::{
    ContentSource, DepsGraph, FactBundle, FactHydrator, GateDecision, GateOutcome, SymbolRef,
};

/// Conservative default: compressed output below this is not handed on.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;
/// Attempts counted before escalating to raw context.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;
/// Character cap on the working context across expansions.
pub const MAX_EXPANDED_CONTEXT: usize = 40_000;

/// Supplementary fact bundles render at this budget.
const SUPPLEMENT_CHARS: usize = 8_000;
const HYDRATE_MAX_FACTS: usize = 30;
const HYDRATE_MAX_DEPTH: usize = 1;

// Extracts path::symbol refs out of free-form gap text, e.g.
// "impact on resident_memory.py::serialize".
static SYMBOL_FROM_GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S+\.[A-Za-z][A-Za-z0-9]*)::(\w+)").expect("static regex"));

/// Gate tuning; read-only for the lifetime of a gate instance.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub confidence_threshold: f64,
    pub max_attempts: u32,
    pub max_expanded_context: usize,
    /// Mid-tier model identifier, fixed across attempts.
    pub model: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_attempts: MAX_RETRY_ATTEMPTS,
            max_expanded_context: MAX_EXPANDED_CONTEXT,
            model: GROQ_70B_MODEL.to_string(),
        }
    }
}

/// One gate invocation: the question, exactly one of a fact bundle or a
/// raw-TLDR context, and the optional collaborators.
pub struct GateRequest<'a> {
    question: &'a str,
    facts: Option<&'a dyn FactBundle>,
    raw_tldr_context: Option<&'a str>,
    deps_graph: Option<&'a dyn DepsGraph>,
    query_symbols: Vec<SymbolRef>,
    repo_root: Option<Utf8PathBuf>,
    expansion_depth: u32,
}

impl<'a> GateRequest<'a> {
    #[must_use]
    pub fn new(question: &'a str) -> Self {
        Self {
            question,
            facts: None,
            raw_tldr_context: None,
            deps_graph: None,
            query_symbols: Vec::new(),
            repo_root: None,
            expansion_depth: 1,
        }
    }

    #[must_use]
    pub fn facts(mut self, facts: &'a dyn FactBundle) -> Self {
        self.facts = Some(facts);
        self
    }

    #[must_use]
    pub fn raw_tldr(mut self, context: &'a str) -> Self {
        self.raw_tldr_context = Some(context);
        self
    }

    #[must_use]
    pub fn deps_graph(mut self, graph: &'a dyn DepsGraph) -> Self {
        self.deps_graph = Some(graph);
        self
    }

    #[must_use]
    pub fn query_symbols(mut self, symbols: Vec<SymbolRef>) -> Self {
        self.query_symbols = symbols;
        self
    }

    #[must_use]
    pub fn repo_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.repo_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn expansion_depth(mut self, depth: u32) -> Self {
        self.expansion_depth = depth;
        self
    }
}

/// Gates context compression for downstream consumers.
///
/// Tier 1: deterministic freshness over the dependency closure.
/// Tier 2: compress via the mid-tier model, parse with [`BriefParser`].
/// Tier 3: confidence threshold, bounded expansion, retry, and finally
/// escalation to the raw working context.
pub struct MiddleManagerGate {
    config: GateConfig,
    llm: Arc<dyn LlmClient>,
    audit: Arc<AuditLog>,
    briefs: RawBriefStore,
    parser: BriefParser,
    hydrator: Option<Arc<dyn FactHydrator>>,
}

impl MiddleManagerGate {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, audit: Arc<AuditLog>) -> Self {
        Self {
            config: GateConfig::default(),
            llm,
            audit,
            briefs: RawBriefStore::default_location(),
            parser: BriefParser::new(),
            hydrator: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_briefs(mut self, briefs: RawBriefStore) -> Self {
        self.briefs = briefs;
        self
    }

    #[must_use]
    pub fn with_hydrator(mut self, hydrator: Arc<dyn FactHydrator>) -> Self {
        self.hydrator = Some(hydrator);
        self
    }

    /// Validate and compress context for the caller.
    ///
    /// Never errors at the boundary: every downstream failure either
    /// becomes a retryable attempt or, once `max_attempts` failures have
    /// accumulated, an `Escalate` decision carrying the raw working
    /// context. The audit log records every transition.
    pub async fn validate_and_compress(&self, mut request: GateRequest<'_>) -> GateDecision {
        let repo_root: Option<Utf8PathBuf> = request
            .repo_root
            .clone()
            .or_else(|| request.deps_graph.map(|g| g.repo_root().to_owned()));

        let use_facts = request.facts.is_some();
        let raw_source = if use_facts {
            ContentSource::RawFacts
        } else {
            ContentSource::RawTldr
        };
        let mut context = match request.facts {
            Some(facts) => facts.to_prompt(self.config.max_expanded_context),
            None => request.raw_tldr_context.unwrap_or("").trim().to_string(),
        };

        // Tier 1: deterministic freshness short circuit.
        if let Some(graph) = request.deps_graph
            && !request.query_symbols.is_empty()
        {
            let nodes = graph.context_package(&request.query_symbols);
            let trust = graph.trust_metadata(&nodes);
            if trust.invalidation_cascade_triggered && trust.stale_ratio > 0.5 {
                debug!(
                    stale_ratio = trust.stale_ratio,
                    "tier 1: majority of closure is stale, escalating to raw"
                );
                self.audit.log(
                    EventKind::GateCompress,
                    EventFields::new()
                        .reason("stale_cascade")
                        .confidence(0)
                        .config(json!({ "stale_ratio": trust.stale_ratio })),
                );
                return GateDecision {
                    outcome: GateOutcome::Escalate,
                    content: context,
                    confidence: None,
                    gaps: Vec::new(),
                    source: raw_source,
                    suspicious: false,
                    attempt: 0,
                    has_gaps_declaration: false,
                    expanded_symbols: Vec::new(),
                    initial_confidence: None,
                    cost_usd: 0.0,
                };
            }
        }

        if context.trim().is_empty() {
            warn!("gate received empty context; compression will run straight to escalation");
        }

        let mut query_symbols = std::mem::take(&mut request.query_symbols);
        let mut expansion_depth = request.expansion_depth;
        let mut attempt: u32 = 0;
        let mut failures: u32 = 0;
        let mut last_error: Option<String> = None;
        let mut expanded_symbols: Vec<String> = Vec::new();
        let mut initial_confidence: Option<f64> = None;
        let mut total_cost: f64 = 0.0;

        while failures < self.config.max_attempts {
            attempt += 1;

            if context.chars().count() > self.config.max_expanded_context {
                warn!("working context over budget, truncating");
                context = truncate_chars(&context, self.config.max_expanded_context).to_string();
            }

            let confidence_prompt = build_confidence_prompt(request.question, &query_symbols);
            let full_prompt = assemble_prompt(&confidence_prompt, &context, request.question);

            let response = match self
                .llm
                .complete(
                    CompletionRequest::new(full_prompt, self.config.model.clone())
                        .with_system(SYSTEM_MESSAGE)
                        .with_max_tokens(1024),
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let error = e.to_string();
                    warn!("gate llm call failed (attempt {attempt}): {error}");
                    self.audit.log(
                        EventKind::GateCompress,
                        EventFields::new()
                            .reason("api_error")
                            .config(json!({ "attempt": attempt, "error": error })),
                    );
                    last_error = Some(error);
                    failures += 1;
                    continue;
                }
            };
            total_cost += response.cost_usd;

            // Raw output forks to the brief store for calibration before
            // any parsing or filtering.
            let raw_brief_path = self.briefs.store(&response.content);

            let parsed = match self.parser.parse(&response.content) {
                Ok(parsed) if parsed.has_confidence_signal => parsed,
                Ok(_) => {
                    self.log_parse_fail(attempt, "no confidence signal", raw_brief_path.as_deref());
                    last_error = Some("no confidence signal".to_string());
                    failures += 1;
                    continue;
                }
                Err(e) => {
                    let error = e.to_string();
                    self.log_parse_fail(attempt, &error, raw_brief_path.as_deref());
                    last_error = Some(error);
                    failures += 1;
                    continue;
                }
            };

            let mut config = json!({
                "gaps": &parsed.gaps,
                "suspicious": parsed.suspicious,
                "attempt": attempt,
            });
            if let Some(path) = &raw_brief_path {
                config["raw_brief_path"] = json!(path.as_str());
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let confidence_pct = (parsed.confidence_score * 100.0).round() as u32;
            self.audit.log(
                EventKind::GateCompress,
                EventFields::new()
                    .cost(response.cost_usd)
                    .confidence(confidence_pct)
                    .model(&self.config.model)
                    .config(config),
            );

            // Tier 3: confidence threshold.
            if parsed.confidence_score >= self.config.confidence_threshold && !parsed.suspicious {
                return GateDecision {
                    outcome: GateOutcome::Pass,
                    content: parsed.analysis,
                    confidence: Some(parsed.confidence_score),
                    gaps: parsed.gaps,
                    source: ContentSource::Compressed,
                    suspicious: false,
                    attempt,
                    has_gaps_declaration: parsed.has_gaps_declaration,
                    expanded_symbols,
                    initial_confidence,
                    cost_usd: total_cost,
                };
            }

            last_error = Some(if parsed.confidence_score < self.config.confidence_threshold {
                format!(
                    "confidence {:.2} < {:.2}",
                    parsed.confidence_score, self.config.confidence_threshold
                )
            } else {
                "suspicious (missing gaps declaration)".to_string()
            });

            // Bounded expansion: the attempt re-enters with fresh facts
            // and does not count toward max_attempts.
            if expansion_depth > 0
                && self
                    .try_expand(
                        &parsed,
                        &request,
                        repo_root.as_deref(),
                        &mut context,
                        &mut query_symbols,
                        &mut expanded_symbols,
                        &mut initial_confidence,
                    )
                    .await
            {
                expansion_depth -= 1;
                continue;
            }

            failures += 1;
        }

        debug!("gate: max attempts reached, escalating to raw");
        self.audit.log(
            EventKind::GateEscalate,
            EventFields::new().reason("max_retries").config(json!({
                "last_error": last_error,
                "attempts": self.config.max_attempts,
            })),
        );
        GateDecision {
            outcome: GateOutcome::Escalate,
            content: context,
            confidence: None,
            gaps: Vec::new(),
            source: raw_source,
            suspicious: false,
            attempt,
            has_gaps_declaration: false,
            expanded_symbols,
            initial_confidence,
            cost_usd: total_cost,
        }
    }

    fn log_parse_fail(&self, attempt: u32, error: &str, raw_brief_path: Option<&camino::Utf8Path>) {
        let mut config = json!({ "attempt": attempt, "error": error });
        if let Some(path) = raw_brief_path {
            config["raw_brief_path"] = json!(path.as_str());
        }
        self.audit.log(
            EventKind::GateCompress,
            EventFields::new().reason("parse_fail").config(config),
        );
    }

    /// Attempt one deterministic expansion step. Returns true when the
    /// working context was extended and the attempt loop should re-enter.
    #[allow(clippy::too_many_arguments)]
    async fn try_expand(
        &self,
        parsed: &ParsedBrief,
        request: &GateRequest<'_>,
        repo_root: Option<&camino::Utf8Path>,
        context: &mut String,
        query_symbols: &mut Vec<SymbolRef>,
        expanded_symbols: &mut Vec<String>,
        initial_confidence: &mut Option<f64>,
    ) -> bool {
        let (Some(root), Some(hydrator)) = (repo_root, self.hydrator.as_ref()) else {
            return false;
        };
        let tracked: HashSet<&SymbolRef> = query_symbols.iter().collect();
        let new_symbols: Vec<SymbolRef> = extract_symbols_from_gaps(&parsed.gaps)
            .into_iter()
            .filter(|sym| !tracked.contains(sym))
            .collect();
        if new_symbols.is_empty() {
            return false;
        }

        let bundle = match hydrator
            .hydrate(
                &new_symbols,
                request.deps_graph,
                root,
                HYDRATE_MAX_FACTS,
                HYDRATE_MAX_DEPTH,
            )
            .await
        {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("gate fact hydration failed: {e}");
                return false;
            }
        };
        if bundle.is_empty() {
            debug!("gate: hydration produced no facts, attempt counts as failure");
            return false;
        }

        debug!(
            "gate: confidence {:.2} -> expanding with {} symbols and retrying",
            parsed.confidence_score,
            new_symbols.len()
        );
        expanded_symbols.extend(new_symbols.iter().map(ToString::to_string));
        initial_confidence.get_or_insert(parsed.confidence_score);

        let supplement = bundle.to_prompt(SUPPLEMENT_CHARS);
        let mut expanded = format!("{context}\n\n---\n\n{supplement}");
        if expanded.chars().count() > self.config.max_expanded_context {
            warn!("expanded context over budget, truncating");
            expanded = truncate_chars(&expanded, self.config.max_expanded_context).to_string();
        }
        *context = expanded;
        query_symbols.extend(new_symbols);
        true
    }
}

/// Extract deduplicated `SymbolRef`s out of gap texts, preserving the
/// order of first appearance.
fn extract_symbols_from_gaps(gaps: &[String]) -> Vec<SymbolRef> {
    if gaps.is_empty() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    for gap in gaps {
        for caps in SYMBOL_FROM_GAP_RE.captures_iter(gap) {
            let sym = SymbolRef::new(&caps[1], &caps[2]);
            if seen.insert(sym.clone()) {
                symbols.push(sym);
            }
        }
    }
    symbols
}
