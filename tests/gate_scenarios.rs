//! End-to-end gate scenarios: scripted mid-tier responses driven through
//! the full gate, with decisions and audit trails checked together.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scout::audit::{AuditLog, EventKind};
use scout::gate::{
    ContentSource, DepsGraph, FactBundle, FactHydrator, GateConfig, GateOutcome, GateRequest,
    MiddleManagerGate, SymbolRef, TrustMetadata,
};
use scout::llm::{CompletionRequest, LlmClient, LlmError, LlmResponse};
use scout::RawBriefStore;

const RAW_TLDR_CONTEXT: &str = "## module_a (tldr)\nModule A does X.\n\n## module_b (tldr)\nModule B does Y.";

const COST_PER_CALL: f64 = 0.001;

/// Plays back a fixed script of responses, repeating the last entry once
/// the script runs out, and records every prompt it was sent.
struct ScriptedLlm {
    script: Vec<String>,
    cursor: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(script: &[&str]) -> Arc<Self> {
        assert!(!script.is_empty());
        Arc::new(Self {
            script: script.iter().map(ToString::to_string).collect(),
            cursor: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn repeating(content: &str) -> Arc<Self> {
        Self::new(&[content])
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse, LlmError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let content = self.script[idx.min(self.script.len() - 1)].clone();
        Ok(LlmResponse {
            content,
            cost_usd: COST_PER_CALL,
            model: request.model,
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}

/// Always fails at the transport layer.
struct FailingLlm;

#[async_trait]
impl LlmClient for FailingLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::Transport("connection reset by peer".to_string()))
    }
}

/// Panics when invoked; used where the gate must not call the model.
struct UnreachableLlm;

#[async_trait]
impl LlmClient for UnreachableLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<LlmResponse, LlmError> {
        panic!("gate called the LLM when it should have short-circuited");
    }
}

struct StaticBundle {
    text: String,
}

impl StaticBundle {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl FactBundle for StaticBundle {
    fn to_prompt(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }

    fn checksum(&self) -> String {
        format!("{:016x}", self.text.len())
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Hands out a fixed supplementary bundle and records which symbols were
/// requested.
struct RecordingHydrator {
    supplement: String,
    requested: Mutex<Vec<Vec<String>>>,
}

impl RecordingHydrator {
    fn new(supplement: &str) -> Arc<Self> {
        Arc::new(Self {
            supplement: supplement.to_string(),
            requested: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FactHydrator for RecordingHydrator {
    async fn hydrate(
        &self,
        symbols: &[SymbolRef],
        _deps_graph: Option<&dyn DepsGraph>,
        _repo_root: &Utf8Path,
        _max_facts: usize,
        _max_depth: usize,
    ) -> anyhow::Result<Box<dyn FactBundle>> {
        self.requested
            .lock()
            .unwrap()
            .push(symbols.iter().map(ToString::to_string).collect());
        Ok(Box::new(StaticBundle::new(&self.supplement)))
    }
}

struct StaleGraph {
    root: Utf8PathBuf,
}

impl DepsGraph for StaleGraph {
    fn context_package(&self, _query_symbols: &[SymbolRef]) -> Vec<String> {
        vec!["node_a".to_string(), "node_b".to_string()]
    }

    fn trust_metadata(&self, _nodes: &[String]) -> TrustMetadata {
        TrustMetadata {
            invalidation_cascade_triggered: true,
            stale_ratio: 0.8,
        }
    }

    fn repo_root(&self) -> &Utf8Path {
        &self.root
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    audit: Arc<AuditLog>,
    briefs_dir: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let audit = Arc::new(AuditLog::open(root.join("audit.jsonl")).unwrap());
        let briefs_dir = root.join("raw_briefs");
        Self {
            _dir: dir,
            audit,
            briefs_dir,
        }
    }

    fn gate(&self, llm: Arc<dyn LlmClient>) -> MiddleManagerGate {
        MiddleManagerGate::new(llm, Arc::clone(&self.audit))
            .with_briefs(RawBriefStore::new(self.briefs_dir.clone()))
    }

    fn events(&self) -> Vec<scout::Event> {
        self.audit.flush().unwrap();
        self.audit.query(None, None).unwrap()
    }
}

#[tokio::test]
async fn happy_path_passes_on_first_attempt() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::repeating(
        "confidence_score: 0.84\n... analysis ...\nNone identified — verified coverage of 5 symbols",
    );
    let gate = fixture.gate(llm);

    let decision = gate
        .validate_and_compress(GateRequest::new("What does module A do?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;

    assert_eq!(decision.outcome, GateOutcome::Pass);
    assert_eq!(decision.content, "... analysis ...");
    assert_eq!(decision.source, ContentSource::Compressed);
    assert!((decision.confidence.unwrap() - 0.84).abs() < 1e-9);
    assert!(decision.gaps.is_empty());
    assert!(decision.has_gaps_declaration);
    assert!(!decision.suspicious);
    assert_eq!(decision.attempt, 1);
    assert!(decision.expanded_symbols.is_empty());
    assert!(decision.initial_confidence.is_none());
    assert!((decision.cost_usd - COST_PER_CALL).abs() < 1e-12);

    let events = fixture.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventKind::GateCompress);
    assert_eq!(events[0].confidence, Some(84));
    assert_eq!(events[0].cost, Some(COST_PER_CALL));
    let config = events[0].config.as_ref().unwrap();
    assert_eq!(config["suspicious"], false);
    assert_eq!(config["attempt"], 1);
    assert!(config["raw_brief_path"].is_string());
}

#[tokio::test]
async fn low_confidence_escalates_after_max_attempts() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::repeating(
        "confidence_score: 0.50\nLow confidence analysis.\n[GAP] Missing context.",
    );
    let gate = fixture.gate(llm);

    let decision = gate
        .validate_and_compress(GateRequest::new("What does X do?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;

    assert_eq!(decision.outcome, GateOutcome::Escalate);
    assert_eq!(decision.source, ContentSource::RawTldr);
    assert_eq!(decision.content, RAW_TLDR_CONTEXT);
    assert_eq!(decision.attempt, 3);
    assert!((decision.cost_usd - 3.0 * COST_PER_CALL).abs() < 1e-12);

    let events = fixture.events();
    assert_eq!(events.len(), 4);
    for event in &events[..3] {
        assert_eq!(event.event, EventKind::GateCompress);
        assert_eq!(event.confidence, Some(50));
    }
    assert_eq!(events[3].event, EventKind::GateEscalate);
    assert_eq!(events[3].reason.as_deref(), Some("max_retries"));
    let config = events[3].config.as_ref().unwrap();
    assert_eq!(config["attempts"], 3);
}

#[tokio::test]
async fn garbage_output_is_a_parse_failure_each_attempt() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::repeating("No confidence here. Just garbage.");
    let gate = fixture.gate(llm);

    let decision = gate
        .validate_and_compress(GateRequest::new("What?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;

    assert_eq!(decision.outcome, GateOutcome::Escalate);
    assert_eq!(decision.source, ContentSource::RawTldr);

    let events = fixture.events();
    assert_eq!(events.len(), 4);
    for event in &events[..3] {
        assert_eq!(event.event, EventKind::GateCompress);
        assert_eq!(event.reason.as_deref(), Some("parse_fail"));
    }
    assert_eq!(events[3].event, EventKind::GateEscalate);
}

#[tokio::test]
async fn expansion_hydrates_gap_symbols_and_recovers() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::new(&[
        "confidence_score: 0.62\nPartial picture.\n[GAP] impact on resident_memory.py::serialize",
        "confidence_score: 0.86\nComplete picture.\nNone identified — verified coverage of 6 symbols",
    ]);
    let hydrator = RecordingHydrator::new("## resident_memory.py::serialize (facts)\nSerializes the arena.");
    let facts = StaticBundle::new("## module_a (facts)\nModule A does X.");
    let gate = fixture
        .gate(llm.clone())
        .with_hydrator(hydrator.clone());

    let decision = gate
        .validate_and_compress(
            GateRequest::new("How does serialization work?")
                .facts(&facts)
                .repo_root("/repo"),
        )
        .await;

    assert_eq!(decision.outcome, GateOutcome::Pass);
    assert_eq!(decision.content, "Complete picture.");
    assert!((decision.confidence.unwrap() - 0.86).abs() < 1e-9);
    assert!((decision.initial_confidence.unwrap() - 0.62).abs() < 1e-9);
    assert_eq!(
        decision.expanded_symbols,
        vec!["resident_memory.py::serialize".to_string()]
    );
    assert_eq!(decision.attempt, 2);
    assert!((decision.cost_usd - 2.0 * COST_PER_CALL).abs() < 1e-12);

    // Hydration was asked for exactly the gap symbol.
    assert_eq!(
        hydrator.requested.lock().unwrap().as_slice(),
        &[vec!["resident_memory.py::serialize".to_string()]]
    );

    // Second attempt saw the prior context, the separator, and the
    // hydrated supplement.
    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    let expected_context = format!(
        "## module_a (facts)\nModule A does X.\n\n---\n\n{}",
        "## resident_memory.py::serialize (facts)\nSerializes the arena."
    );
    assert!(prompts[1].contains(&expected_context));

    let events = fixture.events();
    let compress: Vec<_> = events
        .iter()
        .filter(|e| e.event == EventKind::GateCompress)
        .collect();
    assert_eq!(compress.len(), 2);
    assert_eq!(compress[0].confidence, Some(62));
    assert_eq!(compress[1].confidence, Some(86));
}

#[tokio::test]
async fn hallucinated_calibration_retries_then_escalates() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::repeating("confidence_score: 17.5");
    let gate = fixture.gate(llm);

    let decision = gate
        .validate_and_compress(GateRequest::new("What?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;

    assert_eq!(decision.outcome, GateOutcome::Escalate);
    assert!((decision.cost_usd - 3.0 * COST_PER_CALL).abs() < 1e-12);

    let events = fixture.events();
    assert_eq!(events.len(), 4);
    for event in &events[..3] {
        assert_eq!(event.reason.as_deref(), Some("parse_fail"));
        let config = event.config.as_ref().unwrap();
        assert_eq!(config["error"], "hallucinated calibration");
    }
    assert_eq!(events[3].event, EventKind::GateEscalate);
}

#[tokio::test]
async fn transport_errors_count_as_api_error_attempts() {
    let fixture = Fixture::new();
    let gate = fixture.gate(Arc::new(FailingLlm));

    let decision = gate
        .validate_and_compress(GateRequest::new("What?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;

    assert_eq!(decision.outcome, GateOutcome::Escalate);
    assert_eq!(decision.cost_usd, 0.0);

    let events = fixture.events();
    assert_eq!(events.len(), 4);
    for event in &events[..3] {
        assert_eq!(event.reason.as_deref(), Some("api_error"));
    }
    assert_eq!(events[3].event, EventKind::GateEscalate);
}

#[tokio::test]
async fn suspicious_briefs_fail_despite_high_confidence() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::repeating("confidence_score: 0.80\nAnalysis only. No gaps declared.");
    let gate = fixture.gate(llm);

    let decision = gate
        .validate_and_compress(GateRequest::new("What?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;

    assert_eq!(decision.outcome, GateOutcome::Escalate);
    let events = fixture.events();
    let compress: Vec<_> = events
        .iter()
        .filter(|e| e.event == EventKind::GateCompress)
        .collect();
    assert_eq!(compress.len(), 3);
    for event in compress {
        let config = event.config.as_ref().unwrap();
        assert_eq!(config["suspicious"], true);
    }
}

#[tokio::test]
async fn stale_cascade_short_circuits_without_calling_the_model() {
    let fixture = Fixture::new();
    let graph = StaleGraph {
        root: Utf8PathBuf::from("/repo"),
    };
    let facts = StaticBundle::new("## module_a (facts)\nModule A does X.");
    let gate = fixture.gate(Arc::new(UnreachableLlm));

    let decision = gate
        .validate_and_compress(
            GateRequest::new("What does ModuleA do?")
                .facts(&facts)
                .deps_graph(&graph)
                .query_symbols(vec![SymbolRef::new("module_a.rs", "run")]),
        )
        .await;

    assert_eq!(decision.outcome, GateOutcome::Escalate);
    assert_eq!(decision.source, ContentSource::RawFacts);
    assert_eq!(decision.attempt, 0);
    assert_eq!(decision.content, "## module_a (facts)\nModule A does X.");
    assert_eq!(decision.cost_usd, 0.0);

    let events = fixture.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventKind::GateCompress);
    assert_eq!(events[0].reason.as_deref(), Some("stale_cascade"));
    assert_eq!(events[0].confidence, Some(0));
    let config = events[0].config.as_ref().unwrap();
    assert!((config["stale_ratio"].as_f64().unwrap() - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn escalation_with_facts_input_reports_raw_facts_source() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::repeating("confidence_score: 0.10\nWeak.\n[GAP] everything");
    let facts = StaticBundle::new("## module_a (facts)\nModule A does X.");
    let gate = fixture.gate(llm);

    let decision = gate
        .validate_and_compress(GateRequest::new("What?").facts(&facts))
        .await;

    assert_eq!(decision.outcome, GateOutcome::Escalate);
    assert_eq!(decision.source, ContentSource::RawFacts);
    assert_eq!(decision.content, "## module_a (facts)\nModule A does X.");
}

#[tokio::test]
async fn raw_briefs_are_stored_for_every_parsed_attempt() {
    let fixture = Fixture::new();
    let content =
        "confidence_score: 0.85\nGood analysis.\nNone identified — verified coverage of 5 symbols";
    let llm = ScriptedLlm::repeating(content);
    let gate = fixture.gate(llm);

    gate.validate_and_compress(GateRequest::new("What?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;

    let store = RawBriefStore::new(fixture.briefs_dir.clone());
    let briefs = store.list(100);
    assert_eq!(briefs.len(), 1);
    let stored = std::fs::read_to_string(&briefs[0]).unwrap();
    assert_eq!(stored, content);
}

#[tokio::test]
async fn custom_threshold_and_attempt_budget_are_honored() {
    let fixture = Fixture::new();
    let llm = ScriptedLlm::repeating("confidence_score: 0.60\nMiddling.\nNone identified");
    let gate = fixture.gate(llm).with_config(GateConfig {
        confidence_threshold: 0.5,
        max_attempts: 2,
        ..GateConfig::default()
    });

    let decision = gate
        .validate_and_compress(GateRequest::new("What?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;
    assert_eq!(decision.outcome, GateOutcome::Pass);

    let fixture2 = Fixture::new();
    let llm2 = ScriptedLlm::repeating("confidence_score: 0.40\nWeak.\nNone identified");
    let gate2 = fixture2.gate(llm2).with_config(GateConfig {
        confidence_threshold: 0.5,
        max_attempts: 2,
        ..GateConfig::default()
    });
    let decision = gate2
        .validate_and_compress(GateRequest::new("What?").raw_tldr(RAW_TLDR_CONTEXT))
        .await;
    assert_eq!(decision.outcome, GateOutcome::Escalate);
    assert_eq!(decision.attempt, 2);
}
