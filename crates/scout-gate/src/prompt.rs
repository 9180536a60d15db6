//! Prompt assembly for the compression attempts.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use scout_utils::truncate_chars;

use crate::types::SymbolRef;

/// Fixed system message for every compression call.
pub(crate) const SYSTEM_MESSAGE: &str =
    "You output structured responses. Always include confidence_score and gaps.";

/// Only the head of the working context is embedded in the prompt.
pub(crate) const PROMPT_CONTEXT_CHARS: usize = 28_000;

const CONFIDENCE_PROMPT_HEADER: &str = "\
You are a codebase analyst. Answer based ONLY on provided context.

REQUIRED OUTPUT FORMAT (STRICT — NO DEVIATIONS):
confidence_score: X.XX
<analysis paragraph>
[GAP] <gap description> OR None identified — verified coverage of N symbols

RULES:
- confidence_score MUST be a float between 0.00 and 1.00
- confidence_score MUST reflect ONLY what's in context (no guessing)
- If ANY critical symbol missing → confidence ≤ 0.70
- If context truncated → confidence ≤ 0.65
- If all symbols present AND context complete → confidence ≥ 0.80
- NEVER say \"I think\" or \"probably\" — state confidence numerically ONLY
";

// CamelCase or UPPER_SNAKE identifiers worth calling out to the model.
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][a-z]+(?:[A-Z][a-z]+)*|[A-Z][A-Z0-9_]{2,}").expect("static regex"));

/// Build the confidence prompt, injecting the critical symbols derived
/// deterministically from the tracked query symbols and from identifiers
/// mined out of the question itself.
pub(crate) fn build_confidence_prompt(question: &str, query_symbols: &[SymbolRef]) -> String {
    let mut critical: BTreeSet<String> = BTreeSet::new();

    for sym in query_symbols.iter().take(15) {
        if !sym.symbol.is_empty() {
            critical.insert(sym.symbol.clone());
        }
        if let Some(name) = sym.path.file_name() {
            let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
            if !stem.is_empty() {
                critical.insert(stem.to_string());
            }
        }
    }
    for m in IDENTIFIER_RE.find_iter(question) {
        critical.insert(m.as_str().to_string());
    }

    if critical.is_empty() {
        return format!("{CONFIDENCE_PROMPT_HEADER}\n");
    }
    let lines: Vec<String> = critical
        .iter()
        .take(20)
        .map(|s| format!("- {s}"))
        .collect();
    format!(
        "{CONFIDENCE_PROMPT_HEADER}\nCRITICAL SYMBOLS FOR THIS QUERY:\n{}\n",
        lines.join("\n")
    )
}

/// Assemble the full attempt prompt: output contract, context head, and
/// the question.
pub(crate) fn assemble_prompt(confidence_prompt: &str, context: &str, question: &str) -> String {
    format!(
        "{confidence_prompt}\n\
         ---\n\
         CONTEXT:\n\
         {}\n\n\
         ---\n\
         QUESTION: {question}\n\n\
         ---\n\
         YOUR RESPONSE (must include confidence_score and gaps/verified):",
        truncate_chars(context, PROMPT_CONTEXT_CHARS)
    )
}
