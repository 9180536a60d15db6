//! Parses raw mid-tier LLM brief outputs from the confidence-extraction
//! prompt.
//!
//! Handles real-world quirks: extra newlines, whitespace, `[GAP]`
//! variants, "None identified" variants. Rejects confidence values above
//! 1.0. Flags outputs missing both `[GAP]` and "None identified" as
//! suspicious.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

// Format 1: structured (preferred). Separator is ':' or '='.
static CONFIDENCE_STRUCTURED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)confidence_score\s*[:=]\s*([\d.]+)").expect("static regex"));

// Format 2: natural language ("I'm 84% confident").
static CONFIDENCE_NATURAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:i'm|i am|confidence)\s*(?:about\s*)?(\d{1,3})\s*%?(?:\s*confident)?")
        .expect("static regex")
});

// Format 3: bare decimal ("0.84"). The leading group stands in for a
// negative lookbehind: the number must not continue a longer word or
// number. The greedy `\d{2,}` makes a trailing lookahead unnecessary.
static CONFIDENCE_DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9A-Za-z_.])(0\.\d{2,})").expect("static regex"));

static GAP_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[GAP\]").expect("static regex"));

// "None identified — verified coverage of N symbols" (strict form), or
// the bare phrase (loose form).
static NONE_IDENTIFIED_STRICT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)None\s+identified\s*(?:—|–|-)\s*verified\s+coverage\s+of\s+(\d+)\s+symbols")
        .expect("static regex")
});
static NONE_IDENTIFIED_LOOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)None\s+identified").expect("static regex"));

/// Raised when brief output violates the calibration contract.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BriefParseError {
    /// The self-reported confidence was outside `[0, 1]` after scaling:
    /// the model ignored the output contract and cannot be trusted.
    #[error("hallucinated calibration")]
    HallucinatedCalibration,

    /// The model returned nothing usable at all.
    #[error("empty output")]
    EmptyOutput,
}

/// Parsed result from a confidence-extraction brief.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBrief {
    /// Self-reported confidence, clamped to `[0.0, 1.0]`.
    pub confidence_score: f64,
    /// Free-form analysis between the confidence line and the gaps section.
    pub analysis: String,
    /// Declared `[GAP]` items, trimmed, in order of appearance.
    pub gaps: Vec<String>,
    /// True when the brief declared gaps or stated "None identified".
    pub has_gaps_declaration: bool,
    /// True when the brief declared neither gaps nor "None identified";
    /// its nominal confidence cannot be trusted.
    pub suspicious: bool,
    /// False when no confidence format matched and the score fell back
    /// to 0.0; the gate records such attempts as parse failures.
    pub has_confidence_signal: bool,
}

/// Parser for raw mid-tier brief outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BriefParser;

impl BriefParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw brief.
    ///
    /// # Errors
    ///
    /// Returns [`BriefParseError::HallucinatedCalibration`] when the
    /// confidence value exceeds 1.0 after scaling, and
    /// [`BriefParseError::EmptyOutput`] for blank input. A brief with no
    /// recognizable confidence signal parses to a score of 0.0 instead
    /// of failing; zero always fails the threshold downstream, which is
    /// the safe default.
    pub fn parse(&self, raw: &str) -> Result<ParsedBrief, BriefParseError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(BriefParseError::EmptyOutput);
        }

        let signal = Self::parse_confidence(text);
        let (score, analysis_start) = signal.unwrap_or((0.0, 0));
        if score > 1.0 {
            return Err(BriefParseError::HallucinatedCalibration);
        }
        let score = score.clamp(0.0, 1.0);

        let gaps = Self::extract_gaps(text);
        let has_none_identified = NONE_IDENTIFIED_STRICT_RE.is_match(text)
            || NONE_IDENTIFIED_LOOSE_RE.is_match(text);
        let has_gaps_declaration = !gaps.is_empty() || has_none_identified;

        Ok(ParsedBrief {
            confidence_score: score,
            analysis: Self::extract_analysis(text, analysis_start),
            gaps,
            has_gaps_declaration,
            suspicious: !has_gaps_declaration,
            has_confidence_signal: signal.is_some(),
        })
    }

    /// Robust confidence extraction over the three accepted formats.
    /// Returns `(score, analysis_start)`, or `None` when nothing
    /// matched; the caller falls back to 0.0, which always fails the
    /// threshold downstream.
    fn parse_confidence(text: &str) -> Option<(f64, usize)> {
        if let Some(caps) = CONFIDENCE_STRUCTURED_RE.captures(text)
            && let Ok(score) = caps[1].parse::<f64>()
        {
            return Some((score, caps.get(0).expect("whole match").end()));
        }

        if let Some(caps) = CONFIDENCE_NATURAL_RE.captures(text)
            && let Ok(pct) = caps[1].parse::<f64>()
        {
            return Some((pct / 100.0, caps.get(0).expect("whole match").end()));
        }

        if let Some(caps) = CONFIDENCE_DECIMAL_RE.captures(text)
            && let Ok(score) = caps[1].parse::<f64>()
        {
            return Some((score, caps.get(1).expect("decimal group").end()));
        }

        let snippet: String = text.chars().take(200).collect();
        warn!(
            "confidence parse failed, defaulting to 0.0; raw snippet: '{}...'",
            snippet.replace('\n', " ")
        );
        None
    }

    /// Capture every non-empty `[GAP]` run, cut at the next `[GAP]`, the
    /// first following "None identified", or end of string.
    fn extract_gaps(text: &str) -> Vec<String> {
        let markers: Vec<_> = GAP_MARKER_RE.find_iter(text).collect();
        let none_starts: Vec<usize> = NONE_IDENTIFIED_LOOSE_RE
            .find_iter(text)
            .map(|m| m.start())
            .collect();

        let mut gaps = Vec::new();
        for (i, marker) in markers.iter().enumerate() {
            let mut end = markers
                .get(i + 1)
                .map_or(text.len(), regex::Match::start);
            if let Some(&none_pos) = none_starts.iter().find(|&&p| p >= marker.end()) {
                end = end.min(none_pos);
            }
            let content = text[marker.end()..end].trim();
            if !content.is_empty() {
                gaps.push(content.to_string());
            }
        }
        gaps
    }

    /// Everything between the end of the confidence match and the start
    /// of the gaps section.
    fn extract_analysis(text: &str, analysis_start: usize) -> String {
        let mut end = text.len();
        if let Some(m) = GAP_MARKER_RE.find_at(text, analysis_start) {
            end = end.min(m.start());
        }
        if let Some(m) = NONE_IDENTIFIED_LOOSE_RE.find_at(text, analysis_start) {
            end = end.min(m.start());
        }
        text[analysis_start..end].trim().to_string()
    }
}
