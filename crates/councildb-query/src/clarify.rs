//! Flags questions whose retrieved passages point at several documents.

use std::collections::HashSet;

use councildb_core::config::DisambiguationTerms;
use councildb_core::text::contains_any;
use councildb_core::types::SearchResult;

const TEMPORAL_CONFIDENCE: f32 = 0.8;
const MULTI_DOC_CONFIDENCE: f32 = 0.7;
const MAX_OPTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityKind {
    /// Last meeting or next meeting.
    Temporal,
    MultipleOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClarificationNeeded {
    pub kind: AmbiguityKind,
    pub question: String,
    pub options: Vec<String>,
    pub confidence: f32,
}

impl ClarificationNeeded {
    /// Callers interrupt the answer only above `threshold`.
    pub fn is_actionable(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }

    /// Message shown to the user instead of an answer.
    pub fn render(&self) -> String {
        let mut out = self.question.clone();
        if !self.options.is_empty() {
            out.push_str("\n\n**Opções:**\n");
            for opt in &self.options {
                out.push_str(&format!("- {opt}\n"));
            }
        }
        out.push_str("\nPor favor, seja mais específico.");
        out
    }
}

#[derive(Debug, Clone)]
pub struct DisambiguationDetector {
    terms: DisambiguationTerms,
    temporal_window: usize,
    options_window: usize,
}

impl Default for DisambiguationDetector {
    fn default() -> Self {
        Self::new(DisambiguationTerms::default(), 5, 8)
    }
}

impl DisambiguationDetector {
    /// `temporal_window` top results decide whether several documents are in
    /// play; `options_window` top results are grouped into the offered options.
    pub fn new(terms: DisambiguationTerms, temporal_window: usize, options_window: usize) -> Self {
        Self { terms, temporal_window: temporal_window.max(1), options_window: options_window.max(1) }
    }

    /// Temporal check first, then multiple-document check.
    pub fn check(&self, question: &str, results: &[SearchResult]) -> Option<ClarificationNeeded> {
        if results.len() < 2 {
            return None;
        }
        let spans_several = distinct_titles(results, self.temporal_window).len() > 1;
        if !spans_several {
            return None;
        }
        if self.is_temporal_question(question) {
            let label = results[0].doc_type.label();
            return Some(ClarificationNeeded {
                kind: AmbiguityKind::Temporal,
                question: format!("Você quer saber sobre a {label} da **última** reunião ou da **próxima** reunião?"),
                options: vec!["última".to_string(), "próxima".to_string()],
                confidence: TEMPORAL_CONFIDENCE,
            });
        }
        let titles = distinct_titles(results, self.options_window);
        Some(ClarificationNeeded {
            kind: AmbiguityKind::MultipleOptions,
            question: format!("Encontrei {} documentos. Sobre qual você quer saber?", titles.len()),
            options: titles.into_iter().take(MAX_OPTIONS).map(str::to_string).collect(),
            confidence: MULTI_DOC_CONFIDENCE,
        })
    }

    /// Mentions a meeting document, asks vaguely, and pins down neither
    /// which meeting nor a number or date.
    pub fn is_temporal_question(&self, question: &str) -> bool {
        let q = question.to_lowercase();
        contains_any(&q, &self.terms.temporal)
            && contains_any(&q, &self.terms.vague)
            && !contains_any(&q, &self.terms.specific)
            && !q.chars().any(|c| c.is_ascii_digit())
    }
}

/// Titles of the first `window` results, first-seen order.
fn distinct_titles(results: &[SearchResult], window: usize) -> Vec<&str> {
    let mut seen = HashSet::new();
    results.iter().take(window).map(|r| r.title.as_str()).filter(|t| seen.insert(*t)).collect()
}
