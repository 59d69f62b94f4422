//! Hypothetical-answer expansion: generate a plausible passage for the
//! question, then search by its embedding.

use moka::sync::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use councildb_core::text::{normalize_question, truncate_chars};
use councildb_core::traits::{with_timeout, EmbedProvider, GenerationOptions, TextGenerator};
use councildb_core::types::{DocumentType, Embedding, Message};
use councildb_core::Result;

use crate::prompts::{fill, hypothesis_template, CONTEXT_ANALYSIS, HYPOTHESIS_GENERIC};

const ANALYSIS_OPTIONS: GenerationOptions = GenerationOptions { temperature: 0.3, max_tokens: 200 };
const HYPOTHESIS_OPTIONS: GenerationOptions = GenerationOptions { temperature: 0.5, max_tokens: 300 };
const UNDETERMINED: &str = "indefinido";
const HISTORY_TURNS: usize = 3;
const HISTORY_CHARS: usize = 200;
const CACHE_KEY_CHARS: usize = 50;
const CITATION_MARKERS: [&str; 4] = ["art.", "artigo", "§", "inciso"];

/// What the question is about. `None` means undetermined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextAnalysis {
    pub council: Option<String>,
    pub doc_type: Option<String>,
    pub topic: String,
    pub expected_format: String,
}

impl ContextAnalysis {
    pub fn undetermined(question: &str) -> Self {
        Self { council: None, doc_type: None, topic: question.to_string(), expected_format: "resposta formal".into() }
    }

    pub fn document_type(&self) -> Option<DocumentType> {
        self.doc_type.as_deref().and_then(|t| normalize_question(t).parse().ok())
    }
}

#[derive(Deserialize, Default)]
struct RawAnalysis {
    conselho: Option<String>,
    tipo_documento: Option<String>,
    topico: Option<String>,
    formato_esperado: Option<String>,
}

fn determined(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(UNDETERMINED))
}

/// Parse the analysis reply. Models often wrap the JSON in prose or code
/// fences, so the outermost braces are taken.
pub fn parse_analysis(reply: &str, question: &str) -> ContextAnalysis {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return ContextAnalysis::undetermined(question),
    };
    let Ok(raw) = serde_json::from_str::<RawAnalysis>(json) else {
        return ContextAnalysis::undetermined(question);
    };
    ContextAnalysis {
        council: determined(raw.conselho),
        doc_type: determined(raw.tipo_documento),
        topic: determined(raw.topico).unwrap_or_else(|| question.to_string()),
        expected_format: determined(raw.formato_esperado).unwrap_or_else(|| "resposta formal".into()),
    }
}

/// Base 0.5; +0.2 for a document type, +0.1 for a council, +0.2 when the
/// hypothesis cites articles or paragraphs.
pub fn confidence(analysis: &ContextAnalysis, hypothesis: &str) -> f32 {
    let mut score: f32 = 0.5;
    if analysis.doc_type.is_some() {
        score += 0.2;
    }
    if analysis.council.is_some() {
        score += 0.1;
    }
    let lower = hypothesis.to_lowercase();
    if CITATION_MARKERS.iter().any(|m| lower.contains(m)) {
        score += 0.2;
    }
    score.min(1.0)
}

#[derive(Debug, Clone)]
pub struct HydeResult {
    pub original_query: String,
    pub hypothesis: String,
    pub query_embedding: Embedding,
    pub hypothesis_embedding: Embedding,
    pub analysis: ContextAnalysis,
    pub confidence: f32,
    /// The hypothesis came from the fallback template.
    pub fallback: bool,
}

pub struct HydeExpander {
    llm: Arc<dyn TextGenerator>,
    embedder: Arc<dyn EmbedProvider>,
    timeout: Duration,
    cache: Cache<String, Arc<HydeResult>>,
}

impl HydeExpander {
    pub fn new(llm: Arc<dyn TextGenerator>, embedder: Arc<dyn EmbedProvider>, timeout: Duration, capacity: u64) -> Self {
        Self { llm, embedder, timeout, cache: Cache::builder().max_capacity(capacity).build() }
    }

    /// Generation failures fall back to a templated hypothesis; only an
    /// embedding failure is returned as an error.
    pub async fn expand(&self, question: &str, history: &[Message]) -> Result<Arc<HydeResult>> {
        let key = cache_key(question, history);
        if let Some(hit) = self.cache.get(&key) {
            debug!("hypothesis cache hit");
            return Ok(hit);
        }
        let history_text = format_history(history);
        let analysis = self.analyze(question, &history_text).await;
        let (hypothesis, fallback) = match self.hypothesize(question, &analysis, &history_text).await {
            Some(h) => (h, false),
            None => (fallback_hypothesis(question, &analysis), true),
        };
        let embeddings = with_timeout(
            self.timeout,
            self.embedder.embed_batch(&[question.to_string(), hypothesis.clone()]),
        )
        .await?;
        let [query_embedding, hypothesis_embedding]: [Embedding; 2] = embeddings.try_into().map_err(|v: Vec<Embedding>| {
            councildb_core::Error::Provider(format!("expected 2 embeddings, got {}", v.len()))
        })?;
        let result = Arc::new(HydeResult {
            original_query: question.to_string(),
            confidence: confidence(&analysis, &hypothesis),
            hypothesis,
            query_embedding,
            hypothesis_embedding,
            analysis,
            fallback,
        });
        // A templated stand-in is retried on the next call instead of pinned.
        if !fallback {
            self.cache.insert(key, result.clone());
        }
        Ok(result)
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    async fn analyze(&self, question: &str, history_text: &str) -> ContextAnalysis {
        let prompt = fill(CONTEXT_ANALYSIS, &[("query", question), ("history", history_text)]);
        match with_timeout(self.timeout, self.llm.generate(&[Message::user(prompt)], ANALYSIS_OPTIONS)).await {
            Ok(reply) => parse_analysis(&reply, question),
            Err(e) => {
                warn!(error = %e, "context analysis failed");
                ContextAnalysis::undetermined(question)
            }
        }
    }

    async fn hypothesize(&self, question: &str, analysis: &ContextAnalysis, history_text: &str) -> Option<String> {
        let council = analysis.council.as_deref().unwrap_or(UNDETERMINED);
        let prompt = match analysis.document_type().and_then(hypothesis_template) {
            Some(template) => fill(template, &[("query", question), ("conselho", analysis.council.as_deref().unwrap_or("CONSUNI"))]),
            None => fill(
                HYPOTHESIS_GENERIC,
                &[
                    ("query", question),
                    ("conselho", council),
                    ("tipo_documento", analysis.doc_type.as_deref().unwrap_or(UNDETERMINED)),
                    ("topico", analysis.topic.as_str()),
                    ("history", history_text),
                ],
            ),
        };
        match with_timeout(self.timeout, self.llm.generate(&[Message::user(prompt)], HYPOTHESIS_OPTIONS)).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "hypothesis generation failed; using template");
                None
            }
        }
    }
}

pub fn fallback_hypothesis(question: &str, analysis: &ContextAnalysis) -> String {
    format!("Conforme documentos do {}, {question}", analysis.council.as_deref().unwrap_or("conselho"))
}

fn cache_key(question: &str, history: &[Message]) -> String {
    let last = history.last().map_or("", |m| truncate_chars(&m.content, CACHE_KEY_CHARS));
    format!("{question}|{last}")
}

fn format_history(history: &[Message]) -> String {
    if history.is_empty() {
        return "Nenhum histórico disponível.".to_string();
    }
    let start = history.len().saturating_sub(HISTORY_TURNS);
    history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), truncate_chars(&m.content, HISTORY_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}
