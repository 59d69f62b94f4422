use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use councildb_core::traits::{with_timeout, GenerationOptions, TextGenerator};
use councildb_core::types::Message;

use crate::context::ConversationContext;
use crate::heuristics::HeuristicExpander;
use crate::prompts::REWRITE_SYSTEM;

const KEYWORD_SUFFIX_TERMS: usize = 5;
const ALTERNATE_KEYWORDS: usize = 4;
const REWRITE_OPTIONS: GenerationOptions = GenerationOptions { temperature: 0.3, max_tokens: 150 };

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticEnrichment {
    pub original: String,
    /// Search query: the LLM rewrite (or the question) plus keyword suffix.
    pub rewritten: String,
    pub heuristics: Vec<String>,
    pub alternates: Vec<String>,
    pub confidence: f32,
    pub llm_rewritten: bool,
}

/// Heuristic expansion plus an optional LLM rewrite of the question.
pub struct SemanticRewriter {
    expander: HeuristicExpander,
    llm: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
    history_messages: usize,
}

impl SemanticRewriter {
    pub fn new(expander: HeuristicExpander) -> Self {
        Self { expander, llm: None, timeout: Duration::from_secs(30), history_messages: 10 }
    }

    pub fn with_llm(mut self, llm: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        self.llm = Some(llm);
        self.timeout = timeout;
        self
    }

    pub fn with_history_messages(mut self, n: usize) -> Self {
        self.history_messages = n;
        self
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn expander(&self) -> &HeuristicExpander {
        &self.expander
    }

    /// `None` when no LLM is configured, the call fails, or it answers blank.
    pub async fn llm_rewrite(&self, question: &str, history: &[Message]) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let context = ConversationContext::extract(history, self.history_messages);
        let mut system = REWRITE_SYSTEM.to_string();
        if !context.is_empty() {
            system.push_str("\n\nContexto da conversa:\n");
            system.push_str(&context.describe());
        }
        let messages = [Message::system(system), Message::user(format!("Pergunta: {question}\nReescreva:"))];
        match with_timeout(self.timeout, llm.generate(&messages, REWRITE_OPTIONS)).await {
            Ok(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                warn!(error = %e, "LLM rewrite failed; using the original question");
                None
            }
        }
    }

    pub async fn enrich(&self, question: &str, history: &[Message], use_llm: bool) -> SemanticEnrichment {
        let heuristics = self.expander.extract(question);
        let llm_result = if use_llm { self.llm_rewrite(question, history).await } else { None };
        let llm_rewritten = llm_result.is_some();

        let mut rewritten = llm_result.unwrap_or_else(|| question.to_string());
        if !heuristics.is_empty() {
            let top: Vec<&str> = heuristics.iter().take(KEYWORD_SUFFIX_TERMS).map(String::as_str).collect();
            rewritten = format!("{rewritten}. Palavras-chave: {}", top.join(", "));
        }

        let alternates = alternates(question, &heuristics);
        let mut confidence: f32 = if heuristics.is_empty() { 0.6 } else { 0.9 };
        if llm_rewritten {
            confidence = (confidence + 0.1).min(1.0);
        }
        debug!(terms = heuristics.len(), llm_rewritten, confidence, "question enriched");
        SemanticEnrichment {
            original: question.to_string(),
            rewritten,
            heuristics,
            alternates,
            confidence,
            llm_rewritten,
        }
    }
}

fn alternates(question: &str, heuristics: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    if heuristics.is_empty() {
        return out;
    }
    let top: Vec<&str> = heuristics.iter().take(KEYWORD_SUFFIX_TERMS).map(String::as_str).collect();
    out.push(format!("{question} {}", top.join(" ")));
    if heuristics.len() >= 2 {
        let keywords: Vec<&str> = heuristics.iter().take(ALTERNATE_KEYWORDS).map(String::as_str).collect();
        out.push(keywords.join(", "));
    }
    out
}
