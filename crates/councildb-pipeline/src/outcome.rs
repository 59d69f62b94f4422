use std::sync::Arc;

use councildb_cache::{CacheHit, CacheStats};
use councildb_core::types::{SearchResult, StoreStats};
use councildb_query::{ClarificationNeeded, HydeResult, SemanticEnrichment};

/// Injected into the generation prompt when retrieval found nothing.
pub const NO_BASIS_NOTICE: &str = "Nenhuma base documental foi encontrada para esta pergunta. \
Não invente informações: informe que os documentos disponíveis não tratam do assunto.";

/// Everything prompt assembly needs for one question.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub question: String,
    pub search_query: String,
    pub enrichment: SemanticEnrichment,
    pub tool: Option<String>,
    pub chunks: Vec<SearchResult>,
    pub facts: Vec<String>,
    pub hyde: Option<Arc<HydeResult>>,
    /// Detected ambiguity that stayed under the clarification threshold.
    pub clarification: Option<ClarificationNeeded>,
    pub retried_unfiltered: bool,
    /// Enrichment stages that failed and were skipped.
    pub degraded: Vec<String>,
}

impl RetrievalContext {
    pub fn no_basis(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn notice(&self) -> Option<&'static str> {
        self.no_basis().then_some(NO_BASIS_NOTICE)
    }
}

#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    Cached(CacheHit),
    /// Ask the user to narrow the question instead of answering.
    Clarification(ClarificationNeeded),
    Retrieved(Box<RetrievalContext>),
}

#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub store: StoreStats,
    pub cache: Option<CacheStats>,
}
