//! Retrieval orchestrator: cache → enrichment → focal search →
//! disambiguation → fact derivation.

mod outcome;

use futures::future::OptionFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use councildb_cache::AnswerCache;
use councildb_core::config::{QueryTables, RetrievalSettings};
use councildb_core::traits::TextGenerator;
use councildb_core::types::{Message, SearchResult};
use councildb_core::{Error, Result};
use councildb_query::{
    DisambiguationDetector, FactDeriver, FocalToolSelector, HeuristicExpander, HydeExpander, SemanticRewriter,
};
use councildb_vector::{DocumentStore, QueryInput};

pub use outcome::{PipelineStats, RetrievalContext, RetrievalOutcome, NO_BASIS_NOTICE};

pub struct PipelineBuilder {
    store: Arc<DocumentStore>,
    settings: RetrievalSettings,
    tables: QueryTables,
    cache: Option<Arc<AnswerCache>>,
    llm: Option<(Arc<dyn TextGenerator>, Duration)>,
}

impl PipelineBuilder {
    pub fn new(store: Arc<DocumentStore>, settings: RetrievalSettings, tables: QueryTables) -> Self {
        Self { store, settings, tables, cache: None, llm: None }
    }

    pub fn with_cache(mut self, cache: Arc<AnswerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enables the LLM rewrite and, when configured, hypothetical-answer search.
    pub fn with_llm(mut self, llm: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        self.llm = Some((llm, timeout));
        self
    }

    pub fn build(self) -> RetrievalPipeline {
        let s = self.settings;
        let mut rewriter =
            SemanticRewriter::new(HeuristicExpander::from_tables(&self.tables)).with_history_messages(s.history_messages);
        let mut hyde = None;
        if let Some((llm, timeout)) = self.llm {
            if s.use_hyde {
                hyde = Some(HydeExpander::new(llm.clone(), self.store.embedder().clone(), timeout, s.hyde_cache_capacity));
            }
            rewriter = rewriter.with_llm(llm, timeout);
        }
        RetrievalPipeline {
            focal: FocalToolSelector::new(self.store.clone(), self.tables.tools),
            detector: DisambiguationDetector::new(self.tables.disambiguation, s.temporal_window, s.disambiguation_window),
            store: self.store,
            cache: self.cache,
            rewriter,
            hyde,
            facts: FactDeriver,
            settings: s,
        }
    }
}

pub struct RetrievalPipeline {
    store: Arc<DocumentStore>,
    cache: Option<Arc<AnswerCache>>,
    rewriter: SemanticRewriter,
    hyde: Option<HydeExpander>,
    focal: FocalToolSelector,
    detector: DisambiguationDetector,
    facts: FactDeriver,
    settings: RetrievalSettings,
}

impl RetrievalPipeline {
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Run one question through the pipeline.
    ///
    /// Enrichment failures degrade to the plain question; only a failing
    /// search itself is returned as an error.
    pub async fn ask(&self, question: &str, user_id: Option<&str>, history: &[Message]) -> Result<RetrievalOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Validation("question is empty".into()));
        }
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.lookup(user_id, question)) {
            info!(scope = %hit.scope, "answered from cache");
            return Ok(RetrievalOutcome::Cached(hit));
        }

        let k = self.settings.top_k;
        let recent = &history[history.len().saturating_sub(self.settings.history_messages)..];
        let hyde_fut: OptionFuture<_> = self.hyde.as_ref().map(|h| h.expand(question, recent)).into();
        let (enrichment, hyde) =
            futures::join!(self.rewriter.enrich(question, recent, self.settings.use_llm_rewrite), hyde_fut);

        let mut degraded = Vec::new();
        let hyde = match hyde {
            Some(Ok(r)) => Some(r),
            Some(Err(e)) => {
                warn!(error = %e, "hypothetical-answer expansion failed; searching by query text");
                degraded.push(format!("hyde: {e}"));
                None
            }
            None => None,
        };
        if self.settings.use_llm_rewrite && self.rewriter.has_llm() && !enrichment.llm_rewritten {
            degraded.push("rewrite: LLM unavailable".to_string());
        }
        let vector = hyde.as_ref().map(|h| &h.hypothesis_embedding);

        let focal = self.focal.run_query(question, &enrichment.rewritten, k, user_id, vector).await?;
        let mut chunks = focal.chunks;
        // Disambiguation looks at what the tool itself found; widened hits of
        // other document types must not make a single match look ambiguous.
        let mut primary = None;
        if focal.filtered && chunks.len() < self.settings.min_filtered_results {
            let input = vector.map_or(QueryInput::Text(&focal.boosted_query), QueryInput::Vector);
            let unfiltered = self.store.search(input, k, user_id, None).await?;
            debug!(filtered = chunks.len(), unfiltered = unfiltered.len(), "filtered search too thin; widening");
            let merged = merge_results(chunks.clone(), unfiltered, k);
            primary = Some(std::mem::replace(&mut chunks, merged));
        }
        let retried_unfiltered = primary.is_some();

        let mut context = RetrievalContext {
            question: question.to_string(),
            search_query: focal.boosted_query,
            enrichment,
            tool: focal.tool,
            chunks,
            facts: Vec::new(),
            hyde,
            clarification: None,
            retried_unfiltered,
            degraded,
        };
        if context.no_basis() {
            info!("no documentary basis found");
            return Ok(RetrievalOutcome::Retrieved(Box::new(context)));
        }

        let candidates = primary.as_deref().filter(|p| !p.is_empty()).unwrap_or(&context.chunks);
        if let Some(c) = self.detector.check(question, candidates) {
            if c.is_actionable(self.settings.clarification_threshold) {
                info!(kind = ?c.kind, confidence = c.confidence, "asking for clarification");
                return Ok(RetrievalOutcome::Clarification(c));
            }
            context.clarification = Some(c);
        }
        context.facts = self.facts.derive(question, &context.chunks);
        debug!(chunks = context.chunks.len(), facts = context.facts.len(), tool = ?context.tool, "retrieval done");
        Ok(RetrievalOutcome::Retrieved(Box::new(context)))
    }

    /// Cache a generated answer; negative answers are dropped.
    pub async fn remember(&self, user_id: Option<&str>, question: &str, answer: &str) -> Result<bool> {
        match &self.cache {
            Some(cache) => cache.remember(user_id, question, answer).await,
            None => Ok(false),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats { store: self.store.stats(), cache: self.cache.as_ref().map(|c| c.stats()) }
    }
}

/// Filtered results first, then unseen unfiltered ones, up to `k`.
fn merge_results(primary: Vec<SearchResult>, fallback: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    let mut seen: HashSet<u64> = primary.iter().map(|r| r.chunk_id).collect();
    let mut merged = primary;
    merged.extend(fallback.into_iter().filter(|r| seen.insert(r.chunk_id)));
    merged.truncate(k);
    merged
}
