use std::sync::Arc;
use tracing::debug;

use councildb_core::config::ToolConfig;
use councildb_core::text::contains_any;
use councildb_core::types::{Embedding, SearchFilter, SearchResult};
use councildb_core::Result;
use councildb_vector::{DocumentStore, QueryInput};

/// Candidates fetched per requested result before term post-filtering.
const POST_FILTER_POOL: usize = 3;

#[derive(Debug, Clone)]
pub struct FocalResult {
    pub tool: Option<String>,
    pub boosted_query: String,
    pub chunks: Vec<SearchResult>,
    /// The results were narrowed by the tool's type filter or filter terms.
    pub filtered: bool,
}

/// Routes a question to a specialized retrieval tool.
pub struct FocalToolSelector {
    store: Arc<DocumentStore>,
    tools: Vec<ToolConfig>,
}

impl FocalToolSelector {
    pub fn new(store: Arc<DocumentStore>, tools: Vec<ToolConfig>) -> Self {
        Self { store, tools }
    }

    pub fn tools(&self) -> &[ToolConfig] {
        &self.tools
    }

    /// First tool, in table order, with a detect term inside the lowercased question.
    pub fn pick(&self, question: &str) -> Option<&ToolConfig> {
        let q = question.to_lowercase();
        self.tools.iter().find(|t| contains_any(&q, &t.detect_terms))
    }

    /// Search through the matching tool. `vector` replaces the query
    /// embedding (hypothetical-answer search).
    ///
    /// A tool whose filter leaves nothing still reports its name with an
    /// empty chunk list; retrying unfiltered is the caller's call.
    pub async fn run(
        &self,
        question: &str,
        k: usize,
        requester: Option<&str>,
        vector: Option<&Embedding>,
    ) -> Result<FocalResult> {
        self.run_query(question, question, k, requester, vector).await
    }

    /// Like `run`, but the tool is picked from `question` while `query`
    /// (typically a rewrite of it) is what gets boosted and searched.
    pub async fn run_query(
        &self,
        question: &str,
        query: &str,
        k: usize,
        requester: Option<&str>,
        vector: Option<&Embedding>,
    ) -> Result<FocalResult> {
        let Some(tool) = self.pick(question) else {
            let chunks = self.search(query, k, requester, None, vector).await?;
            return Ok(FocalResult { tool: None, boosted_query: query.to_string(), chunks, filtered: false });
        };
        let boosted_query = format!("{query}{}", tool.boost);
        let chunks = match tool.doc_type {
            Some(doc_type) => {
                self.search(&boosted_query, k, requester, Some(&SearchFilter::by_type(doc_type)), vector).await?
            }
            None if tool.filter_terms.is_empty() => self.search(&boosted_query, k, requester, None, vector).await?,
            None => {
                let pool = self.search(&boosted_query, k.saturating_mul(POST_FILTER_POOL), requester, None, vector).await?;
                let terms: Vec<String> = tool.filter_terms.iter().map(|t| t.to_lowercase()).collect();
                pool.into_iter()
                    .filter(|r| contains_any(&r.text.to_lowercase(), &terms) || contains_any(&r.title.to_lowercase(), &terms))
                    .take(k)
                    .collect()
            }
        };
        let filtered = tool.doc_type.is_some() || !tool.filter_terms.is_empty();
        debug!(tool = %tool.name, results = chunks.len(), filtered, "focal search");
        Ok(FocalResult { tool: Some(tool.name.clone()), boosted_query, chunks, filtered })
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        requester: Option<&str>,
        filter: Option<&SearchFilter>,
        vector: Option<&Embedding>,
    ) -> Result<Vec<SearchResult>> {
        let input = vector.map_or(QueryInput::Text(query), QueryInput::Vector);
        self.store.search(input, k, requester, filter).await
    }
}
