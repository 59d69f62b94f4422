//! In-memory document store with permission-scoped cosine search.
//!
//! Search is a linear scan over every chunk: visibility and filters are
//! applied first, then similarity, then a stable descending sort so ties keep
//! ingestion order.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use councildb_core::traits::{with_timeout, EmbedProvider};
use councildb_core::types::{
    Chunk, ChunkDraft, ChunkId, Document, DocumentId, Embedding, NewChunk, NewDocument, SearchFilter, SearchResult,
    StoreStats,
};
use councildb_core::{Error, Result};

/// What a search ranks against.
#[derive(Debug, Clone, Copy)]
pub enum QueryInput<'a> {
    Text(&'a str),
    Vector(&'a Embedding),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted(DocumentId),
    /// A document with the same content hash was already stored.
    AlreadyPresent(DocumentId),
}

impl IngestOutcome {
    pub fn document_id(self) -> DocumentId {
        match self {
            IngestOutcome::Inserted(id) | IngestOutcome::AlreadyPresent(id) => id,
        }
    }
}

#[derive(Default)]
struct Corpus {
    documents: BTreeMap<DocumentId, Document>,
    chunks: Vec<Chunk>,
    by_hash: HashMap<String, DocumentId>,
    next_document_id: DocumentId,
    next_chunk_id: ChunkId,
}

impl Corpus {
    fn insert_chunks(&mut self, document_id: DocumentId, chunks: Vec<NewChunk>) -> Vec<ChunkId> {
        let mut ids = Vec::with_capacity(chunks.len());
        for c in chunks {
            let id = self.next_chunk_id;
            self.next_chunk_id += 1;
            self.chunks.push(Chunk {
                id,
                document_id,
                text: c.text,
                embedding: c.embedding,
                position: c.position,
                metadata: c.metadata,
            });
            ids.push(id);
        }
        ids
    }
}

pub struct DocumentStore {
    embedder: Arc<dyn EmbedProvider>,
    dim: usize,
    embed_timeout: Duration,
    corpus: RwLock<Corpus>,
}

impl DocumentStore {
    pub fn new(embedder: Arc<dyn EmbedProvider>) -> Self {
        let dim = embedder.dim();
        Self { embedder, dim, embed_timeout: Duration::from_secs(30), corpus: RwLock::new(Corpus::default()) }
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn EmbedProvider> {
        &self.embedder
    }

    /// The single embedding dimension every stored chunk shares.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn check_dims<'a>(&self, embeddings: impl IntoIterator<Item = &'a Embedding>) -> Result<()> {
        for e in embeddings {
            if e.dim() != self.dim {
                return Err(Error::DimensionMismatch { expected: self.dim, actual: e.dim() });
            }
        }
        Ok(())
    }

    /// Insert a document with its embedded chunks as one unit.
    ///
    /// A document whose content hash is already stored is not inserted again.
    pub fn ingest(&self, doc: NewDocument, chunks: Vec<NewChunk>) -> Result<IngestOutcome> {
        self.check_dims(chunks.iter().map(|c| &c.embedding))?;
        let mut corpus = self.corpus.write();
        if let Some(&existing) = corpus.by_hash.get(&doc.content_hash) {
            info!(document_id = existing, title = %doc.title, "document already present");
            return Ok(IngestOutcome::AlreadyPresent(existing));
        }
        let id = corpus.next_document_id;
        corpus.next_document_id += 1;
        corpus.by_hash.insert(doc.content_hash.clone(), id);
        let n = chunks.len();
        corpus.insert_chunks(id, chunks);
        debug!(document_id = id, chunks = n, "document ingested");
        corpus.documents.insert(id, doc.into_document(id));
        Ok(IngestOutcome::Inserted(id))
    }

    /// Embed chunk drafts with the store's provider, then ingest.
    pub async fn ingest_drafts(&self, doc: NewDocument, drafts: Vec<ChunkDraft>) -> Result<IngestOutcome> {
        if let Some(&existing) = self.corpus.read().by_hash.get(&doc.content_hash) {
            return Ok(IngestOutcome::AlreadyPresent(existing));
        }
        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let embeddings = with_timeout(self.embed_timeout, self.embedder.embed_batch(&texts)).await?;
        if embeddings.len() != drafts.len() {
            return Err(Error::Provider(format!("expected {} embeddings, got {}", drafts.len(), embeddings.len())));
        }
        let chunks = drafts.into_iter().zip(embeddings).map(|(d, e)| d.with_embedding(e)).collect();
        self.ingest(doc, chunks)
    }

    /// Re-insert a persisted document under its original ids.
    pub fn restore(&self, doc: Document, chunks: Vec<Chunk>) -> Result<()> {
        self.check_dims(chunks.iter().map(|c| &c.embedding))?;
        let mut corpus = self.corpus.write();
        if corpus.documents.contains_key(&doc.id) {
            return Err(Error::Storage(format!("document id {} restored twice", doc.id)));
        }
        corpus.next_document_id = corpus.next_document_id.max(doc.id + 1);
        if let Some(max_chunk) = chunks.iter().map(|c| c.id).max() {
            corpus.next_chunk_id = corpus.next_chunk_id.max(max_chunk + 1);
        }
        corpus.by_hash.insert(doc.content_hash.clone(), doc.id);
        corpus.chunks.extend(chunks);
        corpus.documents.insert(doc.id, doc);
        Ok(())
    }

    pub fn get_document(&self, id: DocumentId) -> Option<Document> {
        self.corpus.read().documents.get(&id).cloned()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.corpus.read().documents.values().cloned().collect()
    }

    pub fn chunks_for(&self, id: DocumentId) -> Vec<Chunk> {
        self.corpus.read().chunks.iter().filter(|c| c.document_id == id).cloned().collect()
    }

    /// Remove a document and all of its chunks.
    pub fn delete_document(&self, id: DocumentId) -> Result<Document> {
        let mut corpus = self.corpus.write();
        let doc = corpus.documents.remove(&id).ok_or_else(|| Error::NotFound(format!("document {id}")))?;
        corpus.by_hash.remove(&doc.content_hash);
        corpus.chunks.retain(|c| c.document_id != id);
        Ok(doc)
    }

    /// Swap a document's chunks for a freshly processed set.
    pub fn replace_chunks(&self, id: DocumentId, chunks: Vec<NewChunk>) -> Result<Vec<ChunkId>> {
        self.check_dims(chunks.iter().map(|c| &c.embedding))?;
        let mut corpus = self.corpus.write();
        if !corpus.documents.contains_key(&id) {
            return Err(Error::NotFound(format!("document {id}")));
        }
        corpus.chunks.retain(|c| c.document_id != id);
        Ok(corpus.insert_chunks(id, chunks))
    }

    pub fn stats(&self) -> StoreStats {
        let corpus = self.corpus.read();
        let mut documents_by_type = BTreeMap::new();
        for d in corpus.documents.values() {
            *documents_by_type.entry(d.doc_type).or_insert(0) += 1;
        }
        StoreStats { document_count: corpus.documents.len(), chunk_count: corpus.chunks.len(), documents_by_type }
    }

    /// Rank visible chunks by cosine similarity and return the best `k`.
    ///
    /// Chunks owned by another user are never returned; an anonymous
    /// requester sees global documents only. An empty corpus yields an empty
    /// list without calling the embedder.
    pub async fn search(
        &self,
        input: QueryInput<'_>,
        k: usize,
        requester: Option<&str>,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(Error::Validation("k must be positive".into()));
        }
        if let QueryInput::Text(q) = input {
            if q.trim().is_empty() {
                return Err(Error::Validation("query text is empty".into()));
            }
        }
        if self.corpus.read().chunks.is_empty() {
            return Ok(vec![]);
        }
        let owned;
        let query = match input {
            QueryInput::Text(q) => {
                owned = with_timeout(self.embed_timeout, self.embedder.embed(q)).await?;
                &owned
            }
            QueryInput::Vector(v) => v,
        };
        if query.dim() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.dim() });
        }
        Ok(self.scan(query, k, requester, filter))
    }

    pub async fn search_text(
        &self,
        query: &str,
        k: usize,
        requester: Option<&str>,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        self.search(QueryInput::Text(query), k, requester, filter).await
    }

    fn scan(&self, query: &Embedding, k: usize, requester: Option<&str>, filter: Option<&SearchFilter>) -> Vec<SearchResult> {
        let corpus = self.corpus.read();
        let mut scored: Vec<(f32, &Chunk, &Document)> = Vec::new();
        for chunk in &corpus.chunks {
            let Some(doc) = corpus.documents.get(&chunk.document_id) else {
                warn!(chunk_id = chunk.id, document_id = chunk.document_id, "chunk without document; skipping");
                continue;
            };
            if !doc.owner.visible_to(requester) {
                continue;
            }
            if filter.is_some_and(|f| !f.matches(doc)) {
                continue;
            }
            match query.cosine(&chunk.embedding) {
                Ok(Some(sim)) => scored.push((sim, chunk, doc)),
                Ok(None) => debug!(chunk_id = chunk.id, "zero-norm embedding; skipping"),
                Err(e) => warn!(chunk_id = chunk.id, error = %e, "skipping chunk"),
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(k).map(|(sim, c, d)| SearchResult::from_parts(c, d, sim)).collect()
    }
}
