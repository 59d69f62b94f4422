//! Embedding fingerprint bookkeeping and corpus reprocessing.
//!
//! A persisted corpus remembers which provider embedded it. Opening it with a
//! provider of another id or dimension requires a full re-embed before the
//! chunks can be searched again.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use tracing::{info, warn};

use councildb_core::traits::EmbedProvider;

use crate::schema::META_TABLE;
use crate::table::{clear_table, get_meta, set_meta, table_exists};
use crate::writer::LanceCorpus;

const EMBEDDER_KEY: &str = "embedder_id";
const DIMENSION_KEY: &str = "embedding_dimension";
const BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub embedder_id: String,
    pub dimension: usize,
}

impl Fingerprint {
    pub fn of(provider: &dyn EmbedProvider) -> Self {
        Self { embedder_id: provider.embedder_id().to_string(), dimension: provider.dim() }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (d={})", self.embedder_id, self.dimension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Nothing recorded yet.
    Fresh,
    UpToDate,
    Required { stored: Fingerprint, current: Fingerprint },
}

pub async fn stored_fingerprint(corpus: &LanceCorpus) -> Result<Option<Fingerprint>> {
    let conn = corpus.connection();
    let id = get_meta(conn, META_TABLE, EMBEDDER_KEY).await?;
    let dim = get_meta(conn, META_TABLE, DIMENSION_KEY).await?;
    Ok(match (id, dim) {
        (Some(embedder_id), Some(dim)) => Some(Fingerprint { embedder_id, dimension: dim.parse()? }),
        _ => None,
    })
}

pub async fn record_fingerprint(corpus: &LanceCorpus, fp: &Fingerprint) -> Result<()> {
    let conn = corpus.connection();
    set_meta(conn, META_TABLE, EMBEDDER_KEY, &fp.embedder_id).await?;
    set_meta(conn, META_TABLE, DIMENSION_KEY, &fp.dimension.to_string()).await
}

pub async fn check(corpus: &LanceCorpus, provider: &dyn EmbedProvider) -> Result<MigrationStatus> {
    let current = Fingerprint::of(provider);
    Ok(match stored_fingerprint(corpus).await? {
        None => MigrationStatus::Fresh,
        Some(stored) if stored == current => MigrationStatus::UpToDate,
        Some(stored) => MigrationStatus::Required { stored, current },
    })
}

/// Re-embed every persisted chunk with `provider` into a new chunks table,
/// then switch the corpus over to it. Returns the number of chunks written.
pub async fn reprocess(corpus: &mut LanceCorpus, provider: &dyn EmbedProvider) -> Result<usize> {
    let mut chunks = corpus.load_chunks(corpus.chunks_table(), false).await?;
    let next_table = next_table_name(corpus.chunks_table());
    info!(chunks = chunks.len(), from = %corpus.chunks_table(), to = %next_table, "re-embedding corpus");
    if table_exists(corpus.connection(), &next_table).await? {
        warn!(table = %next_table, "discarding rows left by an interrupted reprocess");
        clear_table(corpus.connection(), &next_table).await?;
    }

    let pb = ProgressBar::new(chunks.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks") {
        pb.set_style(style.progress_chars("#>-"));
    }
    for batch in chunks.chunks_mut(BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = provider.embed_batch(&texts).await?;
        for (chunk, e) in batch.iter_mut().zip(embeddings) {
            chunk.embedding = e;
        }
        corpus.save_chunks(&next_table, batch).await?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    corpus.activate_chunks_table(&next_table).await?;
    record_fingerprint(corpus, &Fingerprint::of(provider)).await?;
    Ok(chunks.len())
}

fn next_table_name(current: &str) -> String {
    let generation = current.rsplit_once("_v").and_then(|(_, n)| n.parse::<u64>().ok()).unwrap_or(0);
    format!("chunks_v{}", generation + 1)
}
