use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use councildb_cache::{AnswerCache, BypassPolicy};
use councildb_core::config::{expand_path, Settings};
use councildb_core::data_processor::DataProcessor;
use councildb_core::traits::{EmbedProvider, TextGenerator};
use councildb_core::types::Owner;
use councildb_embed::build_embedder;
use councildb_pipeline::{PipelineBuilder, RetrievalContext, RetrievalOutcome};
use councildb_query::OpenAiChatGenerator;
use councildb_vector::migration::{self, Fingerprint, MigrationStatus};
use councildb_vector::{DocumentStore, IngestOutcome, LanceCorpus};

/// Persisted corpus, the provider that embeds it and its in-memory store.
struct Workspace {
    corpus: LanceCorpus,
    embedder: Arc<dyn EmbedProvider>,
    store: Arc<DocumentStore>,
}

/// Open the corpus and refuse to search it with a mismatched embedder.
async fn open_workspace(settings: &Settings, load: bool) -> Result<Workspace> {
    let embedder = build_embedder(&settings.embedding)?;
    let db_dir = expand_path(&settings.data.db_dir);
    let corpus = LanceCorpus::open(&db_dir.to_string_lossy()).await?;
    match migration::check(&corpus, embedder.as_ref()).await? {
        MigrationStatus::Fresh => migration::record_fingerprint(&corpus, &Fingerprint::of(embedder.as_ref())).await?,
        MigrationStatus::UpToDate => {}
        MigrationStatus::Required { stored, current } if load => {
            bail!("corpus was embedded with {stored}, configured provider is {current}; run `councildb reprocess`")
        }
        MigrationStatus::Required { .. } => {}
    }
    let store = Arc::new(
        DocumentStore::new(embedder.clone()).with_embed_timeout(Duration::from_millis(settings.embedding.timeout_ms)),
    );
    if load {
        corpus.load_into(&store).await?;
    }
    Ok(Workspace { corpus, embedder, store })
}

async fn open_cache(settings: &Settings, corpus: &LanceCorpus) -> Result<Arc<AnswerCache>> {
    let policy = BypassPolicy::new(settings.cache.negative_phrases.iter());
    let cache = if settings.cache.persist {
        AnswerCache::open(corpus.connection().clone(), &settings.cache.table, policy).await?
    } else {
        AnswerCache::new(policy)
    };
    Ok(Arc::new(cache))
}

pub async fn ingest(settings: &Settings, dir: Option<PathBuf>, owner: Option<String>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| expand_path(&settings.data.docs_dir));
    let ws = open_workspace(settings, true).await?;
    let owner = owner.map_or(Owner::Global, Owner::User);
    let processed = DataProcessor::new().with_owner(owner).process_directory(&dir)?;

    let pb = ProgressBar::new(processed.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    let (mut inserted, mut skipped) = (0usize, 0usize);
    for p in processed {
        pb.set_message(p.document.title.clone());
        match ws.store.ingest_drafts(p.document, p.chunks).await? {
            IngestOutcome::Inserted(id) => {
                if let Some(doc) = ws.store.get_document(id) {
                    ws.corpus.save(&doc, &ws.store.chunks_for(id)).await?;
                }
                inserted += 1;
            }
            IngestOutcome::AlreadyPresent(_) => skipped += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!(inserted, skipped, dir = %dir.display(), "ingestion finished");
    println!("Ingested {inserted} documents ({skipped} already present) from {}", dir.display());
    Ok(())
}

pub async fn ask(settings: &Settings, question: &str, user: Option<&str>, no_llm: bool) -> Result<()> {
    let ws = open_workspace(settings, true).await?;
    let cache = open_cache(settings, &ws.corpus).await?;
    let mut retrieval = settings.retrieval.clone();
    if no_llm {
        retrieval.use_llm_rewrite = false;
        retrieval.use_hyde = false;
    }
    let mut builder = PipelineBuilder::new(ws.store.clone(), retrieval, settings.tables.clone()).with_cache(cache);
    if !no_llm {
        match OpenAiChatGenerator::from_settings(&settings.llm) {
            Ok(llm) => {
                let llm: Arc<dyn TextGenerator> = Arc::new(llm);
                builder = builder.with_llm(llm, Duration::from_millis(settings.llm.timeout_ms));
            }
            Err(e) => warn!(error = %e, "LLM client unavailable; continuing without it"),
        }
    }
    let pipeline = builder.build();

    match pipeline.ask(question, user, &[]).await? {
        RetrievalOutcome::Cached(hit) => {
            println!("[cache: {}]\n{}", hit.scope, hit.answer);
        }
        RetrievalOutcome::Clarification(c) => println!("{}", c.render()),
        RetrievalOutcome::Retrieved(ctx) => print_context(&ctx),
    }
    Ok(())
}

fn print_context(ctx: &RetrievalContext) {
    println!("Query: {}", ctx.search_query);
    if let Some(tool) = &ctx.tool {
        println!("Tool: {tool}{}", if ctx.retried_unfiltered { " (widened)" } else { "" });
    }
    for note in &ctx.degraded {
        println!("Degraded: {note}");
    }
    if let Some(notice) = ctx.notice() {
        println!("\n{notice}");
        return;
    }
    for (i, r) in ctx.chunks.iter().enumerate() {
        println!("\n  {}. {:.4}  {} [{}]", i + 1, r.similarity, r.title, r.doc_type.as_str());
        println!("     {}", r.text.replace('\n', " "));
    }
    if !ctx.facts.is_empty() {
        println!("\nFacts:");
        for f in &ctx.facts {
            println!("  - {f}");
        }
    }
    if let Some(c) = &ctx.clarification {
        println!("\nPossible ambiguity ({:.2}): {}", c.confidence, c.options.join("; "));
    }
}

pub async fn stats(settings: &Settings) -> Result<()> {
    let ws = open_workspace(settings, true).await?;
    let cache = open_cache(settings, &ws.corpus).await?;
    let store = ws.store.stats();
    println!("Corpus: {} documents, {} chunks ({})", store.document_count, store.chunk_count, ws.corpus.chunks_table());
    for (doc_type, n) in &store.documents_by_type {
        println!("  {:<12} {n}", doc_type.as_str());
    }
    let cache = cache.stats();
    println!("Cache: {} user entries, {} global entries", cache.user_entries, cache.global_entries);
    println!("Embedder: {}", Fingerprint::of(ws.embedder.as_ref()));
    Ok(())
}

pub async fn reprocess(settings: &Settings) -> Result<()> {
    let mut ws = open_workspace(settings, false).await?;
    let n = migration::reprocess(&mut ws.corpus, ws.embedder.as_ref()).await?;
    println!("Re-embedded {n} chunks into {}", ws.corpus.chunks_table());
    Ok(())
}
