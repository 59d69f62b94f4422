use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use councildb_cache::{AnswerCache, BypassPolicy, CacheScope};
use councildb_core::config::{CacheSettings, QueryTables, RetrievalSettings};
use councildb_core::traits::{GenerationOptions, TextGenerator};
use councildb_core::types::{DocumentType, Message, Meta, NewChunk, NewDocument, Owner};
use councildb_core::{Error, Result};
use councildb_embed::FakeEmbedder;
use councildb_pipeline::{PipelineBuilder, RetrievalContext, RetrievalOutcome, RetrievalPipeline, NO_BASIS_NOTICE};
use councildb_query::AmbiguityKind;
use councildb_vector::DocumentStore;

const DIM: usize = 64;

struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(&self, _messages: &[Message], _options: GenerationOptions) -> Result<String> {
        Err(Error::Provider("connection refused".into()))
    }
}

fn store() -> Arc<DocumentStore> {
    Arc::new(DocumentStore::new(Arc::new(FakeEmbedder::new(DIM))))
}

fn add(store: &DocumentStore, title: &str, doc_type: DocumentType, owner: Owner, text: &str) {
    let doc = NewDocument {
        doc_type,
        title: title.to_string(),
        number: None,
        date: None,
        council: Some("CONSUNI".into()),
        source_path: format!("{title}.md"),
        content_hash: format!("{title}:{text}"),
        owner,
    };
    let embedding = FakeEmbedder::new(DIM).embed_sync(text);
    let chunk = NewChunk { text: text.to_string(), embedding, position: 0, metadata: Meta::new() };
    store.ingest(doc, vec![chunk]).unwrap();
}

fn pipeline(store: Arc<DocumentStore>) -> RetrievalPipeline {
    PipelineBuilder::new(store, RetrievalSettings::default(), QueryTables::default()).build()
}

fn retrieved(outcome: RetrievalOutcome) -> Box<RetrievalContext> {
    match outcome {
        RetrievalOutcome::Retrieved(ctx) => ctx,
        other => panic!("expected retrieval, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_corpus_signals_no_basis() -> anyhow::Result<()> {
    let ctx = retrieved(pipeline(store()).ask("Qual a pauta da próxima reunião?", None, &[]).await?);
    assert!(ctx.chunks.is_empty());
    assert!(ctx.no_basis());
    assert_eq!(ctx.notice(), Some(NO_BASIS_NOTICE));
    assert_eq!(ctx.tool.as_deref(), Some("agenda"));
    assert!(ctx.facts.is_empty());
    Ok(())
}

#[tokio::test]
async fn blank_questions_are_rejected() {
    let err = pipeline(store()).ask("   ", None, &[]).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn vague_question_over_two_agendas_asks_for_clarification() -> anyhow::Result<()> {
    let s = store();
    add(&s, "Pauta 10", DocumentType::Agenda, Owner::Global, "pauta da reunião ordinária de março");
    add(&s, "Pauta 11", DocumentType::Agenda, Owner::Global, "pauta da reunião ordinária de abril");
    match pipeline(s).ask("Qual a pauta?", None, &[]).await? {
        RetrievalOutcome::Clarification(c) => {
            assert_eq!(c.kind, AmbiguityKind::Temporal);
            assert!(c.confidence > 0.7);
            assert!(c.render().contains("Por favor, seja mais específico."));
        }
        other => panic!("expected clarification, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn voting_question_derives_facts() -> anyhow::Result<()> {
    let s = store();
    add(&s, "Ata 5", DocumentType::Minutes, Owner::Global, "Resultado da votação: 15 votos a favor, 2 contra, 1 abstenção.");
    let ctx = retrieved(pipeline(s).ask("Qual o resultado da votação?", None, &[]).await?);
    assert_eq!(ctx.tool.as_deref(), Some("voting"));
    assert_eq!(ctx.chunks.len(), 1);
    assert!(ctx.retried_unfiltered);
    assert_eq!(ctx.facts, vec!["Votação: 15 a favor, 2 contra, 1 abstenções (total: 18)"]);
    assert!(ctx.clarification.is_none());
    assert_eq!(ctx.notice(), None);
    Ok(())
}

#[tokio::test]
async fn thin_filtered_results_are_widened() -> anyhow::Result<()> {
    let s = store();
    add(&s, "Pauta 7", DocumentType::Agenda, Owner::Global, "pauta da sessão ordinária");
    add(&s, "Ata 6", DocumentType::Minutes, Owner::Global, "ata da sessão ordinária");
    add(&s, "Ata 5", DocumentType::Minutes, Owner::Global, "ata da sessão extraordinária");
    let ctx = retrieved(pipeline(s).ask("Quais itens estão na próxima pauta?", None, &[]).await?);
    assert!(ctx.retried_unfiltered);
    assert_eq!(ctx.chunks.len(), 3);
    assert_eq!(ctx.chunks[0].title, "Pauta 7", "filtered hits stay first");
    assert!(ctx.clarification.is_none(), "a single agenda is not ambiguous");
    Ok(())
}

#[tokio::test]
async fn single_agenda_is_answered_despite_widening() -> anyhow::Result<()> {
    let s = store();
    add(&s, "Pauta 3", DocumentType::Agenda, Owner::Global, "pauta da reunião do conselho");
    add(&s, "Ata 2", DocumentType::Minutes, Owner::Global, "ata da reunião do conselho");
    add(&s, "Ata 1", DocumentType::Minutes, Owner::Global, "ata da reunião anterior");
    let ctx = retrieved(pipeline(s).ask("Qual a pauta?", None, &[]).await?);
    assert!(ctx.retried_unfiltered);
    assert_eq!(ctx.chunks.len(), 3);
    assert_eq!(ctx.chunks[0].title, "Pauta 3");
    assert!(ctx.clarification.is_none());
    Ok(())
}

#[tokio::test]
async fn private_documents_stay_private() -> anyhow::Result<()> {
    let s = store();
    add(&s, "Pauta sigilosa", DocumentType::Agenda, Owner::User("alice".into()), "pauta reservada da comissão");
    let p = pipeline(s);
    assert!(retrieved(p.ask("Qual a pauta?", Some("bob"), &[]).await?).no_basis());
    assert!(retrieved(p.ask("Qual a pauta?", None, &[]).await?).no_basis());
    let alice = retrieved(p.ask("Qual a pauta?", Some("alice"), &[]).await?);
    assert_eq!(alice.chunks.len(), 1);
    assert_eq!(alice.chunks[0].title, "Pauta sigilosa");
    Ok(())
}

#[tokio::test]
async fn provider_failures_degrade_instead_of_failing() -> anyhow::Result<()> {
    let s = store();
    add(&s, "Ata 8", DocumentType::Minutes, Owner::Global, "A sessão foi presidida pela reitora.");
    let settings = RetrievalSettings { use_hyde: true, ..RetrievalSettings::default() };
    let p = PipelineBuilder::new(s, settings, QueryTables::default())
        .with_llm(Arc::new(OfflineGenerator), Duration::from_secs(1))
        .build();
    let ctx = retrieved(p.ask("Quem presidiu a sessão?", None, &[]).await?);
    assert_eq!(ctx.chunks.len(), 1);
    assert!(!ctx.enrichment.llm_rewritten);
    assert!(ctx.degraded.iter().any(|d| d.starts_with("rewrite")));
    let hyde = ctx.hyde.as_ref().expect("templated hypothesis");
    assert!(hyde.fallback);
    Ok(())
}

#[tokio::test]
async fn cached_answers_short_circuit_unless_negative() -> anyhow::Result<()> {
    let cache = Arc::new(AnswerCache::new(BypassPolicy::new(CacheSettings::default().negative_phrases)));
    let p = PipelineBuilder::new(store(), RetrievalSettings::default(), QueryTables::default())
        .with_cache(cache.clone())
        .build();

    cache.set_user_answer("alice", "Qual a pauta?", "Não sei.").await?;
    cache.set_global_answer("Qual a pauta?", "Orçamento de 2025.").await?;
    match p.ask("qual a PAUTA", Some("alice"), &[]).await? {
        RetrievalOutcome::Cached(hit) => {
            assert_eq!(hit.scope, CacheScope::Global);
            assert_eq!(hit.answer, "Orçamento de 2025.");
        }
        other => panic!("expected cache hit, got {other:?}"),
    }

    assert!(!p.remember(Some("bob"), "Quem presidiu?", "Não encontrei essa informação.").await?);
    assert!(retrieved(p.ask("Quem presidiu?", Some("bob"), &[]).await?).no_basis());

    assert!(p.remember(Some("bob"), "Quem presidiu?", "A reitora.").await?);
    match p.ask("Quem presidiu?", Some("bob"), &[]).await? {
        RetrievalOutcome::Cached(hit) => assert_eq!(hit.scope, CacheScope::user("bob")),
        other => panic!("expected cache hit, got {other:?}"),
    }

    let stats = p.stats();
    assert_eq!(stats.cache.map(|c| c.total()), Some(4));
    assert_eq!(stats.store.document_count, 0);
    Ok(())
}

#[tokio::test]
async fn without_a_cache_nothing_is_remembered() -> anyhow::Result<()> {
    let p = pipeline(store());
    assert!(!p.remember(None, "Qual a pauta?", "Orçamento.").await?);
    assert!(p.stats().cache.is_none());
    Ok(())
}
