use std::sync::Arc;

use councildb_core::traits::EmbedProvider;
use councildb_core::types::{DocumentType, Meta, NewChunk, NewDocument, Owner};
use councildb_embed::FakeEmbedder;
use councildb_vector::migration::{check, record_fingerprint, reprocess};
use councildb_vector::{DocumentStore, Fingerprint, LanceCorpus, MigrationStatus};
use tempfile::TempDir;

fn new_doc(title: &str, owner: Owner) -> NewDocument {
    NewDocument {
        doc_type: DocumentType::Minutes,
        title: title.to_string(),
        number: Some("12/2024".into()),
        date: None,
        council: Some("CONSUNI".into()),
        source_path: format!("atas/{title}.md"),
        content_hash: format!("hash-{title}"),
        owner,
    }
}

async fn seed(corpus: &LanceCorpus, embedder: &FakeEmbedder) -> anyhow::Result<DocumentStore> {
    let store = DocumentStore::new(Arc::new(embedder.clone()));
    for (title, text, owner) in [
        ("sessao-12", "aprovada a proposta de calendário", Owner::Global),
        ("sessao-13", "votação do orçamento anual", Owner::User("alice".into())),
    ] {
        let mut metadata = Meta::new();
        metadata.insert("section".into(), "Deliberações".into());
        let chunk = NewChunk { text: text.into(), embedding: embedder.embed_sync(text), position: 0, metadata };
        let id = store.ingest(new_doc(title, owner), vec![chunk])?.document_id();
        let doc = store.get_document(id).expect("ingested document");
        corpus.save(&doc, &store.chunks_for(id)).await?;
    }
    Ok(store)
}

#[tokio::test]
async fn corpus_round_trips_through_lance() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let uri = tmp.path().join("db").to_string_lossy().to_string();
    let embedder = FakeEmbedder::new(32);
    let corpus = LanceCorpus::open(&uri).await?;
    let original = seed(&corpus, &embedder).await?;

    let reopened = LanceCorpus::open(&uri).await?;
    let restored = DocumentStore::new(Arc::new(embedder.clone()));
    assert_eq!(reopened.load_into(&restored).await?, 2);

    assert_eq!(restored.stats().chunk_count, original.stats().chunk_count);
    let alice = restored.documents().into_iter().find(|d| d.title == "sessao-13").expect("restored");
    assert_eq!(alice.owner, Owner::User("alice".into()));
    assert_eq!(alice.number.as_deref(), Some("12/2024"));
    assert_eq!(alice.date, None);

    let hits = restored.search_text("votação do orçamento anual", 1, Some("alice"), None).await?;
    assert_eq!(hits[0].title, "sessao-13");
    assert_eq!(hits[0].metadata.get("section").map(String::as_str), Some("Deliberações"));
    assert!(restored.search_text("votação do orçamento anual", 5, None, None).await?.iter().all(|h| h.title != "sessao-13"));
    Ok(())
}

#[tokio::test]
async fn deleted_documents_stay_deleted() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let uri = tmp.path().join("db").to_string_lossy().to_string();
    let embedder = FakeEmbedder::new(16);
    let corpus = LanceCorpus::open(&uri).await?;
    let store = seed(&corpus, &embedder).await?;
    let victim = store.documents()[0].id;
    corpus.delete(victim).await?;

    let restored = DocumentStore::new(Arc::new(embedder));
    assert_eq!(corpus.load_into(&restored).await?, 1);
    assert!(restored.get_document(victim).is_none());
    Ok(())
}

#[tokio::test]
async fn fingerprint_change_requires_reprocessing() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let uri = tmp.path().join("db").to_string_lossy().to_string();
    let old = FakeEmbedder::new(16);
    let mut corpus = LanceCorpus::open(&uri).await?;
    seed(&corpus, &old).await?;

    assert_eq!(check(&corpus, &old).await?, MigrationStatus::Fresh);
    record_fingerprint(&corpus, &Fingerprint::of(&old)).await?;
    assert_eq!(check(&corpus, &old).await?, MigrationStatus::UpToDate);

    let new = FakeEmbedder::new(24);
    match check(&corpus, &new).await? {
        MigrationStatus::Required { stored, current } => {
            assert_eq!(stored.dimension, 16);
            assert_eq!(current.dimension, 24);
        }
        other => panic!("expected migration, got {other:?}"),
    }

    assert_eq!(reprocess(&mut corpus, &new).await?, 2);
    assert_eq!(corpus.chunks_table(), "chunks_v1");
    assert_eq!(check(&corpus, &new).await?, MigrationStatus::UpToDate);

    let reopened = LanceCorpus::open(&uri).await?;
    assert_eq!(reopened.chunks_table(), "chunks_v1");
    let store = DocumentStore::new(Arc::new(new.clone()));
    reopened.load_into(&store).await?;
    assert!(store.chunks_for(0).iter().all(|c| c.embedding.dim() == new.dim()));
    let hits = store.search_text("aprovada a proposta de calendário", 1, None, None).await?;
    assert_eq!(hits[0].title, "sessao-12");
    Ok(())
}

#[tokio::test]
async fn reprocess_discards_leftover_generation() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let uri = tmp.path().join("db").to_string_lossy().to_string();
    let old = FakeEmbedder::new(16);
    let new = FakeEmbedder::new(24);
    let mut corpus = LanceCorpus::open(&uri).await?;
    let store = seed(&corpus, &old).await?;
    record_fingerprint(&corpus, &Fingerprint::of(&old)).await?;

    // An earlier run that wrote part of chunks_v1 and then died.
    let mut stale = store.chunks_for(0);
    for c in &mut stale {
        c.embedding = new.embed_sync(&c.text);
    }
    corpus.save_chunks("chunks_v1", &stale).await?;

    assert_eq!(reprocess(&mut corpus, &new).await?, 2);
    assert_eq!(corpus.chunks_table(), "chunks_v1");
    assert_eq!(corpus.load_chunks("chunks_v1", false).await?.len(), 2);

    let restored = DocumentStore::new(Arc::new(new.clone()));
    corpus.load_into(&restored).await?;
    assert_eq!(restored.stats().chunk_count, 2);
    let hits = restored.search_text("aprovada a proposta de calendário", 5, Some("alice"), None).await?;
    let mut ids: Vec<_> = hits.iter().map(|h| h.chunk_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), hits.len(), "no chunk is returned twice");
    Ok(())
}

#[tokio::test]
async fn failed_chunk_write_leaves_no_document() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let uri = tmp.path().join("db").to_string_lossy().to_string();
    let corpus = LanceCorpus::open(&uri).await?;
    seed(&corpus, &FakeEmbedder::new(32)).await?;

    // chunks_v0 holds 32-d vectors; a 16-d chunk cannot be appended to it.
    let narrow = FakeEmbedder::new(16);
    let other = DocumentStore::new(Arc::new(narrow.clone()));
    let text = "parecer da comissão de legislação";
    let chunk = NewChunk { text: text.into(), embedding: narrow.embed_sync(text), position: 0, metadata: Meta::new() };
    let id = other.ingest(new_doc("sessao-14", Owner::Global), vec![chunk])?.document_id();
    let doc = other.get_document(id).expect("ingested document");
    assert!(corpus.save(&doc, &other.chunks_for(id)).await.is_err());

    let titles: Vec<String> = corpus.load_documents().await?.into_iter().map(|d| d.title).collect();
    assert_eq!(titles.len(), 2);
    assert!(!titles.iter().any(|t| t == "sessao-14"));
    Ok(())
}
