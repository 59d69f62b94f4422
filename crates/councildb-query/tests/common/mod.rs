#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use councildb_core::traits::{GenerationOptions, TextGenerator};
use councildb_core::types::{DocumentType, Meta, Message, NewChunk, NewDocument, Owner};
use councildb_core::{Error, Result};
use councildb_embed::FakeEmbedder;
use councildb_vector::DocumentStore;

/// Replies in order; errors once the script runs out.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()), calls: AtomicUsize::new(0) })
    }

    pub fn failing() -> Arc<Self> {
        Self::new(vec![])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _messages: &[Message], _options: GenerationOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Err(Error::Provider("script exhausted".into())))
    }
}

pub const DIM: usize = 64;

pub fn embedder() -> FakeEmbedder {
    FakeEmbedder::new(DIM)
}

pub fn store() -> Arc<DocumentStore> {
    Arc::new(DocumentStore::new(Arc::new(embedder())))
}

/// Ingest a one-chunk document embedded with the fake embedder.
pub fn add(store: &DocumentStore, title: &str, doc_type: DocumentType, owner: Owner, text: &str) -> u64 {
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
    let chunk = NewChunk { text: text.to_string(), embedding: embedder().embed_sync(text), position: 0, metadata: Meta::new() };
    store.ingest(doc, vec![chunk]).unwrap().document_id()
}
