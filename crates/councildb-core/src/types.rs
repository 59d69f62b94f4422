//! Domain types shared by the store, cache, query and pipeline crates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type DocumentId = u64;
pub type ChunkId = u64;
pub type Meta = HashMap<String, String>;

/// Kind of institutional document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[serde(alias = "ata")]
    Minutes,
    #[serde(alias = "pauta")]
    Agenda,
    #[serde(alias = "resolucao")]
    Resolution,
    #[serde(alias = "regimento")]
    Bylaw,
    #[serde(alias = "outro")]
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Minutes,
        DocumentType::Agenda,
        DocumentType::Resolution,
        DocumentType::Bylaw,
        DocumentType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Minutes => "minutes",
            DocumentType::Agenda => "agenda",
            DocumentType::Resolution => "resolution",
            DocumentType::Bylaw => "bylaw",
            DocumentType::Other => "other",
        }
    }

    /// Name used inside generated prompts and clarification questions.
    pub fn label(self) -> &'static str {
        match self {
            DocumentType::Minutes => "ata",
            DocumentType::Agenda => "pauta",
            DocumentType::Resolution => "resolução",
            DocumentType::Bylaw => "regimento",
            DocumentType::Other => "documento",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "minutes" | "ata" | "atas" => Ok(DocumentType::Minutes),
            "agenda" | "agendas" | "pauta" | "pautas" => Ok(DocumentType::Agenda),
            "resolution" | "resolutions" | "resolucao" | "resolução" | "resolucoes" | "resoluções" => {
                Ok(DocumentType::Resolution)
            }
            "bylaw" | "bylaws" | "regimento" | "regimentos" => Ok(DocumentType::Bylaw),
            "other" | "outro" | "outros" => Ok(DocumentType::Other),
            other => Err(Error::Validation(format!("unknown document type '{other}'"))),
        }
    }
}

/// Who may see a document. Global documents are visible to everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    #[default]
    Global,
    User(String),
}

impl Owner {
    /// Visibility rule applied to every search: global, or owned by the requester.
    /// An anonymous requester sees global documents only.
    pub fn visible_to(&self, requester: Option<&str>) -> bool {
        match self {
            Owner::Global => true,
            Owner::User(id) => requester == Some(id.as_str()),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Owner::Global => None,
            Owner::User(id) => Some(id),
        }
    }
}

/// A single-precision embedding vector. Its length is the dimension every
/// chunk of a corpus must share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Providers returning doubles are narrowed here, never at a call site.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_f64(values: &[f64]) -> Self {
        Self(values.iter().map(|&v| v as f32).collect())
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Cosine similarity in [-1, 1].
    ///
    /// Returns `Ok(None)` when either side has zero norm, and
    /// `Err(DimensionMismatch)` when the lengths differ.
    pub fn cosine(&self, other: &Embedding) -> Result<Option<f32>> {
        if self.dim() != other.dim() {
            return Err(Error::DimensionMismatch { expected: self.dim(), actual: other.dim() });
        }
        let denom = self.norm() * other.norm();
        if denom == 0.0 || !denom.is_finite() {
            return Ok(None);
        }
        let dot: f32 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        Ok(Some((dot / denom).clamp(-1.0, 1.0)))
    }
}

/// A stored document. Identity is the content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub doc_type: DocumentType,
    pub title: String,
    pub number: Option<String>,
    pub date: Option<String>,
    pub council: Option<String>,
    pub source_path: String,
    pub content_hash: String,
    pub owner: Owner,
}

/// A document before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub doc_type: DocumentType,
    pub title: String,
    pub number: Option<String>,
    pub date: Option<String>,
    pub council: Option<String>,
    pub source_path: String,
    pub content_hash: String,
    pub owner: Owner,
}

impl NewDocument {
    pub fn into_document(self, id: DocumentId) -> Document {
        Document {
            id,
            doc_type: self.doc_type,
            title: self.title,
            number: self.number,
            date: self.date,
            council: self.council,
            source_path: self.source_path,
            content_hash: self.content_hash,
            owner: self.owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub embedding: Embedding,
    pub position: usize,
    pub metadata: Meta,
}

/// Chunk text produced by the document processor, not yet embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub text: String,
    pub position: usize,
    pub metadata: Meta,
}

impl ChunkDraft {
    pub fn with_embedding(self, embedding: Embedding) -> NewChunk {
        NewChunk { text: self.text, embedding, position: self.position, metadata: self.metadata }
    }
}

/// An embedded chunk ready for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub text: String,
    pub embedding: Embedding,
    pub position: usize,
    pub metadata: Meta,
}

/// A ranked chunk joined with its parent document's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub similarity: f32,
    pub title: String,
    pub doc_type: DocumentType,
    pub number: Option<String>,
    pub date: Option<String>,
    pub council: Option<String>,
    pub position: usize,
    pub metadata: Meta,
}

impl SearchResult {
    pub fn from_parts(chunk: &Chunk, doc: &Document, similarity: f32) -> Self {
        Self {
            chunk_id: chunk.id,
            document_id: doc.id,
            text: chunk.text.clone(),
            similarity,
            title: doc.title.clone(),
            doc_type: doc.doc_type,
            number: doc.number.clone(),
            date: doc.date.clone(),
            council: doc.council.clone(),
            position: chunk.position,
            metadata: chunk.metadata.clone(),
        }
    }
}

/// Exact-match restrictions applied on top of the visibility rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub doc_type: Option<DocumentType>,
    pub council: Option<String>,
    pub number: Option<String>,
}

impl SearchFilter {
    pub fn by_type(doc_type: DocumentType) -> Self {
        Self { doc_type: Some(doc_type), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.doc_type.is_none() && self.council.is_none() && self.number.is_none()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(t) = self.doc_type {
            if doc.doc_type != t {
                return false;
            }
        }
        if let Some(c) = &self.council {
            match &doc.council {
                Some(dc) if dc.eq_ignore_ascii_case(c) => {}
                _ => return false,
            }
        }
        if let Some(n) = &self.number {
            if doc.number.as_deref() != Some(n.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of conversation history, oldest first when in a slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub documents_by_type: BTreeMap<DocumentType, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![2.0, 4.0, 6.0]);
        let sim = a.cosine(&b).unwrap().unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_rejects_mismatched_dimensions() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!(matches!(a.cosine(&b), Err(Error::DimensionMismatch { expected: 2, actual: 3 })));
    }

    #[test]
    fn zero_vector_has_no_similarity() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.cosine(&b).unwrap(), None);
    }

    #[test]
    fn document_type_parses_folder_names() {
        assert_eq!("atas".parse::<DocumentType>().unwrap(), DocumentType::Minutes);
        assert_eq!("Pauta".parse::<DocumentType>().unwrap(), DocumentType::Agenda);
        assert_eq!("resolução".parse::<DocumentType>().unwrap(), DocumentType::Resolution);
        assert!("memo".parse::<DocumentType>().is_err());
    }

    #[test]
    fn anonymous_requester_sees_only_global() {
        assert!(Owner::Global.visible_to(None));
        assert!(!Owner::User("u1".into()).visible_to(None));
        assert!(Owner::User("u1".into()).visible_to(Some("u1")));
        assert!(!Owner::User("u1".into()).visible_to(Some("u2")));
    }
}
