use anyhow::{anyhow, Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::{FixedSizeListArray, Int32Array, Int64Array, RecordBatch, StringArray, TimestampMillisecondArray};
use lancedb::Connection;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use councildb_core::types::{Chunk, Document, DocumentId, Embedding, Meta, Owner};

use crate::schema::{build_chunks_schema, build_documents_schema, DOCUMENTS_TABLE, META_TABLE};
use crate::store::DocumentStore;
use crate::table::{append, ensure_table, get_meta, i32_col, i64_col, now_millis, opt_str, open_db, scan_all, set_meta, str_col};

pub const ACTIVE_CHUNKS_KEY: &str = "active_chunks_table";
const DEFAULT_CHUNKS_TABLE: &str = "chunks_v0";

/// LanceDB-backed persistence for the document corpus.
pub struct LanceCorpus {
    conn: Connection,
    chunks_table: String,
}

impl LanceCorpus {
    pub async fn open(uri: &str) -> Result<Self> {
        let conn = open_db(uri).await?;
        ensure_table(&conn, DOCUMENTS_TABLE, build_documents_schema()).await?;
        let chunks_table = get_meta(&conn, META_TABLE, ACTIVE_CHUNKS_KEY).await?.unwrap_or_else(|| DEFAULT_CHUNKS_TABLE.to_string());
        Ok(Self { conn, chunks_table })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn chunks_table(&self) -> &str {
        &self.chunks_table
    }

    /// Point the corpus at another chunks table (after reprocessing).
    pub async fn activate_chunks_table(&mut self, name: &str) -> Result<()> {
        set_meta(&self.conn, META_TABLE, ACTIVE_CHUNKS_KEY, name).await?;
        self.chunks_table = name.to_string();
        Ok(())
    }

    /// Persist a document and its chunks. Chunks go first: a failed chunk write
    /// leaves no document row behind, and rows of a failed document write are
    /// removed again.
    pub async fn save(&self, doc: &Document, chunks: &[Chunk]) -> Result<()> {
        let doc_batch = documents_to_record_batch(std::slice::from_ref(doc))?;
        self.save_chunks(&self.chunks_table, chunks).await?;
        if let Err(e) = append(&self.conn, DOCUMENTS_TABLE, doc_batch).await {
            if !chunks.is_empty() {
                if let Err(cleanup) = self.delete_chunks(doc.id).await {
                    warn!(document_id = doc.id, error = %cleanup, "could not remove chunks of an unsaved document");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    pub async fn save_chunks(&self, table: &str, chunks: &[Chunk]) -> Result<()> {
        let Some(first) = chunks.first() else { return Ok(()) };
        let dim = i32::try_from(first.embedding.dim())?;
        ensure_table(&self.conn, table, build_chunks_schema(dim)).await?;
        append(&self.conn, table, chunks_to_record_batch(chunks, dim)?).await
    }

    pub async fn delete(&self, id: DocumentId) -> Result<()> {
        let docs = self.conn.open_table(DOCUMENTS_TABLE).execute().await?;
        let _ = docs.delete(&format!("id = {id}")).await?;
        self.delete_chunks(id).await
    }

    async fn delete_chunks(&self, id: DocumentId) -> Result<()> {
        if crate::table::table_exists(&self.conn, &self.chunks_table).await? {
            let chunks = self.conn.open_table(&self.chunks_table).execute().await?;
            let _ = chunks.delete(&format!("document_id = {id}")).await?;
        }
        Ok(())
    }

    pub async fn load_documents(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        for batch in scan_all(&self.conn, DOCUMENTS_TABLE).await? {
            docs.extend(documents_from_record_batch(&batch)?);
        }
        Ok(docs)
    }

    /// Chunk rows of `table`. With `with_vectors == false` the vector column is
    /// not decoded and embeddings come back empty.
    pub async fn load_chunks(&self, table: &str, with_vectors: bool) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for batch in scan_all(&self.conn, table).await? {
            chunks.extend(chunks_from_record_batch(&batch, with_vectors)?);
        }
        Ok(chunks)
    }

    /// Restore the persisted corpus into `store`. Returns the number of documents loaded.
    pub async fn load_into(&self, store: &DocumentStore) -> Result<usize> {
        let docs = self.load_documents().await?;
        let mut by_doc: BTreeMap<DocumentId, Vec<Chunk>> = BTreeMap::new();
        for c in self.load_chunks(&self.chunks_table, true).await? {
            by_doc.entry(c.document_id).or_default().push(c);
        }
        let mut loaded = 0usize;
        for doc in docs {
            let chunks = by_doc.remove(&doc.id).unwrap_or_default();
            store.restore(doc, chunks).context("restoring persisted corpus")?;
            loaded += 1;
        }
        for (orphan, chunks) in by_doc {
            warn!(document_id = orphan, chunks = chunks.len(), "persisted chunks without a document; ignored");
        }
        info!(documents = loaded, table = %self.chunks_table, "corpus loaded");
        Ok(loaded)
    }
}

fn to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("id {v} does not fit in i64"))
}

fn to_u64(v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| anyhow!("negative id {v}"))
}

fn documents_to_record_batch(docs: &[Document]) -> Result<RecordBatch> {
    let mut ids = Vec::new();
    let mut types = Vec::new();
    let mut titles = Vec::new();
    let mut numbers = Vec::new();
    let mut dates = Vec::new();
    let mut councils = Vec::new();
    let mut paths = Vec::new();
    let mut hashes = Vec::new();
    let mut owners = Vec::new();
    let mut created = Vec::new();
    let now = now_millis();
    for d in docs {
        ids.push(to_i64(d.id)?);
        types.push(d.doc_type.as_str().to_string());
        titles.push(d.title.clone());
        numbers.push(d.number.clone());
        dates.push(d.date.clone());
        councils.push(d.council.clone());
        paths.push(d.source_path.clone());
        hashes.push(d.content_hash.clone());
        owners.push(d.owner.user_id().map(str::to_string));
        created.push(now);
    }
    Ok(RecordBatch::try_new(
        build_documents_schema(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(types)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(numbers)),
            Arc::new(StringArray::from(dates)),
            Arc::new(StringArray::from(councils)),
            Arc::new(StringArray::from(paths)),
            Arc::new(StringArray::from(hashes)),
            Arc::new(StringArray::from(owners)),
            Arc::new(TimestampMillisecondArray::from(created)),
        ],
    )?)
}

fn documents_from_record_batch(batch: &RecordBatch) -> Result<Vec<Document>> {
    let ids = i64_col(batch, "id")?;
    let types = str_col(batch, "doc_type")?;
    let titles = str_col(batch, "title")?;
    let numbers = str_col(batch, "number")?;
    let dates = str_col(batch, "date")?;
    let councils = str_col(batch, "council")?;
    let paths = str_col(batch, "source_path")?;
    let hashes = str_col(batch, "content_hash")?;
    let owners = str_col(batch, "owner")?;
    (0..batch.num_rows())
        .map(|i| {
            Ok(Document {
                id: to_u64(ids.value(i))?,
                doc_type: types.value(i).parse()?,
                title: titles.value(i).to_string(),
                number: opt_str(numbers, i),
                date: opt_str(dates, i),
                council: opt_str(councils, i),
                source_path: paths.value(i).to_string(),
                content_hash: hashes.value(i).to_string(),
                owner: opt_str(owners, i).map_or(Owner::Global, Owner::User),
            })
        })
        .collect()
}

fn chunks_to_record_batch(chunks: &[Chunk], dim: i32) -> Result<RecordBatch> {
    let mut ids = Vec::new();
    let mut doc_ids = Vec::new();
    let mut texts = Vec::new();
    let mut positions = Vec::new();
    let mut metadata = Vec::new();
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    for c in chunks {
        ids.push(to_i64(c.id)?);
        doc_ids.push(to_i64(c.document_id)?);
        texts.push(c.text.clone());
        positions.push(i32::try_from(c.position)?);
        metadata.push(serde_json::to_string(&c.metadata)?);
        vectors.push(Some(c.embedding.as_slice().iter().map(|&x| Some(x)).collect()));
    }
    Ok(RecordBatch::try_new(
        build_chunks_schema(dim),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Int64Array::from(doc_ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(Int32Array::from(positions)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
        ],
    )?)
}

fn chunks_from_record_batch(batch: &RecordBatch, with_vectors: bool) -> Result<Vec<Chunk>> {
    let ids = i64_col(batch, "id")?;
    let doc_ids = i64_col(batch, "document_id")?;
    let texts = str_col(batch, "text")?;
    let positions = i32_col(batch, "position")?;
    let metadata = str_col(batch, "metadata")?;
    let vectors = if with_vectors {
        Some(
            batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| anyhow!("vector column missing"))?,
        )
    } else {
        None
    };
    (0..batch.num_rows())
        .map(|i| {
            let embedding = match vectors {
                Some(col) => Embedding::new(col.value(i).as_primitive::<arrow_array::types::Float32Type>().values().to_vec()),
                None => Embedding::new(vec![]),
            };
            Ok(Chunk {
                id: to_u64(ids.value(i))?,
                document_id: to_u64(doc_ids.value(i))?,
                text: texts.value(i).to_string(),
                embedding,
                position: usize::try_from(positions.value(i))?,
                metadata: serde_json::from_str::<Meta>(metadata.value(i))?,
            })
        })
        .collect()
}
