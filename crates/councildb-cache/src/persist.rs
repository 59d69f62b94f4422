//! LanceDB table behind the answer cache. One row per (scope, normalized question).

use anyhow::Result;
use arrow_array::{Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Utc};
use lancedb::Connection;
use std::sync::Arc;
use tracing::warn;

use councildb_vector::table::{ensure_table, scan_all, str_col};

use crate::entry::{CacheEntry, CacheScope};

fn build_cache_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("scope", DataType::Utf8, false),
        Field::new("normalized", DataType::Utf8, false),
        Field::new("question", DataType::Utf8, false),
        Field::new("answer", DataType::Utf8, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

pub struct CacheTable {
    conn: Connection,
    name: String,
}

impl CacheTable {
    pub async fn open(conn: Connection, name: &str) -> Result<Self> {
        ensure_table(&conn, name, build_cache_schema()).await?;
        Ok(Self { conn, name: name.to_string() })
    }

    /// Insert or overwrite the row sharing the entry's key.
    pub async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        let batch = RecordBatch::try_new(
            build_cache_schema(),
            vec![
                Arc::new(StringArray::from(vec![entry.scope.to_string()])),
                Arc::new(StringArray::from(vec![entry.normalized.clone()])),
                Arc::new(StringArray::from(vec![entry.question.clone()])),
                Arc::new(StringArray::from(vec![entry.answer.clone()])),
                Arc::new(TimestampMillisecondArray::from(vec![entry.created_at.timestamp_millis()])),
            ],
        )?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_cache_schema()));
        let t = self.conn.open_table(&self.name).execute().await?;
        let mut mi = t.merge_insert(&["scope", "normalized"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        let _ = mi.execute(reader).await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Vec<CacheEntry>> {
        let mut out = Vec::new();
        for batch in scan_all(&self.conn, &self.name).await? {
            let scopes = str_col(&batch, "scope")?;
            let normalized = str_col(&batch, "normalized")?;
            let questions = str_col(&batch, "question")?;
            let answers = str_col(&batch, "answer")?;
            let created = batch
                .column_by_name("created_at")
                .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
                .ok_or_else(|| anyhow::anyhow!("created_at column missing"))?;
            for i in 0..batch.num_rows() {
                let Some(scope) = CacheScope::parse(scopes.value(i)) else {
                    warn!(scope = scopes.value(i), "unknown cache scope; row ignored");
                    continue;
                };
                let created_at = if created.is_null(i) {
                    Utc::now()
                } else {
                    DateTime::from_timestamp_millis(created.value(i)).unwrap_or_else(Utc::now)
                };
                out.push(CacheEntry {
                    scope,
                    normalized: normalized.value(i).to_string(),
                    question: questions.value(i).to_string(),
                    answer: answers.value(i).to_string(),
                    created_at,
                });
            }
        }
        Ok(out)
    }

    pub async fn delete_scope(&self, scope: &CacheScope) -> Result<()> {
        self.delete_where(&format!("scope = '{}'", scope.to_string().replace('\'', "''"))).await
    }

    pub async fn delete_users(&self) -> Result<()> {
        self.delete_where("scope LIKE 'user:%'").await
    }

    async fn delete_where(&self, predicate: &str) -> Result<()> {
        let t = self.conn.open_table(&self.name).execute().await?;
        let _ = t.delete(predicate).await?;
        Ok(())
    }
}
