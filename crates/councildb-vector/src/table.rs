//! LanceDB connection and housekeeping helpers.
//!
//! Provides database open functions, an ensure helper for tables, and a simple
//! key/value metadata table used to store pointers such as the active chunks
//! table and the embedding fingerprint.
use anyhow::{anyhow, Result};
use arrow_array::{Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Remove every row of `name`, if the table exists. The schema is kept.
pub async fn clear_table(conn: &Connection, name: &str) -> Result<()> {
    if table_exists(conn, name).await? {
        let _ = conn.open_table(name).execute().await?.delete("true").await?;
    }
    Ok(())
}

/// Append one batch to an existing table.
pub async fn append(conn: &Connection, name: &str, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    conn.open_table(name).execute().await?.add(reader).execute().await?;
    Ok(())
}

/// Every batch of a table, in storage order.
pub async fn scan_all(conn: &Connection, name: &str) -> Result<Vec<RecordBatch>> {
    if !table_exists(conn, name).await? {
        return Ok(vec![]);
    }
    let t = conn.open_table(name).execute().await?;
    let mut stream = t.query().execute().await?;
    let mut out = Vec::new();
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        out.push(batch);
    }
    Ok(out)
}

pub fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}

pub fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}

pub fn i32_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}

pub fn opt_str(col: &StringArray, i: usize) -> Option<String> {
    (!col.is_null(i)).then(|| col.value(i).to_string())
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// Simple key/value meta table
fn build_meta_schema() -> Arc<arrow_schema::Schema> {
    Arc::new(arrow_schema::Schema::new(vec![
        arrow_schema::Field::new("key", arrow_schema::DataType::Utf8, false),
        arrow_schema::Field::new("value", arrow_schema::DataType::Utf8, false),
        arrow_schema::Field::new("updated_at", arrow_schema::DataType::Timestamp(arrow_schema::TimeUnit::Millisecond, None), false),
    ]))
}

pub async fn ensure_meta_table(conn: &Connection, name: &str) -> Result<()> {
    ensure_table(conn, name, build_meta_schema()).await
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_meta_table(conn, table).await?;
    let t = conn.open_table(table).execute().await?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![now_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // Upsert behavior via merge_insert: key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    let _ = mi.execute(reader).await?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? { return Ok(None); }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t.query().only_if(format!("key = '{}'", key.replace('\'', "''"))).execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        if batch.num_rows() == 0 { continue; }
        let val = str_col(&batch, "value")?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}
