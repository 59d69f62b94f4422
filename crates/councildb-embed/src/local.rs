use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use councildb_core::config::EmbeddingSettings;
use councildb_core::traits::EmbedProvider;
use councildb_core::types::Embedding;
use councildb_core::Error;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::encode_batch;

/// Sentence-transformer style BERT encoder (e.g. all-MiniLM-L6-v2) run with candle.
pub struct LocalEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    dim: usize,
    max_len: usize,
    id: String,
}

impl LocalEmbedder {
    pub fn load(model_dir: &Path, model_name: &str, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading local embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let raw_config = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|d| usize::try_from(d).ok())
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))?;

        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        info!(dim, "local embedding model loaded");
        Ok(Self { model, tokenizer, device, pad_id, dim, max_len, id: format!("local:{model_name}:d{dim}") })
    }

    /// One forward pass for the whole batch.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = encode_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        if let Some(bad) = rows.iter().find(|r| r.len() != self.dim) {
            return Err(anyhow!("model produced {} values, expected {}", bad.len(), self.dim));
        }
        debug!(batch = texts.len(), ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(rows)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is treated as read-only for the lifetime of the model.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)?;
    let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

#[async_trait]
impl EmbedProvider for LocalEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    async fn embed(&self, text: &str) -> councildb_core::Result<Embedding> {
        let mut rows = self.embed_batch(&[text.to_string()]).await?;
        rows.pop().ok_or_else(|| Error::Provider("empty embedding batch".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> councildb_core::Result<Vec<Embedding>> {
        let rows = self.embed_texts(texts).map_err(|e| Error::Provider(e.to_string()))?;
        Ok(rows.into_iter().map(Embedding::new).collect())
    }
}

/// Model directory from settings, then `APP_MODEL_DIR`/`MODEL_DIR`, then `models/<name>`.
pub fn resolve_model_dir(settings: &EmbeddingSettings) -> Result<PathBuf> {
    let candidates = settings
        .model_dir
        .iter()
        .map(councildb_core::config::expand_path)
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain(settings.model.rsplit('/').next().map(|name| Path::new("models").join(name)));
    for p in candidates {
        if p.exists() { return Ok(p); }
        warn!(dir = %p.display(), "model directory not found");
    }
    Err(anyhow!("Could not locate a model directory for {}", settings.model))
}
