use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use councildb_core::traits::EmbedProvider;
use councildb_core::types::Embedding;
use councildb_core::{Error, Result};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

/// Remote APIs send doubles; they are narrowed by `Embedding::from_f64`.
#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f64>,
    #[serde(default)]
    index: usize,
}

/// OpenAI-compatible `/embeddings` client.
pub struct RemoteEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    timeout: Duration,
    id: String,
}

impl RemoteEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, dim: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            dim,
            timeout,
            id: format!("remote:{model}:d{dim}"),
        })
    }

    fn classify(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() { Error::Timeout(self.timeout) } else { Error::Provider(format!("embedding request failed: {e}")) }
    }
}

#[async_trait]
impl EmbedProvider for RemoteEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Provider("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() { return Ok(vec![]); }
        let mut req = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&EmbeddingRequest { model: &self.model, input: texts });
        if let Some(key) = &self.api_key { req = req.bearer_auth(key); }
        let resp = req.send().await.map_err(|e| self.classify(&e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(&e))?;
        if !status.is_success() {
            return Err(Error::Provider(format!("embedding endpoint returned {status}: {body}")));
        }
        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&body).map_err(|e| Error::Provider(format!("malformed embedding response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(Error::Provider(format!("expected {} embeddings, got {}", texts.len(), parsed.data.len())));
        }
        parsed.data.sort_by_key(|d| d.index);
        debug!(n = texts.len(), "remote embeddings received");
        parsed
            .data
            .into_iter()
            .map(|d| {
                let e = Embedding::from_f64(&d.embedding);
                if e.dim() == self.dim { Ok(e) } else { Err(Error::DimensionMismatch { expected: self.dim, actual: e.dim() }) }
            })
            .collect()
    }
}
