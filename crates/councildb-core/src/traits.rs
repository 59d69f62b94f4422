use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{Embedding, Message};

#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `fake:d384`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Embed one text. Vectors are L2-normalized and of length `dim()`.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self { temperature, max_tokens }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, messages: &[Message], options: GenerationOptions) -> Result<String>;
}

/// Bound a provider call. Elapsed budgets surface as `Error::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(limit)),
    }
}
