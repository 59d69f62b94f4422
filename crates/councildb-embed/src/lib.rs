//! Embedding providers: a deterministic hashed fake for tests, a local candle
//! BERT encoder, and an OpenAI-compatible HTTP client.

pub mod device;
pub mod pool;
pub mod tokenize;
mod fake;
mod local;
mod remote;

use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use councildb_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use councildb_core::traits::EmbedProvider;

pub use fake::FakeEmbedder;
pub use local::{resolve_model_dir, LocalEmbedder};
pub use pool::masked_mean_l2;
pub use remote::RemoteEmbedder;

/// `APP_USE_FAKE_EMBEDDINGS=1|true` forces the fake embedder regardless of settings.
pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbedProvider>> {
    if fake_embeddings_requested() || settings.provider == EmbeddingProviderKind::Fake {
        info!(dim = settings.dimension, "using fake embedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    match settings.provider {
        EmbeddingProviderKind::Local => {
            let dir = resolve_model_dir(settings)?;
            let model = LocalEmbedder::load(&dir, &settings.model, settings.max_len)?;
            if model.dim() != settings.dimension {
                bail!("model {} has dimension {}, configuration says {}", settings.model, model.dim(), settings.dimension);
            }
            Ok(Arc::new(model))
        }
        EmbeddingProviderKind::OpenAi => {
            let api_key = std::env::var(&settings.api_key_env).ok();
            if api_key.is_none() { warn!(var = %settings.api_key_env, "no API key set for remote embeddings"); }
            let timeout = Duration::from_millis(settings.timeout_ms);
            Ok(Arc::new(RemoteEmbedder::new(&settings.api_url, &settings.model, api_key, settings.dimension, timeout)?))
        }
        EmbeddingProviderKind::Fake => Ok(Arc::new(FakeEmbedder::new(settings.dimension))),
    }
}
