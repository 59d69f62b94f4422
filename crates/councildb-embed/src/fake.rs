use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use councildb_core::text::normalize_question;
use councildb_core::traits::EmbedProvider;
use councildb_core::types::Embedding;
use councildb_core::Result;

/// Deterministic bag-of-tokens embedder. Texts sharing folded tokens land close together.
#[derive(Debug, Clone)]
pub struct FakeEmbedder { dim: usize, id: String }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("fake:d{dim}") } }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 { return Embedding::new(v); }
        for (i, token) in normalize_question(text).split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            let val = f64::from((h >> 32) as u32) / f64::from(u32::MAX);
            v[idx] += val as f32 + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 { for x in &mut v { *x /= norm; } }
        Embedding::new(v)
    }
}

#[async_trait]
impl EmbedProvider for FakeEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    async fn embed(&self, text: &str) -> Result<Embedding> { Ok(self.embed_sync(text)) }
}
