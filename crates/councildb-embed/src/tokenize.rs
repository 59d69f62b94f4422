use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Encode a batch into `[B, T]` id and mask tensors, where `T` is the longest
/// encoding capped at `max_len`. Shorter rows are padded with `pad_id`.
pub fn encode_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, pad_id: u32, device: &Device) -> Result<(Tensor, Tensor)> {
    let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let encodings = tokenizer.encode_batch(inputs, true).map_err(|e| anyhow!("tokenization failed: {e}"))?;
    let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0).clamp(1, max_len.max(1));

    let mut ids = Vec::with_capacity(texts.len() * seq_len);
    let mut mask = Vec::with_capacity(texts.len() * seq_len);
    for enc in &encodings {
        let row_ids = enc.get_ids();
        let row_mask = enc.get_attention_mask();
        let n = row_ids.len().min(seq_len);
        ids.extend_from_slice(&row_ids[..n]);
        mask.extend_from_slice(&row_mask[..n]);
        ids.extend(std::iter::repeat(pad_id).take(seq_len - n));
        mask.extend(std::iter::repeat(0).take(seq_len - n));
    }
    let input_ids = Tensor::from_vec(ids, (encodings.len(), seq_len), device)?;
    let attention_mask = Tensor::from_vec(mask, (encodings.len(), seq_len), device)?;
    Ok((input_ids, attention_mask))
}
