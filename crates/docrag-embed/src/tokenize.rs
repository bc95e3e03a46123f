use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Token tensors for one padded batch, each `[batch, tokens]`.
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Encodes `texts`, truncating to `max_len` and right-padding with `pad_id`
/// to the longest sequence in the batch.
pub fn encode_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    pad_id: u32,
    device: &Device,
) -> Result<EncodedBatch> {
    let encodings = tokenizer
        .encode_batch(texts.iter().map(String::as_str).collect::<Vec<_>>(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

    let width = encodings
        .iter()
        .map(|e| e.get_ids().len().min(max_len))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut ids = Vec::with_capacity(texts.len() * width);
    let mut mask = Vec::with_capacity(texts.len() * width);
    for enc in &encodings {
        let len = enc.get_ids().len().min(width);
        ids.extend_from_slice(&enc.get_ids()[..len]);
        mask.extend_from_slice(&enc.get_attention_mask()[..len]);
        ids.extend(std::iter::repeat(pad_id).take(width - len));
        mask.extend(std::iter::repeat(0u32).take(width - len));
    }

    let shape = (encodings.len(), width);
    let input_ids = Tensor::from_vec(ids, shape, device)?;
    let attention_mask = Tensor::from_vec(mask, shape, device)?;
    let token_type_ids = input_ids.zeros_like()?;
    Ok(EncodedBatch { input_ids, attention_mask, token_type_ids })
}
