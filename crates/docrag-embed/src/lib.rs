//! Sentence embeddings for chunk and query text.
//!
//! [`BertEmbedder`] runs a local BERT-family sentence-transformer (default
//! `all-MiniLM-L6-v2`, 384 dims) through candle with masked mean pooling and
//! L2 normalization, so inner product equals cosine similarity.
//! [`FakeEmbedder`] is a deterministic stand-in for tests and offline work
//! (`APP_USE_FAKE_EMBEDDINGS=1`). [`EmbedderHandle`] owns the expensive model
//! and loads it on first use only.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use docrag_core::config::EmbeddingConfig;
use docrag_core::error::Error;
pub use docrag_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::{encode_batch, EncodedBatch};

pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";
pub const FAKE_DIM: usize = 384;

/// Texts per forward pass; bounds activation memory on long batches.
const FORWARD_BATCH: usize = 32;

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    pad_id: u32,
}

impl BertEmbedder {
    /// Loads `config.json`, `tokenizer.json` and weights
    /// (`model.safetensors` or `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let started = Instant::now();
        let device = device::select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        tokenizer
            .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw_config)?;
        let dim = hidden_size(&raw_config).with_context(|| format!("reading {}", config_path.display()))?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DTYPE, &device);
        let model = BertModel::load(vb, &config)?;
        info!(dim, elapsed_ms = elapsed_ms(started), "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, pad_id })
    }

    fn embed_window(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch = tokenize::encode_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?)
    }
}

/// `hidden_size` of a model `config.json`: the embedding width.
fn hidden_size(raw_config: &str) -> Result<usize> {
    let hidden_size = serde_json::from_str::<serde_json::Value>(raw_config)?
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| anyhow!("no hidden_size"))?;
    Ok(usize::try_from(hidden_size)?)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let tensors = candle_core::pickle::read_all(&pickle)?;
        return Ok(tensors.into_iter().collect());
    }
    Err(Error::NotFound(format!("no model weights in {}", model_dir.display())).into())
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let started = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for window in texts.chunks(FORWARD_BATCH) {
            out.extend(self.embed_window(window)?);
        }
        debug!(texts = texts.len(), elapsed_ms = elapsed_ms(started), "embedded batch");
        Ok(out)
    }
}

/// Hash-bucket bag of words, L2-normalized. Texts sharing words score higher.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token: String = token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

type Loader = dyn Fn() -> Result<Arc<dyn Embedder>> + Send + Sync;

/// Shared, lazily constructed embedder.
///
/// Clones share one slot: the loader runs at most once, on the first
/// [`EmbedderHandle::get`], and every later call reuses the same instance.
#[derive(Clone)]
pub struct EmbedderHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    loader: Option<Box<Loader>>,
    slot: Mutex<Option<Arc<dyn Embedder>>>,
}

impl EmbedderHandle {
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Embedder>> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(HandleInner { loader: Some(Box::new(loader)), slot: Mutex::new(None) }) }
    }

    /// A handle around an already constructed embedder.
    pub fn ready(embedder: Arc<dyn Embedder>) -> Self {
        Self { inner: Arc::new(HandleInner { loader: None, slot: Mutex::new(Some(embedder)) }) }
    }

    pub fn get(&self) -> Result<Arc<dyn Embedder>> {
        let mut slot = self.inner.slot.lock().map_err(|_| anyhow!("embedder lock poisoned"))?;
        if let Some(embedder) = slot.as_ref() {
            return Ok(Arc::clone(embedder));
        }
        let loader = self.inner.loader.as_ref().ok_or_else(|| anyhow!("embedder handle has no loader"))?;
        let embedder = loader()?;
        *slot = Some(Arc::clone(&embedder));
        Ok(embedder)
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Embeds one batch, checking that the embedder returned one vector per text.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.get()?.embed_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(anyhow!("embedder returned {} vectors for {} texts", vectors.len(), texts.len()));
        }
        Ok(vectors)
    }

    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))
    }
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Lazy handle for the configured model, or the fake embedder when
/// `APP_USE_FAKE_EMBEDDINGS` is set. Nothing is loaded until first use.
pub fn default_handle(config: &EmbeddingConfig) -> EmbedderHandle {
    let config = config.clone();
    EmbedderHandle::lazy(move || {
        if use_fake_embeddings() {
            info!("using FakeEmbedder");
            return Ok(Arc::new(FakeEmbedder::new(FAKE_DIM)) as Arc<dyn Embedder>);
        }
        let dir = resolve_model_dir(config.model_dir.as_deref())?;
        Ok(Arc::new(BertEmbedder::load(&dir, config.max_len)?) as Arc<dyn Embedder>)
    })
}

/// First existing directory among `APP_MODEL_DIR`, `MODEL_DIR`, the configured
/// path and the conventional `models/<name>` locations.
pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = ["APP_MODEL_DIR", "MODEL_DIR"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(PathBuf::from)
        .chain(configured.map(docrag_core::config::expand_path))
        .chain([
            PathBuf::from("models").join(DEFAULT_MODEL_NAME),
            PathBuf::from("../models").join(DEFAULT_MODEL_NAME),
        ]);
    for candidate in candidates {
        if candidate.is_dir() {
            debug!(model_dir = %candidate.display(), "resolved model directory");
            return Ok(candidate);
        }
    }
    Err(Error::NotFound(format!(
        "embedding model directory for {DEFAULT_MODEL_NAME} (set APP_MODEL_DIR)"
    ))
    .into())
}
