//! Embedding backends.
//!
//! `LocalModel` runs BGE-M3 (XLM-RoBERTa) through candle from a local model
//! directory. `HashedEmbedder` is a deterministic stand-in for tests and
//! development, enabled with `APP_USE_FAKE_EMBEDDINGS=1`. Both are pure:
//! identical input text always yields identical vectors, which is what
//! makes the content-hash cache sound.
//!
//! An unreachable or unloadable model surfaces as
//! `membank_core::error::Error::ModelUnavailable`; there is no silent
//! fallback to zero or random vectors.

mod device;
mod pool;
mod tokenize;

use std::path::{Path, PathBuf};

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use membank_core::error::Error;
use membank_core::traits::Embedder;

pub const EMBED_DIM: usize = 1024;
const MAX_LEN: usize = 256;

pub struct LocalModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
}

impl LocalModel {
    /// Load tokenizer, config and weights from the resolved model directory.
    pub fn load() -> Result<Self> {
        let model_dir = resolve_model_dir()?;
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3 model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::ModelUnavailable(format!("tokenizer {}: {}", tokenizer_path.display(), e))
        })?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path).map_err(|e| {
            Error::ModelUnavailable(format!("config {}: {}", config_path.display(), e))
        })?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_text).map_err(|e| {
            Error::ModelUnavailable(format!("config {}: {}", config_path.display(), e))
        })?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path).map_err(|e| {
            Error::ModelUnavailable(format!("weights {}: {}", weights_path.display(), e))
        })?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)
            .map_err(|e| Error::ModelUnavailable(format!("model init: {}", e)))?;

        info!("BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device, id: format!("local:bge-m3:d{}", EMBED_DIM) })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let (input_ids, attention_mask) =
            tokenize::tokenize_on_device(&self.tokenizer, text, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device)?;
        let hidden =
            self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = pool::masked_mean_l2(&hidden, &attention_mask)?;
        let vector: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        anyhow::ensure!(vector.len() == EMBED_DIM, "unexpected embedding dim {}", vector.len());
        Ok(vector)
    }
}

impl Embedder for LocalModel {
    fn embedder_id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        EMBED_DIM
    }
    fn max_len(&self) -> usize {
        MAX_LEN
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text)?);
        }
        Ok(out)
    }
}

/// Deterministic token-hash embedder. Vectors are L2-normalized and stable
/// across processes, so cache and round-trip tests behave exactly like the
/// real model without loading it.
pub struct HashedEmbedder {
    dim: usize,
    id: String,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("fake:xxhash:d{}", dim) }
    }
}

impl Embedder for HashedEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        MAX_LEN
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let mut v = vec![0f32; self.dim];
            for (i, token) in text.split_whitespace().enumerate() {
                let mut hasher = XxHash64::with_seed(0);
                token.hash(&mut hasher);
                let h = hasher.finish();
                let idx = (h as usize) % self.dim;
                let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
                v[idx] += val + (i as f32 % 3.0) * 0.01;
            }
            let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
            for x in &mut v {
                *x /= norm;
            }
            out.push(v);
        }
        Ok(out)
    }
}

/// Backend selection: `APP_USE_FAKE_EMBEDDINGS=1` forces the hashed
/// embedder; otherwise the local model is loaded.
pub fn default_embedder() -> Result<Box<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        debug!("using deterministic hashed embedder");
        return Ok(Box::new(HashedEmbedder::new(EMBED_DIM)));
    }
    Ok(Box::new(LocalModel::load()?))
}

fn resolve_model_dir() -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                return Ok(p);
            }
        }
    }
    for fallback in ["./models/bge-m3", "../models/bge-m3"] {
        let p = Path::new(fallback);
        if p.exists() {
            return Ok(p.to_path_buf());
        }
    }
    Err(Error::ModelUnavailable(
        "could not locate BGE-M3 model directory (set APP_MODEL_DIR)".to_string(),
    )
    .into())
}
