//! MiniLM embedding engine - sentence embeddings via Candle
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::embedding::Embedder;

const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
const NAME: &str = "all-MiniLM-L6-v2";
const EMBEDDING_DIM: usize = 384;

/// Sentence embedder backed by all-MiniLM-L6-v2
pub struct MiniLmEmbedder {
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
}

impl MiniLmEmbedder {
    /// Create new embedding engine (downloads model on first use)
    pub fn new() -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(MODEL_ID.to_string(), RepoType::Model));

        let config_path = repo.get("config.json")
            .context("Failed to download model config")?;
        let tokenizer_path = repo.get("tokenizer.json")
            .context("Failed to download tokenizer")?;
        let weights_path = repo.get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents = std::fs::read_to_string(config_path)
            .context("Failed to read config file")?;
        let config: Config = serde_json::from_str(&config_contents)
            .context("Failed to parse model config")?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        // Safety: the safetensors file is owned by the hf-hub cache and not
        // modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };

        let model = BertModel::load(vb, &config)
            .context("Failed to create BERT model")?;

        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            device,
        })
    }

    /// Generate normalised embeddings for multiple texts
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self.tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = texts.len();

        let mut flat_ids = Vec::with_capacity(batch_size * max_len);
        let mut flat_mask = Vec::with_capacity(batch_size * max_len);
        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            flat_ids.extend_from_slice(ids);
            flat_ids.extend(std::iter::repeat(0u32).take(max_len - ids.len()));
            flat_mask.extend_from_slice(mask);
            flat_mask.extend(std::iter::repeat(0u32).take(max_len - mask.len()));
        }

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = token_ids.zeros_like()?;

        let embeddings = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = Self::mean_pool(&embeddings, &attention_mask)?;
        let normalized = pooled.broadcast_div(&pooled.sqr()?.sum_keepdim(1)?.sqrt()?)?;

        Ok(normalized.to_vec2::<f32>()?)
    }

    /// Mean pooling with attention mask
    fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask_expanded = attention_mask
            .unsqueeze(2)?
            .expand(embeddings.shape())?
            .to_dtype(embeddings.dtype())?;

        let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
        let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

        Ok(sum_embeddings.broadcast_div(&sum_mask)?)
    }
}

impl Embedder for MiniLmEmbedder {
    fn name(&self) -> &str {
        NAME
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed(&self, text: &str) -> crate::errors::Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding batch returned no vector").into())
    }
}
