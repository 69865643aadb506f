//! Sentence encoder using Hugging Face Candle
//!
//! Runs a BERT-family sentence-transformer (all-MiniLM-L6-v2 by default)
//! locally: tokenize, encode, mean-pool over the attention mask, L2-normalise.

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{
    embedding, layer_norm, linear, Activation, Embedding, LayerNorm, Linear, VarBuilder,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::info;

use super::TextEncoder;

/// Default sentence-transformer on the Hugging Face Hub
pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Embedding dimension of the default model
pub const EMBEDDING_DIM: usize = 384;

/// Maximum number of tokens fed to the model per text
pub const MAX_SEQ_LEN: usize = 256;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Model configuration loaded from config.json
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub hidden_act: String,
    pub max_position_embeddings: usize,
    pub type_vocab_size: usize,
    pub layer_norm_eps: f64,
    #[serde(default)]
    pub pad_token_id: usize,
}

impl Default for Config {
    fn default() -> Self {
        // all-MiniLM-L6-v2
        Self {
            vocab_size: 30522,
            hidden_size: EMBEDDING_DIM,
            num_hidden_layers: 6,
            num_attention_heads: 12,
            intermediate_size: 1536,
            hidden_act: "gelu".to_string(),
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
            pad_token_id: 0,
        }
    }
}

struct BertEmbeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    token_type_embeddings: Embedding,
    layer_norm: LayerNorm,
}

impl BertEmbeddings {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            word_embeddings: embedding(
                config.vocab_size,
                config.hidden_size,
                vb.pp("word_embeddings"),
            )?,
            position_embeddings: embedding(
                config.max_position_embeddings,
                config.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            token_type_embeddings: embedding(
                config.type_vocab_size,
                config.hidden_size,
                vb.pp("token_type_embeddings"),
            )?,
            layer_norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        position_ids: &Tensor,
    ) -> Result<Tensor> {
        let words = self.word_embeddings.forward(input_ids)?;
        let positions = self.position_embeddings.forward(position_ids)?;
        let token_types = self.token_type_embeddings.forward(token_type_ids)?;
        let summed = ((words + positions)? + token_types)?;
        Ok(self.layer_norm.forward(&summed)?)
    }
}

struct BertSelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    num_heads: usize,
    head_size: usize,
}

impl BertSelfAttention {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let head_size = config.hidden_size / config.num_attention_heads;
        let all_head_size = config.num_attention_heads * head_size;

        Ok(Self {
            query: linear(config.hidden_size, all_head_size, vb.pp("query"))?,
            key: linear(config.hidden_size, all_head_size, vb.pp("key"))?,
            value: linear(config.hidden_size, all_head_size, vb.pp("value"))?,
            num_heads: config.num_attention_heads,
            head_size,
        })
    }

    /// `[batch, seq, hidden]` -> `[batch, heads, seq, head_size]`
    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, seq, _) = x.dims3()?;
        Ok(x
            .reshape((batch, seq, self.num_heads, self.head_size))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let query = self.split_heads(&self.query.forward(hidden_states)?)?;
        let key = self.split_heads(&self.key.forward(hidden_states)?)?;
        let value = self.split_heads(&self.value.forward(hidden_states)?)?;

        let scores = query.matmul(&key.t()?.contiguous()?)?;
        let scores = (scores / (self.head_size as f64).sqrt())?;
        let scores = scores.broadcast_add(attention_mask)?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;

        let context = probs.matmul(&value)?.transpose(1, 2)?.contiguous()?;
        let (batch, seq, _, _) = context.dims4()?;
        Ok(context.reshape((batch, seq, self.num_heads * self.head_size))?)
    }
}

/// Dense projection + residual + LayerNorm, shared by attention and FFN outputs
struct BertResidualOutput {
    dense: Linear,
    layer_norm: LayerNorm,
}

impl BertResidualOutput {
    fn load(vb: VarBuilder, in_dim: usize, config: &Config) -> Result<Self> {
        Ok(Self {
            dense: linear(in_dim, config.hidden_size, vb.pp("dense"))?,
            layer_norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, residual: &Tensor) -> Result<Tensor> {
        let projected = self.dense.forward(hidden_states)?;
        Ok(self.layer_norm.forward(&(projected + residual)?)?)
    }
}

struct BertLayer {
    attention: BertSelfAttention,
    attention_output: BertResidualOutput,
    intermediate: Linear,
    activation: Activation,
    output: BertResidualOutput,
}

impl BertLayer {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let activation = match config.hidden_act.as_str() {
            "relu" => Activation::Relu,
            _ => Activation::Gelu,
        };

        Ok(Self {
            attention: BertSelfAttention::load(vb.pp("attention").pp("self"), config)?,
            attention_output: BertResidualOutput::load(
                vb.pp("attention").pp("output"),
                config.hidden_size,
                config,
            )?,
            intermediate: linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            activation,
            output: BertResidualOutput::load(vb.pp("output"), config.intermediate_size, config)?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let attended = self.attention.forward(hidden_states, attention_mask)?;
        let attended = self.attention_output.forward(&attended, hidden_states)?;
        let expanded = self.activation.forward(&self.intermediate.forward(&attended)?)?;
        self.output.forward(&expanded, &attended)
    }
}

struct BertModel {
    embeddings: BertEmbeddings,
    layers: Vec<BertLayer>,
}

impl BertModel {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let embeddings = BertEmbeddings::load(vb.pp("embeddings"), config)?;
        let layers = (0..config.num_hidden_layers)
            .map(|i| BertLayer::load(vb.pp("encoder").pp("layer").pp(i), config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { embeddings, layers })
    }

    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        position_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor> {
        let mut hidden = self.embeddings.forward(input_ids, token_type_ids, position_ids)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, attention_mask)?;
        }
        Ok(hidden)
    }
}

/// Sentence embedding model backed by Candle
pub struct EmbeddingModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    max_seq_len: usize,
    name: String,
}

impl EmbeddingModel {
    /// Load a sentence-transformer from a local directory
    ///
    /// # Arguments
    /// * `model_path` - Directory containing:
    ///   - `config.json` - The model configuration
    ///   - `tokenizer.json` - The tokenizer configuration
    ///   - `model.safetensors` - The model weights
    pub fn load(model_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        info!(path = %model_path.display(), "Loading embedding model on device: {:?}", device);

        let config_path = require_file(model_path, CONFIG_FILE)?;
        let config_str = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| anyhow!("Failed to parse config.json: {}", e))?;

        info!(
            layers = config.num_hidden_layers,
            hidden = config.hidden_size,
            heads = config.num_attention_heads,
            "Loaded encoder config"
        );

        let tokenizer_path = require_file(model_path, TOKENIZER_FILE)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let weights_path = require_file(model_path, WEIGHTS_FILE)?;
        // SAFETY: the weights file is opened read-only and not modified while mapped.
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };

        // Exported checkpoints differ on whether tensors carry a "bert." prefix
        let vb = if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
            vb.pp("bert")
        } else {
            vb
        };
        let model = BertModel::load(vb, &config)?;

        let name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local-encoder".to_string());
        info!(model = %name, dimension = config.hidden_size, "Embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension: config.hidden_size,
            max_seq_len: MAX_SEQ_LEN.min(config.max_position_embeddings),
            name,
        })
    }

    /// Fetch `model_id` from the Hugging Face Hub (or its local cache) and
    /// return the directory holding the model files
    pub fn download(model_id: &str) -> Result<PathBuf> {
        use hf_hub::api::sync::Api;

        info!(model = model_id, "Fetching embedding model from Hugging Face Hub");

        let api = Api::new()?;
        let repo = api.model(model_id.to_string());
        let config = repo.get(CONFIG_FILE)?;
        repo.get(TOKENIZER_FILE)?;
        repo.get(WEIGHTS_FILE)?;

        config
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("Hub cache path has no parent: {}", config.display()))
    }

    /// Download (if needed) and load `model_id`
    pub fn from_hub(model_id: &str) -> Result<Self> {
        let dir = Self::download(model_id)?;
        let mut model = Self::load(&dir)?;
        model.name = model_id.to_string();
        Ok(model)
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let seq_len = encoding.get_ids().len().min(self.max_seq_len);
        let ids = &encoding.get_ids()[..seq_len];
        let mask = &encoding.get_attention_mask()[..seq_len];

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let mask = Tensor::new(mask, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::zeros((1, seq_len), DType::U32, &self.device)?;
        let position_ids = Tensor::arange(0u32, seq_len as u32, &self.device)?.unsqueeze(0)?;

        let additive_mask = self.additive_mask(&mask)?;
        let output = self
            .model
            .forward(&input_ids, &token_type_ids, &position_ids, &additive_mask)?;

        let pooled = mean_pool(&output, &mask)?;
        let normalized = l2_normalize(&pooled)?;
        Ok(normalized.squeeze(0)?.to_vec1::<f32>()?)
    }

    /// `[1, seq]` 0/1 mask -> `[1, 1, 1, seq]` with -10000 on padding
    fn additive_mask(&self, mask: &Tensor) -> Result<Tensor> {
        let mask = mask.to_dtype(DType::F32)?.unsqueeze(1)?.unsqueeze(1)?;
        Ok(((mask.affine(-1.0, 1.0))? * -10000.0)?)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl TextEncoder for EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn require_file(dir: &Path, file: &str) -> Result<PathBuf> {
    let path = dir.join(file);
    if !path.exists() {
        return Err(anyhow!("{} not found at {}", file, path.display()));
    }
    Ok(path)
}

/// Mean over the sequence axis, ignoring padded positions
fn mean_pool(output: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = output.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    Ok(summed.broadcast_div(&counts)?)
}

fn l2_normalize(tensor: &Tensor) -> Result<Tensor> {
    let norm = (tensor.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-12)?;
    Ok(tensor.broadcast_div(&norm)?)
}
