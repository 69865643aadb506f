//! Configuration management for the grounding engine
//!
//! Covers where the snapshot lives, which encoder backs the semantic index,
//! how the lexical vectorizer is fitted and how hybrid candidates are fused.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::embeddings::{DEFAULT_MODEL_ID, EMBEDDING_DIM};
use crate::search::{FusionStrategy, TfIdfConfig};

/// Default location of the persisted corpus snapshot
pub const DEFAULT_SNAPSHOT_PATH: &str = "data/corpus_snapshot.json";

/// Default number of results per query
pub const DEFAULT_K: usize = 3;

/// Which encoder backs the semantic index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderBackend {
    /// No semantic index; every query is lexical
    Disabled,
    /// Feature-hashing encoder (offline, deterministic)
    Hashing { dimension: usize },
    /// Candle sentence-transformer from a local directory or the Hub
    Candle {
        model_dir: Option<PathBuf>,
        model_id: String,
    },
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub backend: EncoderBackend,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            backend: EncoderBackend::Candle {
                model_dir: None,
                model_id: DEFAULT_MODEL_ID.to_string(),
            },
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Snapshot file; `None` keeps the corpus in memory only
    pub snapshot_path: Option<PathBuf>,
    pub encoder: EncoderConfig,
    pub lexical: TfIdfConfig,
    pub fusion: FusionStrategy,
    pub default_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            encoder: EncoderConfig::default(),
            lexical: TfIdfConfig::default(),
            fusion: FusionStrategy::default(),
            default_k: DEFAULT_K,
        }
    }
}

impl EngineConfig {
    /// In-memory engine with no encoder, mostly useful for tests and tools
    pub fn in_memory() -> Self {
        Self {
            snapshot_path: None,
            encoder: EncoderConfig {
                backend: EncoderBackend::Disabled,
            },
            ..Self::default()
        }
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_encoder(mut self, backend: EncoderBackend) -> Self {
        self.encoder = EncoderConfig { backend };
        self
    }

    pub fn with_lexical(mut self, lexical: TfIdfConfig) -> Self {
        self.lexical = lexical;
        self
    }

    pub fn with_fusion(mut self, fusion: FusionStrategy) -> Self {
        self.fusion = fusion;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Expected variables (all optional):
    /// - GROUNDING_SNAPSHOT_PATH: snapshot file, or "none" for in-memory
    /// - GROUNDING_ENCODER: "candle" (default), "hashing" or "off"
    /// - GROUNDING_MODEL_DIR: local model directory for the candle encoder
    /// - GROUNDING_MODEL_ID: Hugging Face model id for the candle encoder
    /// - GROUNDING_EMBEDDING_DIM: dimension of the hashing encoder
    /// - GROUNDING_MAX_FEATURES: vocabulary cap, 0 for unbounded
    /// - GROUNDING_STOP_WORDS: "true"/"false"
    /// - GROUNDING_FUSION: "blend" (default) or "rrf"
    /// - GROUNDING_DEFAULT_K: results per query
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let snapshot_path = match lookup("GROUNDING_SNAPSHOT_PATH") {
            Some(p) if p.eq_ignore_ascii_case("none") => None,
            Some(p) => Some(PathBuf::from(p)),
            None => defaults.snapshot_path,
        };

        let backend_str = lookup("GROUNDING_ENCODER").unwrap_or_else(|| "candle".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "candle" => EncoderBackend::Candle {
                model_dir: lookup("GROUNDING_MODEL_DIR").map(PathBuf::from),
                model_id: lookup("GROUNDING_MODEL_ID")
                    .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            },
            "hashing" => EncoderBackend::Hashing {
                dimension: parse_var(&lookup, "GROUNDING_EMBEDDING_DIM")?.unwrap_or(EMBEDDING_DIM),
            },
            "off" | "none" | "disabled" => EncoderBackend::Disabled,
            _ => return Err(anyhow!("Unknown encoder backend: {}", backend_str)),
        };

        let max_features = match parse_var::<usize, _>(&lookup, "GROUNDING_MAX_FEATURES")? {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.lexical.max_features,
        };
        let stop_words =
            parse_var(&lookup, "GROUNDING_STOP_WORDS")?.unwrap_or(defaults.lexical.stop_words);

        let fusion = match lookup("GROUNDING_FUSION") {
            Some(s) => s.parse::<FusionStrategy>().map_err(|e| anyhow!(e))?,
            None => defaults.fusion,
        };

        let default_k = parse_var(&lookup, "GROUNDING_DEFAULT_K")?.unwrap_or(defaults.default_k);

        Ok(Self {
            snapshot_path,
            encoder: EncoderConfig { backend },
            lexical: TfIdfConfig {
                max_features,
                stop_words,
            },
            fusion,
            default_k,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Invalid {}={}: {}", key, raw, e))
        })
        .transpose()
}
