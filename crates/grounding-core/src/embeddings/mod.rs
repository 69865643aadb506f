//! Text encoders for the semantic index
//!
//! - [`TextEncoder`] is the seam the semantic retriever depends on
//! - [`EmbeddingModel`] runs a sentence-transformer locally with Candle
//! - [`HashingEncoder`] is a deterministic feature-hashing encoder that needs
//!   no model files
//! - [`LazyEncoder`] is the injected handle that loads an encoder at most once
//!   per process and remembers whether that worked

mod bert;

pub use bert::{EmbeddingModel, DEFAULT_MODEL_ID, EMBEDDING_DIM, MAX_SEQ_LEN};

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::config::{EncoderBackend, EncoderConfig};

/// Produces L2-normalised dense vectors of a fixed dimension.
///
/// Implementations must be safe to share across threads once built; the
/// engine only ever calls them through `&self`.
pub trait TextEncoder: Send + Sync {
    /// Encode one text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Encode many texts, preserving order
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Dimension of every vector this encoder returns
    fn dimension(&self) -> usize;

    /// Human-readable model name, persisted alongside the semantic index
    fn name(&self) -> &str;
}

/// Shared, already-built encoder
pub type SharedEncoder = Arc<dyn TextEncoder>;

type Loader = Box<dyn Fn() -> Result<SharedEncoder> + Send + Sync>;

/// Lazily-initialised encoder handle.
///
/// The loader runs on first use only; its outcome (an encoder or a failure)
/// is cached for the lifetime of the handle. After initialisation the handle
/// is read-only, so concurrent readers are safe.
pub struct LazyEncoder {
    loader: Loader,
    cell: OnceLock<Option<SharedEncoder>>,
}

impl LazyEncoder {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<SharedEncoder> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            cell: OnceLock::new(),
        }
    }

    /// Handle around an encoder that is already loaded
    pub fn ready(encoder: SharedEncoder) -> Self {
        let handle = Self::new(|| Err(anyhow::anyhow!("encoder was provided pre-built")));
        // A fresh OnceLock always accepts the first value
        let _ = handle.cell.set(Some(encoder));
        handle
    }

    /// Handle that never yields an encoder (lexical-only operation)
    pub fn unavailable() -> Self {
        let handle = Self::new(|| Err(anyhow::anyhow!("semantic encoder disabled")));
        let _ = handle.cell.set(None);
        handle
    }

    /// Build the handle described by `config`. Nothing is loaded yet.
    pub fn from_config(config: &EncoderConfig) -> Self {
        match &config.backend {
            EncoderBackend::Disabled => Self::unavailable(),
            EncoderBackend::Hashing { dimension } => {
                Self::ready(Arc::new(HashingEncoder::new(*dimension)))
            }
            EncoderBackend::Candle { model_dir, model_id } => {
                let model_dir = model_dir.clone();
                let model_id = model_id.clone();
                Self::new(move || {
                    let model = match &model_dir {
                        Some(dir) => EmbeddingModel::load(dir)?,
                        None => EmbeddingModel::from_hub(&model_id)?,
                    };
                    Ok(Arc::new(model) as SharedEncoder)
                })
            }
        }
    }

    /// The encoder, loading it on first call. `None` if loading failed.
    pub fn get(&self) -> Option<SharedEncoder> {
        self.cell
            .get_or_init(|| match (self.loader)() {
                Ok(encoder) => {
                    info!(
                        encoder = encoder.name(),
                        dimension = encoder.dimension(),
                        "Semantic encoder initialised"
                    );
                    Some(encoder)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Semantic encoder unavailable, falling back to lexical search"
                    );
                    None
                }
            })
            .clone()
    }

    /// Whether initialisation has been attempted
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for LazyEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.cell.get() {
            None => "uninitialized",
            Some(None) => "unavailable",
            Some(Some(_)) => "ready",
        };
        f.debug_struct("LazyEncoder").field("state", &state).finish()
    }
}

/// Feature-hashing encoder.
///
/// Hashes lowercase alphanumeric terms (FNV-1a) into fixed buckets, weights
/// them by relative frequency and normalises. Always available and fully
/// deterministic, but only captures word overlap.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }
}

impl TextEncoder for HashingEncoder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let terms: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(|s| s.to_lowercase())
            .collect();

        let mut vector = vec![0.0f32; self.dimension];
        if terms.is_empty() {
            return Ok(vector);
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for term in &terms {
            *tf.entry(term.as_str()).or_default() += 1.0;
        }
        let total = terms.len() as f32;
        for (term, count) in tf {
            vector[Self::bucket(term, self.dimension)] += count / total;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lazy_encoder_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = LazyEncoder::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(HashingEncoder::new(16)) as SharedEncoder)
        });

        assert!(!lazy.is_initialized());
        assert!(lazy.get().is_some());
        assert!(lazy.get().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(lazy.is_initialized());
    }

    #[test]
    fn test_lazy_encoder_caches_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = LazyEncoder::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("no weights"))
        });

        assert!(lazy.get().is_none());
        assert!(lazy.get().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_and_unavailable_handles() {
        assert!(LazyEncoder::ready(Arc::new(HashingEncoder::new(8))).get().is_some());
        assert!(LazyEncoder::unavailable().get().is_none());
    }

    #[test]
    fn test_lazy_encoder_shared_across_threads() {
        let lazy = Arc::new(LazyEncoder::ready(Arc::new(HashingEncoder::new(32))));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                std::thread::spawn(move || lazy.get().map(|e| e.dimension()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(32));
        }
    }

    #[test]
    fn test_hashing_encoder_is_normalized_and_deterministic() {
        let encoder = HashingEncoder::new(64);
        let a = encoder.embed("Bonds pay interest").unwrap();
        let b = encoder.embed("bonds PAY interest").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_encoder_empty_text_is_zero() {
        let encoder = HashingEncoder::new(8);
        assert!(encoder.embed("").unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_embed_batch_preserves_order() {
        let encoder = HashingEncoder::new(32);
        let batch = encoder.embed_batch(&["stock", "bond"]).unwrap();
        assert_eq!(batch[0], encoder.embed("stock").unwrap());
        assert_eq!(batch[1], encoder.embed("bond").unwrap());
    }

    #[test]
    fn test_from_config_disabled() {
        let config = EncoderConfig {
            backend: EncoderBackend::Disabled,
        };
        assert!(LazyEncoder::from_config(&config).get().is_none());
    }
}
