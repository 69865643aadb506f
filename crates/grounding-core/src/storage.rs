//! Corpus store: documents, both indices, and snapshot persistence
//!
//! The store publishes an immutable [`CorpusSnapshot`] behind an `Arc`.
//! `rebuild` builds the complete next snapshot off to the side and swaps the
//! handle in one step, so a reader holding the previous `Arc` keeps a
//! consistent (documents, lexical, semantic) triple for the whole query.
//!
//! Persistence is a single JSON file written through a temporary file in the
//! same directory and renamed into place. Reading a missing, unreadable or
//! inconsistent file is a cold start, never an error for the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::document::Corpus;
use crate::embeddings::LazyEncoder;
use crate::search::{DenseIndex, IndexError, LexicalIndex, TfIdfConfig};

/// Bumped whenever the snapshot layout changes; older files are discarded
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Errors that can occur while reading or writing a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Snapshot format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Snapshot {index} index is inconsistent: {source}")]
    Inconsistent {
        index: &'static str,
        #[source]
        source: IndexError,
    },

    #[error("No snapshot path configured")]
    NoPath,
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A fully built, immutable corpus state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    corpus: Corpus,
    lexical: Option<LexicalIndex>,
    semantic: Option<DenseIndex>,
    /// Kept in the file envelope rather than here
    #[serde(skip)]
    encoder: Option<String>,
}

impl CorpusSnapshot {
    /// The empty corpus the store starts with
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build both indices for `documents`.
    ///
    /// The lexical index is always built for a non-empty corpus. The semantic
    /// index is built only if `encoder` yields an encoder and encoding works.
    pub fn build(documents: Vec<String>, lexical: TfIdfConfig, encoder: &LazyEncoder) -> Self {
        if documents.is_empty() {
            return Self::empty();
        }

        let lexical = LexicalIndex::build(&documents, lexical);
        let semantic = encoder.get().and_then(|encoder| {
            match DenseIndex::build(encoder.as_ref(), &documents) {
                Ok(index) => Some((index, encoder.name().to_string())),
                Err(e) => {
                    warn!(
                        error = %e,
                        encoder = encoder.name(),
                        "Semantic index build failed, continuing lexical-only"
                    );
                    None
                }
            }
        });
        let (semantic, encoder) = semantic.unzip();

        Self {
            corpus: Corpus::new(documents),
            lexical: Some(lexical),
            semantic,
            encoder,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn lexical(&self) -> Option<&LexicalIndex> {
        self.lexical.as_ref()
    }

    pub fn semantic(&self) -> Option<&DenseIndex> {
        self.semantic.as_ref()
    }

    /// Name of the encoder behind the semantic index, if there is one
    pub fn encoder_name(&self) -> Option<&str> {
        self.encoder.as_deref()
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Check that every present index has exactly one row per document
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let documents = self.corpus.len();
        if let Some(lexical) = &self.lexical {
            if lexical.len() != documents {
                return Err(SnapshotError::Inconsistent {
                    index: "lexical",
                    source: IndexError::Misaligned {
                        rows: lexical.len(),
                        documents,
                    },
                });
            }
        } else if documents > 0 {
            return Err(SnapshotError::Inconsistent {
                index: "lexical",
                source: IndexError::Misaligned { rows: 0, documents },
            });
        }
        if let Some(semantic) = &self.semantic {
            if semantic.len() != documents {
                return Err(SnapshotError::Inconsistent {
                    index: "semantic",
                    source: IndexError::Misaligned {
                        rows: semantic.len(),
                        documents,
                    },
                });
            }
            semantic
                .validate()
                .map_err(|source| SnapshotError::Inconsistent {
                    index: "semantic",
                    source,
                })?;
        }
        Ok(())
    }
}

/// On-disk envelope around a snapshot; borrowed when writing, owned when reading
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile<S> {
    format_version: u32,
    /// Name of the encoder that built the semantic index
    encoder: Option<String>,
    built_at: DateTime<Utc>,
    snapshot: S,
}

/// What a rebuild produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildStats {
    pub documents: usize,
    pub vocabulary: usize,
    /// Dimension of the semantic index, if one was built
    pub semantic_dimension: Option<usize>,
    /// Whether the snapshot reached durable storage
    pub persisted: bool,
}

/// Outcome of [`CorpusStore::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// A snapshot was read and published
    Restored { documents: usize },
    /// No snapshot path, or no file at it
    Missing,
    /// A file existed but could not be used; the store was reset to empty
    Discarded,
}

/// Owner of the current corpus snapshot
pub struct CorpusStore {
    current: RwLock<Arc<CorpusSnapshot>>,
    /// Serializes writers so the published and persisted snapshots agree
    writer: Mutex<()>,
    snapshot_path: Option<PathBuf>,
    lexical: TfIdfConfig,
    encoder: Arc<LazyEncoder>,
}

impl CorpusStore {
    /// Create an empty store. Nothing is read from disk.
    pub fn new(config: &EngineConfig, encoder: Arc<LazyEncoder>) -> Self {
        Self {
            current: RwLock::new(Arc::new(CorpusSnapshot::empty())),
            writer: Mutex::new(()),
            snapshot_path: config.snapshot_path.clone(),
            lexical: config.lexical,
            encoder,
        }
    }

    /// Create a store and eagerly load the persisted snapshot, if any
    pub fn open(config: &EngineConfig, encoder: Arc<LazyEncoder>) -> Self {
        let store = Self::new(config, encoder);
        store.load();
        store
    }

    /// The snapshot in effect right now. Hold on to it for a whole query.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Replace the whole corpus with `documents` and persist it.
    ///
    /// The new snapshot is built completely before it is published. Encoder
    /// and disk problems degrade the result (no semantic index, not
    /// persisted) but never fail the rebuild. Concurrent rebuilds run one
    /// at a time, so the file on disk always matches the last publish.
    pub fn rebuild(&self, documents: Vec<String>) -> RebuildStats {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        info!(documents = documents.len(), "Rebuilding corpus indices");

        let next = Arc::new(CorpusSnapshot::build(documents, self.lexical, &self.encoder));
        let mut stats = RebuildStats {
            documents: next.len(),
            vocabulary: next
                .lexical()
                .map(|l| l.vectorizer().vocabulary_size())
                .unwrap_or(0),
            semantic_dimension: next.semantic().map(DenseIndex::dimension),
            persisted: false,
        };

        self.publish(Arc::clone(&next));

        if self.snapshot_path.is_some() {
            match self.write_snapshot(&next) {
                Ok(path) => {
                    info!(path = %path.display(), "Corpus snapshot persisted");
                    stats.persisted = true;
                }
                Err(e) => warn!(error = %e, "Failed to persist corpus snapshot"),
            }
        }

        info!(
            documents = stats.documents,
            vocabulary = stats.vocabulary,
            semantic = stats.semantic_dimension.is_some(),
            "Corpus rebuilt"
        );
        stats
    }

    /// Write the current snapshot to the configured path
    pub fn persist(&self) -> Result<PathBuf, SnapshotError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.snapshot();
        self.write_snapshot(&snapshot)
    }

    /// Read the persisted snapshot and publish it.
    ///
    /// Any problem with the file resets the store to an empty corpus.
    pub fn load(&self) -> LoadStatus {
        let Some(path) = self.snapshot_path.as_deref() else {
            return LoadStatus::Missing;
        };
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if !path.exists() {
            debug!(path = %path.display(), "No corpus snapshot found, starting empty");
            self.publish(Arc::new(CorpusSnapshot::empty()));
            return LoadStatus::Missing;
        }

        match read_snapshot(path) {
            Ok(snapshot) => {
                let documents = snapshot.len();
                info!(
                    path = %path.display(),
                    documents,
                    semantic = snapshot.semantic().is_some(),
                    "Corpus snapshot loaded"
                );
                self.publish(Arc::new(snapshot));
                LoadStatus::Restored { documents }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unusable corpus snapshot");
                self.publish(Arc::new(CorpusSnapshot::empty()));
                LoadStatus::Discarded
            }
        }
    }

    fn publish(&self, next: Arc<CorpusSnapshot>) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
    }

    fn write_snapshot(&self, snapshot: &CorpusSnapshot) -> Result<PathBuf, SnapshotError> {
        let path = self.snapshot_path.as_deref().ok_or(SnapshotError::NoPath)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| SnapshotError::io(&dir, e))?;

        let file = SnapshotFile {
            format_version: SNAPSHOT_FORMAT_VERSION,
            encoder: snapshot.encoder.clone(),
            built_at: Utc::now(),
            snapshot,
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| SnapshotError::io(&dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &file)?;
            writer.flush().map_err(|e| SnapshotError::io(path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| SnapshotError::io(path, e))?;
        tmp.persist(path)
            .map_err(|e| SnapshotError::io(path, e.error))?;

        Ok(path.to_path_buf())
    }
}

fn read_snapshot(path: &Path) -> Result<CorpusSnapshot, SnapshotError> {
    let file = fs::File::open(path).map_err(|e| SnapshotError::io(path, e))?;
    let envelope: SnapshotFile<CorpusSnapshot> = serde_json::from_reader(BufReader::new(file))?;
    if envelope.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: envelope.format_version,
            expected: SNAPSHOT_FORMAT_VERSION,
        });
    }
    let mut snapshot = envelope.snapshot;
    snapshot.validate()?;
    if snapshot.semantic.is_some() {
        snapshot.encoder = envelope.encoder;
    }
    Ok(snapshot)
}
