//! Lexical search over TF-IDF weighted sparse vectors
//!
//! The vectorizer is fitted from scratch on every rebuild. Text goes through
//! a tantivy analysis pipeline (simple tokenizer, long-token removal,
//! lowercasing, English stop words) before term weighting:
//!
//! ```text
//! idf(t)   = ln((1 + n) / (1 + df(t))) + 1
//! w(t, d)  = count(t, d) * idf(t)          then L2-normalised per row
//! ```
//!
//! Query vectors are projected through the same fitted vocabulary and compared
//! against every row with cosine similarity.

use crate::document::DocId;
use crate::search::{top_k, RetrievalResult, RetrievalSource, Retriever};
use crate::storage::CorpusStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tantivy::tokenizer::{
    LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream,
};

/// Default vocabulary cap
pub const DEFAULT_MAX_FEATURES: usize = 1024;

/// Tokens shorter than this (in chars) never enter the vocabulary
const MIN_TOKEN_CHARS: usize = 2;

/// Tokens longer than this (in bytes) are dropped by the analyzer
const MAX_TOKEN_BYTES: usize = 40;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// TF-IDF vectorizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfIdfConfig {
    /// Keep only the most frequent terms; `None` keeps every term
    pub max_features: Option<usize>,
    /// Drop English stop words during analysis
    pub stop_words: bool,
}

impl Default for TfIdfConfig {
    fn default() -> Self {
        Self {
            max_features: Some(DEFAULT_MAX_FEATURES),
            stop_words: true,
        }
    }
}

/// Tantivy text analyzer used for both documents and queries
#[derive(Clone)]
pub struct Analyzer {
    inner: TextAnalyzer,
    stop_words: bool,
}

impl Analyzer {
    pub fn new(stop_words: bool) -> Self {
        let words: Vec<String> = if stop_words {
            ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect()
        } else {
            Vec::new()
        };

        let inner = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(words))
            .build();

        Self { inner, stop_words }
    }

    /// Analyze `text` into the terms the vectorizer weighs
    pub fn tokens(&self, text: &str) -> Vec<String> {
        // token_stream needs a mutable analyzer; clones share no state
        let mut analyzer = self.inner.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            let token = &stream.token().text;
            if token.chars().count() >= MIN_TOKEN_CHARS {
                tokens.push(token.clone());
            }
        }
        tokens
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("stop_words", &self.stop_words)
            .finish()
    }
}

/// Sparse vector as `(column, weight)` pairs sorted by column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Build from column-sorted entries and scale to unit length
    fn normalized(mut entries: Vec<(u32, f32)>) -> Self {
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in entries.iter_mut() {
                *w /= norm;
            }
        }
        Self { entries }
    }

    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(|(_, w)| *w == 0.0)
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (ci, wi) = self.entries[i];
            let (cj, wj) = other.entries[j];
            match ci.cmp(&cj) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wi * wj;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Cosine similarity; 0 when either side is the zero vector
    pub fn cosine(&self, other: &SparseVector) -> f32 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot(other) / denom
    }
}

/// Fitted term-weighting model: vocabulary plus smoothed IDF weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    config: TfIdfConfig,
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
    #[serde(skip)]
    analyzer: OnceLock<Analyzer>,
}

impl TfIdfVectorizer {
    /// Fit on `documents` and return the model with one row per document
    pub fn fit_transform(config: TfIdfConfig, documents: &[String]) -> (Self, Vec<SparseVector>) {
        let analyzer = Analyzer::new(config.stop_words);
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| analyzer.tokens(d)).collect();

        let mut term_counts: HashMap<&str, u64> = HashMap::new();
        let mut doc_freq: HashMap<&str, u32> = HashMap::new();
        for tokens in &tokenized {
            let mut seen = HashSet::new();
            for token in tokens {
                *term_counts.entry(token.as_str()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut terms: Vec<(&str, u64)> = term_counts.into_iter().collect();
        if let Some(max) = config.max_features {
            if terms.len() > max {
                terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                terms.truncate(max);
            }
        }
        let mut selected: Vec<&str> = terms.into_iter().map(|(term, _)| term).collect();
        selected.sort_unstable();

        let n = documents.len() as f32;
        let idf = selected
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let vocabulary = selected
            .iter()
            .enumerate()
            .map(|(col, term)| (term.to_string(), col as u32))
            .collect();

        let vectorizer = Self {
            config,
            vocabulary,
            idf,
            analyzer: OnceLock::from(analyzer),
        };
        let rows = tokenized.iter().map(|t| vectorizer.vectorize(t)).collect();
        (vectorizer, rows)
    }

    /// Project `text` into the fitted vector space
    pub fn transform(&self, text: &str) -> SparseVector {
        let tokens = self.analyzer().tokens(text);
        self.vectorize(&tokens)
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// IDF weight of `term`, if it is in the vocabulary
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.vocabulary
            .get(term)
            .and_then(|&col| self.idf.get(col as usize).copied())
    }

    pub fn config(&self) -> TfIdfConfig {
        self.config
    }

    fn analyzer(&self) -> &Analyzer {
        self.analyzer
            .get_or_init(|| Analyzer::new(self.config.stop_words))
    }

    fn vectorize(&self, tokens: &[String]) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(&col) = self.vocabulary.get(token) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }
        let entries = counts
            .into_iter()
            .filter_map(|(col, tf)| self.idf.get(col as usize).map(|idf| (col, tf * idf)))
            .collect();
        SparseVector::normalized(entries)
    }
}

/// Fitted vectorizer plus one sparse row per document, aligned by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    vectorizer: TfIdfVectorizer,
    rows: Vec<SparseVector>,
}

impl LexicalIndex {
    pub fn build(documents: &[String], config: TfIdfConfig) -> Self {
        let (vectorizer, rows) = TfIdfVectorizer::fit_transform(config, documents);
        Self { vectorizer, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn vectorizer(&self) -> &TfIdfVectorizer {
        &self.vectorizer
    }

    pub fn query_vector(&self, query: &str) -> SparseVector {
        self.vectorizer.transform(query)
    }

    /// Cosine similarity of `query` against every row, indexed by document id
    pub fn similarities(&self, query: &str) -> Vec<f32> {
        let query_vec = self.query_vector(query);
        self.rows.iter().map(|row| query_vec.cosine(row)).collect()
    }

    /// Similarity of a projected query to one document; `None` for unknown ids
    pub fn similarity(&self, query_vec: &SparseVector, id: DocId) -> Option<f32> {
        self.rows.get(id).map(|row| query_vec.cosine(row))
    }

    /// Top `k` documents by cosine similarity
    pub fn search(&self, query: &str, k: usize) -> Vec<(DocId, f32)> {
        if k == 0 || self.rows.is_empty() {
            return Vec::new();
        }
        top_k(&self.similarities(query), k)
    }
}

/// Nearest-neighbour search over the lexical index of the current snapshot
pub struct LexicalRetriever {
    store: Arc<CorpusStore>,
}

impl LexicalRetriever {
    pub fn new(store: Arc<CorpusStore>) -> Self {
        Self { store }
    }
}

impl Retriever for LexicalRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievalResult> {
        let snapshot = self.store.snapshot();
        let Some(index) = snapshot.lexical() else {
            return Vec::new();
        };
        let hits = index.search(query, k);
        super::resolve_hits(snapshot.corpus(), hits, RetrievalSource::Lexical)
    }

    fn source(&self) -> RetrievalSource {
        RetrievalSource::Lexical
    }
}
