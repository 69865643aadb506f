use serde::{Deserialize, Serialize};

/// Stable identifier of a document: its position in the corpus.
pub type DocId = usize;

/// A document borrowed from the corpus together with its stable id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document<'a> {
    pub id: DocId,
    pub text: &'a str,
}

/// Ordered, immutable list of knowledge snippets.
///
/// Insertion order is corpus order and the array index is the document id.
/// Duplicate text is kept as separate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    documents: Vec<String>,
}

impl Corpus {
    pub fn new(documents: Vec<String>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Look up a document by id; `None` for ids outside the corpus
    pub fn get(&self, id: DocId) -> Option<Document<'_>> {
        self.documents
            .get(id)
            .map(|text| Document { id, text: text.as_str() })
    }

    pub fn iter(&self) -> impl Iterator<Item = Document<'_>> {
        self.documents
            .iter()
            .enumerate()
            .map(|(id, text)| Document { id, text: text.as_str() })
    }

    pub fn texts(&self) -> &[String] {
        &self.documents
    }

    pub fn into_texts(self) -> Vec<String> {
        self.documents
    }
}

impl From<Vec<String>> for Corpus {
    fn from(documents: Vec<String>) -> Self {
        Self::new(documents)
    }
}
