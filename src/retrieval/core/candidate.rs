//! Retrieved candidates and their deduplication identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::retrieval::core::kinds::DocumentType;
use crate::retrieval::text::dedupe::content_fingerprint;

/// A chunk of a canonical text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Canonical document identifier (for example `T08n0251`).
    pub document_id: String,
    /// Volume (卷) within the document.
    pub volume: u32,
    /// Position of the chunk inside its volume, when the backend knows it.
    pub chunk_index: Option<u32>,
    /// Display title of the document.
    pub title: String,
    /// Genre of the document.
    pub document_type: DocumentType,
    /// Chunk text.
    pub content: String,
    /// Backend relevance (similarity or text rank); informational only.
    pub score: Option<f64>,
}

/// A glossary definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    /// Headword.
    pub term: String,
    /// Rendered entry, `【term】definition`.
    pub content: String,
    /// Dictionary the entry comes from.
    pub source: String,
    /// Backend relevance; informational only.
    pub score: Option<f64>,
}

impl GlossaryEntry {
    /// Build an entry and render its content from the headword and definition.
    #[must_use]
    pub fn new(term: &str, definition: &str, source: &str, score: Option<f64>) -> Self {
        Self {
            term: term.to_string(),
            content: format!("【{term}】{definition}"),
            source: source.to_string(),
            score,
        }
    }
}

/// One unit of retrieved content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Candidate {
    /// A passage chunk.
    Passage(Passage),
    /// A glossary entry.
    GlossaryEntry(GlossaryEntry),
}

impl Candidate {
    /// Identity used to collapse the same content found via different routes.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        match self {
            Self::Passage(Passage {
                document_id,
                volume,
                chunk_index: Some(index),
                ..
            }) => DedupKey(format!("{document_id}:{volume}:{index}")),
            Self::Passage(passage) => {
                DedupKey(format!("content:{}", content_fingerprint(&passage.content)))
            }
            Self::GlossaryEntry(entry) => DedupKey(format!("dict:{}", entry.term)),
        }
    }

    /// Candidate text.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Passage(passage) => &passage.content,
            Self::GlossaryEntry(entry) => &entry.content,
        }
    }

    /// Replace the candidate text, keeping all metadata.
    pub fn set_content(&mut self, content: String) {
        match self {
            Self::Passage(passage) => passage.content = content,
            Self::GlossaryEntry(entry) => entry.content = content,
        }
    }

    /// Backend relevance score, if any.
    #[must_use]
    pub const fn score(&self) -> Option<f64> {
        match self {
            Self::Passage(passage) => passage.score,
            Self::GlossaryEntry(entry) => entry.score,
        }
    }

    /// Document id for passages; `None` for glossary entries.
    #[must_use]
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Passage(passage) => Some(&passage.document_id),
            Self::GlossaryEntry(_) => None,
        }
    }

    /// Borrow the passage, if this is one.
    #[must_use]
    pub const fn as_passage(&self) -> Option<&Passage> {
        match self {
            Self::Passage(passage) => Some(passage),
            Self::GlossaryEntry(_) => None,
        }
    }

    /// Genre multiplier for fusion; glossary entries are not weighted.
    #[must_use]
    pub const fn type_weight(&self) -> f64 {
        match self {
            Self::Passage(passage) => passage.document_type.weight(),
            Self::GlossaryEntry(_) => 1.0,
        }
    }
}

/// Source-agnostic candidate identity.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Borrow the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
