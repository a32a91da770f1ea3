//! Corpus document categories and retriever names.
//!
//! - [`DocumentType`] classifies a canonical text by genre. Each genre carries an
//!   authority weight that the fusion step multiplies into passage contributions.
//! - [`RetrievalSource`] names the retrieval strategy that surfaced a candidate.
//!
//! Both use stable identifiers for storage and for the JSON surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Genre of a canonical text.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum DocumentType {
    /// Discourses (经).
    #[serde(rename = "经")]
    Sutra,
    /// Monastic discipline (律).
    #[serde(rename = "律")]
    Vinaya,
    /// Treatises (论).
    #[serde(rename = "论")]
    Treatise,
    /// Commentaries and sub-commentaries (注疏).
    #[serde(rename = "注疏")]
    Commentary,
    /// Ritual manuals (仪轨).
    #[serde(rename = "仪轨")]
    Ritual,
    /// Anything else, including unlabeled texts.
    #[default]
    #[serde(rename = "其他")]
    Other,
}

impl DocumentType {
    /// All known document types.
    pub const ALL: [Self; 6] = [
        Self::Sutra,
        Self::Vinaya,
        Self::Treatise,
        Self::Commentary,
        Self::Ritual,
        Self::Other,
    ];

    /// Stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sutra => "经",
            Self::Vinaya => "律",
            Self::Treatise => "论",
            Self::Commentary => "注疏",
            Self::Ritual => "仪轨",
            Self::Other => "其他",
        }
    }

    /// Authority multiplier applied to passage contributions during fusion.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Sutra => 1.0,
            Self::Vinaya => 0.95,
            Self::Treatise => 0.9,
            Self::Commentary => 0.7,
            Self::Ritual => 0.6,
            Self::Other => 0.5,
        }
    }

    /// Parse a stored label; unknown or missing labels map to [`DocumentType::Other`].
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        label
            .and_then(|raw| Self::from_str(raw).ok())
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a document type label is not recognized.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocumentTypeParseError(pub String);

impl fmt::Display for DocumentTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown document type: {}", self.0)
    }
}

impl std::error::Error for DocumentTypeParseError {}

impl FromStr for DocumentType {
    type Err = DocumentTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| DocumentTypeParseError(raw.to_string()))
    }
}

/// Retrieval strategy that produced a candidate.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    /// Dense vector similarity.
    Semantic,
    /// Lexical full-text search.
    Fulltext,
    /// Glossary lookup.
    Dictionary,
}

impl RetrievalSource {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Fulltext => "fulltext",
            Self::Dictionary => "dictionary",
        }
    }
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_weights_descend_by_authority() {
        let weights: Vec<f64> = DocumentType::ALL.iter().map(|kind| kind.weight()).collect();
        assert!(weights.windows(2).all(|pair| pair[0] > pair[1]));
        assert!((DocumentType::Commentary.weight() - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_document_type_parses_labels() {
        assert_eq!("经".parse::<DocumentType>(), Ok(DocumentType::Sutra));
        assert_eq!(" 注疏 ".parse::<DocumentType>(), Ok(DocumentType::Commentary));
        assert!("杂".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_unknown_label_falls_back_to_other() {
        assert_eq!(DocumentType::from_label(Some("史传")), DocumentType::Other);
        assert_eq!(DocumentType::from_label(None), DocumentType::Other);
        assert_eq!(DocumentType::from_label(Some("律")), DocumentType::Vinaya);
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&RetrievalSource::Fulltext).unwrap_or_default();
        assert_eq!(json, "\"fulltext\"");
    }
}
