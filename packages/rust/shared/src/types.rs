//! Core domain types: per-stage records and the URL-keyed record set.
//!
//! Every stage output is its own [`RecordSet`], keyed by URL. Stages may drop
//! or reorder rows, so rows from different stages are never matched by
//! position; they are matched by URL (see `linkdigest_core::realign`).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Cluster label reserved for points that belong to no cluster.
pub const NOISE_LABEL: i32 = -1;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One enrichment phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Summarization,
    Embedding,
    Clustering,
    TopicLabeling,
    Persisting,
}

impl Stage {
    /// Stable lowercase name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Summarization => "summarization",
            Self::Embedding => "embedding",
            Self::Clustering => "clustering",
            Self::TopicLabeling => "topic_labeling",
            Self::Persisting => "persisting",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A record addressed by its (canonical) URL.
pub trait Keyed {
    fn url(&self) -> &str;
}

/// Extracted page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedText {
    pub url: String,
    pub text: String,
}

/// Long-form summary of a page judged useful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub url: String,
    pub summary: String,
}

/// Embedding of a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub url: String,
    #[serde(with = "vector_literal")]
    pub vector: Vec<f64>,
}

/// Cluster label and topic for a vector. `topic` stays empty until topic
/// labeling fills it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub url: String,
    pub label: i32,
    #[serde(default)]
    pub topic: String,
}

impl ClusterAssignment {
    /// Whether this point was left out of every cluster.
    pub fn is_noise(&self) -> bool {
        self.label == NOISE_LABEL
    }
}

/// One fully enriched URL, as written to the merged store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub url: String,
    pub text: String,
    pub summary: String,
    #[serde(with = "vector_literal")]
    pub vector: Vec<f64>,
    pub label: i32,
    pub topic: String,
}

macro_rules! impl_keyed {
    ($($ty:ty),* $(,)?) => {
        $(impl Keyed for $ty {
            fn url(&self) -> &str {
                &self.url
            }
        })*
    };
}

impl_keyed!(ParsedText, Summary, Vector, ClusterAssignment, MergedRecord);

// ---------------------------------------------------------------------------
// RecordSet
// ---------------------------------------------------------------------------

/// An ordered, URL-keyed collection of stage records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet<T> {
    records: Vec<T>,
}

impl<T> Default for RecordSet<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T: Keyed> RecordSet<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    /// URLs in record order (duplicates included).
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(Keyed::url)
    }

    /// The distinct URLs of this set.
    pub fn url_set(&self) -> HashSet<&str> {
        self.urls().collect()
    }

    /// URL → position of its first occurrence.
    pub fn index_by_url(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::with_capacity(self.records.len());
        for (i, record) in self.records.iter().enumerate() {
            index.entry(record.url()).or_insert(i);
        }
        index
    }

    /// First record stored under `url`.
    pub fn get(&self, url: &str) -> Option<&T> {
        self.records.iter().find(|r| r.url() == url)
    }

    /// Whether every URL of this set also appears in `other`.
    pub fn is_subset_of<U: Keyed>(&self, other: &RecordSet<U>) -> bool {
        let other_urls = other.url_set();
        self.urls().all(|u| other_urls.contains(u))
    }
}

impl<T: Keyed> FromIterator<T> for RecordSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for RecordSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a RecordSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ---------------------------------------------------------------------------
// Vector literal (de)serialization
// ---------------------------------------------------------------------------

/// Vectors are stored as a single text column holding a float-list literal
/// such as `[0.25,-1.5]`. Shortest round-trip formatting on write and
/// exact parsing on read keep every `f64` bit-identical.
mod vector_literal {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::Error as _};

    pub fn serialize<S: Serializer>(vector: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(S::Error::custom("vector contains a non-finite value"));
        }
        let literal = serde_json::to_string(vector).map_err(S::Error::custom)?;
        serializer.serialize_str(&literal)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let literal = String::deserialize(deserializer)?;
        serde_json::from_str(&literal)
            .map_err(|e| D::Error::custom(format!("invalid vector literal {literal:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(url: &str) -> ParsedText {
        ParsedText {
            url: url.into(),
            text: format!("text of {url}"),
        }
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::TopicLabeling.to_string(), "topic_labeling");
        assert_eq!(Stage::Extraction.as_str(), "extraction");
    }

    #[test]
    fn index_keeps_first_occurrence() {
        let set = RecordSet::new(vec![parsed("a"), parsed("b"), parsed("a")]);
        let index = set.index_by_url();
        assert_eq!(index.len(), 2);
        assert_eq!(index["a"], 0);
        assert_eq!(index["b"], 1);
        assert_eq!(set.url_set().len(), 2);
    }

    #[test]
    fn subset_check() {
        let parsed_set = RecordSet::new(vec![parsed("a"), parsed("b")]);
        let summaries = RecordSet::new(vec![Summary {
            url: "b".into(),
            summary: "s".into(),
        }]);
        assert!(summaries.is_subset_of(&parsed_set));
        assert!(!parsed_set.is_subset_of(&summaries));
    }

    #[test]
    fn noise_detection() {
        let c = ClusterAssignment {
            url: "a".into(),
            label: NOISE_LABEL,
            topic: String::new(),
        };
        assert!(c.is_noise());
    }

    #[test]
    fn vector_serializes_as_literal() {
        let v = Vector {
            url: "http://a".into(),
            vector: vec![0.1, -2.5, 1e-7],
        };
        let json = serde_json::to_value(&v).expect("serialize");
        assert_eq!(json["vector"], "[0.1,-2.5,1e-7]");

        let back: Vector = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, v);
    }

    #[test]
    fn vector_rejects_non_finite() {
        let v = Vector {
            url: "http://a".into(),
            vector: vec![f64::NAN],
        };
        assert!(serde_json::to_string(&v).is_err());
    }
}
