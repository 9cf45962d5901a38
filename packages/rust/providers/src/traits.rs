//! Collaborator roles the pipeline depends on.
//!
//! One trait per role. The pipeline only ever sees `dyn` trait objects, so
//! concrete services can be swapped and tests can use in-memory fakes.

use async_trait::async_trait;
use linkdigest_shared::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Text extracted from one page, keyed by the canonical URL the
/// collaborator reports (which may differ from the requested URL).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    /// The URL as it was passed to [`Extractor::extract`].
    pub requested: String,
    /// Canonical URL after redirects/normalization; the key from here on.
    pub url: String,
    pub text: String,
}

/// Verdict on one page text: whether it is worth keeping, and its summary.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct SummaryVerdict {
    pub is_useful: bool,
    #[serde(default)]
    pub summary: String,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract one chunk of URLs. URLs that fail individually are simply
    /// missing from the result; an `Err` means the whole call failed.
    async fn extract(&self, urls: &[String]) -> Result<Vec<ExtractedPage>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Judge and summarize a single page text.
    async fn summarize_one(&self, text: &str) -> Result<SummaryVerdict>;

    /// A one- or two-word topic covering all `texts`.
    async fn summarize_topic(&self, texts: &[String]) -> Result<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}

pub trait Clusterer: Send + Sync {
    /// One label per vector, in input order. `-1` marks noise.
    fn clusterize(&self, vectors: &[Vec<f64>]) -> Result<Vec<i32>>;

    /// Up to `n` distinct indices of points labelled `label`.
    fn sample_from_cluster(
        &self,
        labels: &[i32],
        label: i32,
        n: usize,
        rng: &mut StdRng,
    ) -> Vec<usize> {
        sample_members(labels, label, n, rng)
    }
}

/// Draw up to `n` member indices of `label`, uniformly without replacement.
pub fn sample_members(labels: &[i32], label: i32, n: usize, rng: &mut StdRng) -> Vec<usize> {
    let members: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| **l == label)
        .map(|(i, _)| i)
        .collect();

    members.choose_multiple(rng, n).copied().collect()
}
