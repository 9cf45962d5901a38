//! Stage drivers: one function per enrichment stage.
//!
//! Each driver turns the previous stage's record set into a fresh one.
//! Extraction and summarization absorb item and batch failures and report
//! them alongside their records; embedding and clustering either produce a
//! complete, aligned output or fail the stage.

use std::collections::HashSet;

use linkdigest_providers::{Clusterer, Embedder, Extractor, Summarizer};
use linkdigest_shared::{
    ClusterAssignment, Failure, LinkDigestError, ParsedText, RecordSet, Result, Stage, Summary,
    Vector,
};
use tracing::{debug, info, instrument, warn};

use crate::pipeline::ProgressReporter;

/// Records produced by a stage plus the non-fatal failures it absorbed.
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub records: RecordSet<T>,
    pub failures: Vec<Failure>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// What extraction produced, plus every URL the kept pages answer for.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: RecordSet<ParsedText>,
    pub failures: Vec<Failure>,
    /// Requested and canonical URLs of every page that came back with text.
    pub resolved: HashSet<String>,
}

/// Extract `urls` in chunks of `chunk_size`, one collaborator call per chunk.
///
/// A failed call loses only its chunk. Pages come back keyed by the
/// canonical URL the collaborator reports; pages with no text are dropped,
/// and each canonical URL is kept once. Pages whose canonical URL is already
/// in `known` add nothing but still resolve their requested URL.
#[instrument(skip_all, fields(extractor = extractor.name(), urls = urls.len(), chunk_size = chunk_size))]
pub async fn extract(
    extractor: &dyn Extractor,
    urls: &[String],
    known: &HashSet<String>,
    chunk_size: usize,
    progress: &dyn ProgressReporter,
) -> Extraction {
    let chunk_size = chunk_size.max(1);
    let total_chunks = urls.len().div_ceil(chunk_size);

    let mut records = Vec::with_capacity(urls.len());
    let mut failures = Vec::new();
    let mut resolved = HashSet::with_capacity(urls.len());
    let mut kept: HashSet<String> = HashSet::with_capacity(urls.len());

    for (i, chunk) in urls.chunks(chunk_size).enumerate() {
        match extractor.extract(chunk).await {
            Ok(pages) => {
                for page in pages {
                    if page.text.trim().is_empty() {
                        debug!(url = %page.url, "no content extracted, dropping");
                        continue;
                    }
                    resolved.insert(page.requested);
                    resolved.insert(page.url.clone());

                    if known.contains(&page.url) {
                        debug!(url = %page.url, "canonical url already known, dropping");
                        continue;
                    }
                    if !kept.insert(page.url.clone()) {
                        debug!(url = %page.url, "duplicate canonical url, keeping first");
                        continue;
                    }
                    records.push(ParsedText {
                        url: page.url,
                        text: page.text,
                    });
                }
            }
            Err(e) => {
                warn!(chunk = i, urls = ?chunk, error = %e, "extraction chunk failed, skipping");
                failures.push(Failure::batch(
                    Stage::Extraction,
                    Some(chunk.join(" ")),
                    e.to_string(),
                ));
            }
        }
        progress.item_progress(Stage::Extraction, i + 1, total_chunks);
    }

    info!(
        extracted = records.len(),
        resolved = resolved.len(),
        failed_chunks = failures.len(),
        "extraction complete"
    );

    Extraction {
        records: RecordSet::new(records),
        failures,
        resolved,
    }
}

// ---------------------------------------------------------------------------
// Summarization
// ---------------------------------------------------------------------------

/// Summarize each page in turn and keep only the useful ones.
///
/// Verdicts are zipped with their pages before filtering, so every summary
/// keeps the URL of the text it came from.
#[instrument(skip_all, fields(pages = parsed.len()))]
pub async fn summarize(
    summarizer: &dyn Summarizer,
    parsed: &RecordSet<ParsedText>,
    progress: &dyn ProgressReporter,
) -> StageOutput<Summary> {
    let total = parsed.len();
    let mut verdicts = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (i, page) in parsed.iter().enumerate() {
        let verdict = match summarizer.summarize_one(&page.text).await {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                warn!(url = %page.url, error = %e, "summarization failed, treating as not useful");
                failures.push(Failure::item(Stage::Summarization, &page.url, e.to_string()));
                None
            }
        };
        verdicts.push(verdict);
        progress.item_progress(Stage::Summarization, i + 1, total);
    }

    let records: RecordSet<Summary> = parsed
        .iter()
        .zip(verdicts)
        .filter_map(|(page, verdict)| {
            let verdict = verdict?;
            let summary = verdict.summary.trim();
            (verdict.is_useful && !summary.is_empty()).then(|| Summary {
                url: page.url.clone(),
                summary: summary.to_string(),
            })
        })
        .collect();

    info!(
        summarized = records.len(),
        not_useful = total - records.len() - failures.len(),
        failed = failures.len(),
        "summarization complete"
    );

    StageOutput { records, failures }
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// Embed every summary in one call. The output pairs `vectors[i]` with
/// `summaries[i]`; anything else fails the stage.
#[instrument(skip_all, fields(summaries = summaries.len()))]
pub async fn embed(
    embedder: &dyn Embedder,
    summaries: &RecordSet<Summary>,
) -> Result<RecordSet<Vector>> {
    if summaries.is_empty() {
        debug!("no summaries to embed");
        return Ok(RecordSet::default());
    }

    let texts: Vec<String> = summaries.iter().map(|s| s.summary.clone()).collect();
    let vectors = embedder
        .embed(&texts)
        .await
        .map_err(|e| LinkDigestError::stage(Stage::Embedding, e.to_string()))?;

    if vectors.len() != summaries.len() {
        return Err(LinkDigestError::stage(
            Stage::Embedding,
            format!("{} vectors for {} summaries", vectors.len(), summaries.len()),
        ));
    }

    let dims = vectors[0].len();
    if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
        return Err(LinkDigestError::stage(
            Stage::Embedding,
            "vectors are empty or have inconsistent dimensions",
        ));
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(LinkDigestError::stage(
            Stage::Embedding,
            "vectors contain non-finite values",
        ));
    }

    let records: RecordSet<Vector> = summaries
        .iter()
        .zip(vectors)
        .map(|(summary, vector)| Vector {
            url: summary.url.clone(),
            vector,
        })
        .collect();

    info!(embedded = records.len(), dims, "embedding complete");
    Ok(records)
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Assign a cluster label to every vector, in order. Topics start empty.
#[instrument(skip_all, fields(vectors = vectors.len()))]
pub fn cluster(
    clusterer: &dyn Clusterer,
    vectors: &RecordSet<Vector>,
) -> Result<RecordSet<ClusterAssignment>> {
    if vectors.is_empty() {
        debug!("no vectors to cluster");
        return Ok(RecordSet::default());
    }

    let points: Vec<Vec<f64>> = vectors.iter().map(|v| v.vector.clone()).collect();
    let labels = clusterer
        .clusterize(&points)
        .map_err(|e| LinkDigestError::stage(Stage::Clustering, e.to_string()))?;

    if labels.len() != vectors.len() {
        return Err(LinkDigestError::stage(
            Stage::Clustering,
            format!("{} labels for {} vectors", labels.len(), vectors.len()),
        ));
    }

    let records: RecordSet<ClusterAssignment> = vectors
        .iter()
        .zip(labels)
        .map(|(vector, label)| ClusterAssignment {
            url: vector.url.clone(),
            label,
            topic: String::new(),
        })
        .collect();

    info!(
        clustered = records.len(),
        noise = records.iter().filter(|c| c.is_noise()).count(),
        "clustering complete"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use async_trait::async_trait;
    use linkdigest_providers::{ExtractedPage, SummaryVerdict};
    use linkdigest_shared::{FailureKind, NOISE_LABEL};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn parsed(urls: &[&str]) -> RecordSet<ParsedText> {
        urls.iter()
            .map(|u| ParsedText {
                url: u.to_string(),
                text: format!("text of {u}"),
            })
            .collect()
    }

    fn summaries(urls: &[&str]) -> RecordSet<Summary> {
        urls.iter()
            .map(|u| Summary {
                url: u.to_string(),
                summary: format!("summary of {u}"),
            })
            .collect()
    }

    /// Fails any chunk containing "http://bad"; returns "" for "http://empty".
    /// URLs under "http://mirror/" all resolve to "http://c".
    struct ChunkExtractor;

    #[async_trait]
    impl Extractor for ChunkExtractor {
        async fn extract(&self, urls: &[String]) -> Result<Vec<ExtractedPage>> {
            if urls.iter().any(|u| u == "http://bad") {
                return Err(LinkDigestError::Network("503".into()));
            }
            Ok(urls
                .iter()
                .map(|u| ExtractedPage {
                    requested: u.clone(),
                    url: if u.starts_with("http://mirror/") {
                        "http://c".into()
                    } else {
                        u.clone()
                    },
                    text: if u == "http://empty" {
                        "   ".into()
                    } else {
                        format!("text of {u}")
                    },
                })
                .collect())
        }

        fn name(&self) -> &str {
            "chunks"
        }
    }

    /// Texts mentioning "junk" are not useful; texts mentioning "boom" fail.
    struct KeywordSummarizer;

    #[async_trait]
    impl Summarizer for KeywordSummarizer {
        async fn summarize_one(&self, text: &str) -> Result<SummaryVerdict> {
            if text.contains("boom") {
                return Err(LinkDigestError::parse("bad json"));
            }
            Ok(SummaryVerdict {
                is_useful: !text.contains("junk"),
                summary: format!("  summary: {text}  "),
            })
        }

        async fn summarize_topic(&self, _texts: &[String]) -> Result<String> {
            Ok("Topic".into())
        }
    }

    struct FixedEmbedder(Vec<Vec<f64>>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
            Ok(self.0.clone())
        }
    }

    struct FixedClusterer(Vec<i32>);

    impl Clusterer for FixedClusterer {
        fn clusterize(&self, _vectors: &[Vec<f64>]) -> Result<Vec<i32>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn failed_chunk_loses_only_its_urls() {
        let urls = strings(&["http://a", "http://b", "http://bad", "http://c"]);
        let out = extract(&ChunkExtractor, &urls, &HashSet::new(), 2, &SilentProgress).await;

        assert_eq!(out.records.urls().collect::<Vec<_>>(), ["http://a", "http://b"]);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].kind, FailureKind::Batch);
        assert_eq!(out.failures[0].key.as_deref(), Some("http://bad http://c"));
    }

    #[tokio::test]
    async fn empty_content_is_dropped() {
        let urls = strings(&["http://a", "http://empty"]);
        let out = extract(&ChunkExtractor, &urls, &HashSet::new(), 2, &SilentProgress).await;
        assert_eq!(out.records.len(), 1);
        assert!(out.failures.is_empty());
        assert!(!out.resolved.contains("http://empty"));
    }

    #[tokio::test]
    async fn shared_canonical_url_keeps_first_page() {
        let urls = strings(&["http://mirror/x", "http://a", "http://mirror/y"]);
        let out = extract(&ChunkExtractor, &urls, &HashSet::new(), 2, &SilentProgress).await;

        assert_eq!(out.records.urls().collect::<Vec<_>>(), ["http://c", "http://a"]);
        assert_eq!(out.records.get("http://c").unwrap().text, "text of http://mirror/x");
        for url in ["http://mirror/x", "http://mirror/y", "http://c", "http://a"] {
            assert!(out.resolved.contains(url), "{url} not resolved");
        }
    }

    #[tokio::test]
    async fn known_canonical_url_is_resolved_but_not_kept() {
        let urls = strings(&["http://mirror/z", "http://b"]);
        let known: HashSet<String> = ["http://c".to_string()].into();
        let out = extract(&ChunkExtractor, &urls, &known, 5, &SilentProgress).await;

        assert_eq!(out.records.urls().collect::<Vec<_>>(), ["http://b"]);
        assert!(out.resolved.contains("http://mirror/z"));
    }

    #[tokio::test]
    async fn summarize_filters_not_useful_and_failed() {
        let input = parsed(&["http://a", "http://junk", "http://boom", "http://d"]);
        let out = summarize(&KeywordSummarizer, &input, &SilentProgress).await;

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records.urls().collect::<Vec<_>>(), ["http://a", "http://d"]);
        assert_eq!(out.records.records()[0].summary, "summary: text of http://a");
        assert!(out.records.is_subset_of(&input));
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].kind, FailureKind::Item);
        assert_eq!(out.failures[0].key.as_deref(), Some("http://boom"));
    }

    #[tokio::test]
    async fn embed_pairs_vectors_with_summaries() {
        let input = summaries(&["http://a", "http://b"]);
        let embedder = FixedEmbedder(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let out = embed(&embedder, &input).await.unwrap();

        assert_eq!(out.get("http://b").unwrap().vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn embed_count_mismatch_fails_stage() {
        let input = summaries(&["http://a", "http://b"]);
        let embedder = FixedEmbedder(vec![vec![1.0, 0.0]]);
        let err = embed(&embedder, &input).await.unwrap_err();

        assert!(matches!(err, LinkDigestError::Stage { stage: Stage::Embedding, .. }));
    }

    #[tokio::test]
    async fn embed_inconsistent_dimensions_fails_stage() {
        let input = summaries(&["http://a", "http://b"]);
        let embedder = FixedEmbedder(vec![vec![1.0, 0.0], vec![1.0]]);
        assert!(embed(&embedder, &input).await.is_err());
    }

    #[tokio::test]
    async fn embed_empty_input_skips_call() {
        let embedder = FixedEmbedder(vec![vec![1.0]]);
        let out = embed(&embedder, &RecordSet::default()).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn cluster_keeps_order_and_noise() {
        let vectors: RecordSet<Vector> = ["http://a", "http://b"]
            .iter()
            .map(|u| Vector {
                url: u.to_string(),
                vector: vec![1.0],
            })
            .collect();
        let out = cluster(&FixedClusterer(vec![NOISE_LABEL, 3]), &vectors).unwrap();

        assert_eq!(out.records()[0].url, "http://a");
        assert!(out.records()[0].is_noise());
        assert_eq!(out.records()[1].label, 3);
        assert!(out.iter().all(|c| c.topic.is_empty()));
    }

    #[test]
    fn cluster_label_mismatch_fails_stage() {
        let vectors: RecordSet<Vector> = ["http://a", "http://b"]
            .iter()
            .map(|u| Vector {
                url: u.to_string(),
                vector: vec![1.0],
            })
            .collect();
        let err = cluster(&FixedClusterer(vec![0]), &vectors).unwrap_err();
        assert!(matches!(err, LinkDigestError::Stage { stage: Stage::Clustering, .. }));
    }
}
