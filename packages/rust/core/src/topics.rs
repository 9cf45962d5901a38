//! Cluster topic labeling.
//!
//! Each distinct label (noise included) gets a short topic generated from a
//! random sample of its members' summaries. Topic labeling never fails the
//! run: a cluster without usable summaries, or whose topic call fails, keeps
//! the empty topic.

use std::collections::{BTreeSet, HashMap};

use linkdigest_providers::{Clusterer, Summarizer};
use linkdigest_shared::{ClusterAssignment, Failure, RecordSet, Stage, Summary};
use rand::rngs::StdRng;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::ProgressReporter;
use crate::stages::StageOutput;

/// Fill in `topic` for every cluster assignment.
#[instrument(skip_all, fields(points = clusters.len(), sample_size = sample_size))]
pub async fn label_topics(
    summarizer: &dyn Summarizer,
    clusterer: &dyn Clusterer,
    clusters: RecordSet<ClusterAssignment>,
    summaries: &RecordSet<Summary>,
    sample_size: usize,
    rng: &mut StdRng,
    progress: &dyn ProgressReporter,
) -> StageOutput<ClusterAssignment> {
    let labels: Vec<i32> = clusters.iter().map(|c| c.label).collect();
    let distinct: BTreeSet<i32> = labels.iter().copied().collect();
    let summary_index = summaries.index_by_url();

    let mut topics: HashMap<i32, String> = HashMap::with_capacity(distinct.len());
    let mut failures = Vec::new();

    for (i, &label) in distinct.iter().enumerate() {
        let sample = clusterer.sample_from_cluster(&labels, label, sample_size, rng);
        let texts: Vec<String> = sample
            .iter()
            .filter_map(|&idx| summary_index.get(clusters.records()[idx].url.as_str()))
            .map(|&pos| summaries.records()[pos].summary.clone())
            .filter(|s| !s.trim().is_empty())
            .collect();

        let topic = if texts.is_empty() {
            warn!(label, "no summaries for cluster, leaving topic empty");
            failures.push(Failure::item(
                Stage::TopicLabeling,
                label.to_string(),
                "no member summaries available",
            ));
            String::new()
        } else {
            match summarizer.summarize_topic(&texts).await {
                Ok(topic) => topic.trim().to_string(),
                Err(e) => {
                    warn!(label, error = %e, "topic generation failed, leaving topic empty");
                    failures.push(Failure::item(
                        Stage::TopicLabeling,
                        label.to_string(),
                        e.to_string(),
                    ));
                    String::new()
                }
            }
        };

        debug!(label, sampled = texts.len(), %topic, "cluster topic");
        topics.insert(label, topic);
        progress.item_progress(Stage::TopicLabeling, i + 1, distinct.len());
    }

    let records: RecordSet<ClusterAssignment> = clusters
        .into_iter()
        .map(|mut c| {
            c.topic = topics.get(&c.label).cloned().unwrap_or_default();
            c
        })
        .collect();

    info!(
        clusters = distinct.len(),
        untitled = failures.len(),
        "topic labeling complete"
    );

    StageOutput { records, failures }
}
