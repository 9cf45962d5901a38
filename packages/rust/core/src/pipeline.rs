//! Enrichment run orchestrator: URLs → dedup → extract → summarize → embed →
//! cluster → topics → merge.
//!
//! A run moves through [`RunState`]s strictly in order. Only the gate can
//! end a run early (when every URL is already known); empty collections
//! simply flow through the remaining stages. Every stage's output is
//! appended to its store before the next stage starts.

use std::time::{Duration, Instant};

use linkdigest_providers::{Clusterer, Embedder, Extractor, Summarizer};
use linkdigest_shared::{Failure, LinkDigestError, PipelineConfig, Result, Stage};
use linkdigest_storage::Storage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{dedup, realign, stages, topics};

// ---------------------------------------------------------------------------
// Run state & report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Gated,
    Extracting,
    Summarizing,
    Embedding,
    Clustering,
    TopicLabeling,
    Persisting,
    Done,
}

impl RunState {
    /// Human-readable description for progress output.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Gated => "Checking known URLs",
            Self::Extracting => "Extracting page content",
            Self::Summarizing => "Summarizing pages",
            Self::Embedding => "Embedding summaries",
            Self::Clustering => "Clustering",
            Self::TopicLabeling => "Naming clusters",
            Self::Persisting => "Writing merged records",
            Self::Done => "Done",
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every requested URL was already known; no stage ran.
    NothingNew,
    /// All stages ran (possibly on empty inputs).
    Completed,
}

/// Result of one enrichment run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// URLs handed to the run.
    pub requested: usize,
    /// URLs that passed the dedup gate.
    pub new_urls: usize,
    pub extracted: usize,
    pub summarized: usize,
    pub embedded: usize,
    pub clustered: usize,
    pub merged: usize,
    /// URLs added to the key-set store by this run.
    pub newly_known: usize,
    /// Non-fatal failures absorbed along the way.
    pub failures: Vec<Failure>,
    pub elapsed: Duration,
}

impl RunReport {
    fn new(run_id: Uuid, requested: usize, new_urls: usize) -> Self {
        Self {
            run_id,
            outcome: RunOutcome::Completed,
            requested,
            new_urls,
            extracted: 0,
            summarized: 0,
            embedded: 0,
            clustered: 0,
            merged: 0,
            newly_known: 0,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the run enters a new state.
    fn state(&self, state: RunState);
    /// Called after each collaborator call inside a stage.
    fn item_progress(&self, stage: Stage, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state(&self, _state: RunState) {}
    fn item_progress(&self, _stage: Stage, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The four collaborators a run talks to.
pub struct Collaborators {
    pub extractor: Box<dyn Extractor>,
    pub summarizer: Box<dyn Summarizer>,
    pub embedder: Box<dyn Embedder>,
    pub clusterer: Box<dyn Clusterer>,
}

pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    storage: Storage,
}

impl Pipeline {
    /// Open the stores under `config.data_dir` and wire up the collaborators.
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        let storage = Storage::open(&config.data_dir)?;
        Ok(Self {
            config,
            collaborators,
            storage,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run every stage over the not-yet-known subset of `urls`.
    ///
    /// Item and batch failures are collected in the report. A stage failure
    /// returns `Err` after logging; checkpoints written so far stay on disk.
    #[instrument(skip_all, fields(requested = urls.len()))]
    pub async fn run(&self, urls: &[String], progress: &dyn ProgressReporter) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        let c = &self.collaborators;

        info!(%run_id, requested = urls.len(), "starting enrichment run");

        // --- Gate ---
        progress.state(RunState::Gated);
        let known = self.storage.known_urls()?;
        let new_urls = dedup::select_new(urls, &known);
        info!(new_urls = new_urls.len(), known = known.len(), "dedup gate");

        let mut report = RunReport::new(run_id, urls.len(), new_urls.len());

        if new_urls.is_empty() {
            info!("nothing new to ingest");
            report.outcome = RunOutcome::NothingNew;
            report.elapsed = start.elapsed();
            progress.state(RunState::Done);
            progress.done(&report);
            return Ok(report);
        }

        // --- Extraction ---
        progress.state(RunState::Extracting);
        let extraction = stages::extract(
            c.extractor.as_ref(),
            &new_urls,
            &known,
            self.config.chunk_size,
            progress,
        )
        .await;
        report.failures.extend(extraction.failures);
        let parsed = extraction.records;
        report.extracted = parsed.len();
        checkpoint(Stage::Extraction, self.storage.save_texts(&parsed))?;

        // Requested URLs as well as canonical ones, so the gate recognizes
        // a redirected URL on the next run.
        report.newly_known =
            checkpoint(Stage::Extraction, self.storage.mark_known(&extraction.resolved))?;

        // --- Summarization ---
        progress.state(RunState::Summarizing);
        let summarization = stages::summarize(c.summarizer.as_ref(), &parsed, progress).await;
        report.failures.extend(summarization.failures);
        let summaries = summarization.records;
        report.summarized = summaries.len();
        checkpoint(Stage::Summarization, self.storage.save_summaries(&summaries))?;

        // --- Embedding ---
        progress.state(RunState::Embedding);
        let vectors = fatal(stages::embed(c.embedder.as_ref(), &summaries).await)?;
        report.embedded = vectors.len();
        checkpoint(Stage::Embedding, self.storage.save_vectors(&vectors))?;

        // --- Clustering ---
        progress.state(RunState::Clustering);
        let clusters = fatal(stages::cluster(c.clusterer.as_ref(), &vectors))?;
        report.clustered = clusters.len();

        // --- Topic labeling ---
        progress.state(RunState::TopicLabeling);
        let mut rng = match self.config.topic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let labeled = topics::label_topics(
            c.summarizer.as_ref(),
            c.clusterer.as_ref(),
            clusters,
            &summaries,
            self.config.topic_sample_size,
            &mut rng,
            progress,
        )
        .await;
        report.failures.extend(labeled.failures);
        let clusters = labeled.records;
        checkpoint(Stage::TopicLabeling, self.storage.save_clusters(&clusters))?;

        // --- Merge ---
        progress.state(RunState::Persisting);
        let merged = realign::realign(&parsed, &summaries, &vectors, &clusters);
        report.merged = merged.len();
        checkpoint(Stage::Persisting, self.storage.save_merged(&merged))?;

        report.elapsed = start.elapsed();
        info!(
            %run_id,
            extracted = report.extracted,
            summarized = report.summarized,
            merged = report.merged,
            failures = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "enrichment run complete"
        );

        progress.state(RunState::Done);
        progress.done(&report);
        Ok(report)
    }
}

/// Log and pass through a stage failure.
fn fatal<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!(error = %e, "stage failed, aborting run");
    }
    result
}

/// A store write that fails ends the run as a failure of `stage`.
fn checkpoint<T>(stage: Stage, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        error!(%stage, error = %e, "checkpoint write failed, aborting run");
        LinkDigestError::stage(stage, format!("checkpoint write failed: {e}"))
    })
}
