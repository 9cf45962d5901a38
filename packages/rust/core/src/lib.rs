//! Core pipeline orchestration and domain logic for LinkDigest.
//!
//! This crate ties the collaborators and stage stores together into one
//! incremental enrichment run ([`Pipeline::run`]).

pub mod dedup;
pub mod pipeline;
pub mod realign;
pub mod stages;
pub mod topics;

pub use dedup::select_new;
pub use pipeline::{
    Collaborators, Pipeline, ProgressReporter, RunOutcome, RunReport, RunState, SilentProgress,
};
pub use realign::realign;
pub use stages::{Extraction, StageOutput};
pub use topics::label_topics;
