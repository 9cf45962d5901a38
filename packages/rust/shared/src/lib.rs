//! Shared types, error model, and configuration for LinkDigest.
//!
//! This crate is the foundation depended on by all other LinkDigest crates.
//! It provides:
//! - [`LinkDigestError`] and the [`FailureKind`] taxonomy
//! - Stage record types ([`ParsedText`], [`Summary`], [`Vector`], [`ClusterAssignment`],
//!   [`MergedRecord`]) and the URL-keyed [`RecordSet`]
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClusteringConfig, EmbeddingConfig, ExtractionConfig, ExtractionProvider,
    LlmConfig, PipelineConfig, StorageConfig, TopicsConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_keys,
};
pub use error::{Failure, FailureKind, LinkDigestError, Result};
pub use types::{
    ClusterAssignment, Keyed, MergedRecord, NOISE_LABEL, ParsedText, RecordSet, Stage, Summary,
    Vector,
};
