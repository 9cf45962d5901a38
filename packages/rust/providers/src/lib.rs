//! Collaborators the enrichment pipeline talks to.
//!
//! This crate provides:
//! - [`traits`]: one trait per collaborator role (extract, summarize, embed, cluster)
//! - [`TavilyExtractor`] / [`PageExtractor`]: hosted and direct-fetch extraction
//! - [`OpenAiClient`]: summaries, topics and embeddings over an OpenAI-compatible API
//! - [`DensityClusterer`]: cosine-distance density clustering, in process

pub mod density;
pub mod http;
pub mod openai;
pub mod tavily;
pub mod traits;

pub use density::{DensityClusterer, cosine_distance};
pub use http::{PageExtractor, html_to_text};
pub use openai::OpenAiClient;
pub use tavily::TavilyExtractor;
pub use traits::{
    Clusterer, Embedder, ExtractedPage, Extractor, Summarizer, SummaryVerdict, sample_members,
};
