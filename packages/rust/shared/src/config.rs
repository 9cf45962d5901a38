//! Application configuration for LinkDigest.
//!
//! User config lives at `~/.linkdigest/linkdigest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LinkDigestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "linkdigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".linkdigest";

// ---------------------------------------------------------------------------
// Config structs (matching linkdigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where stage stores live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Content extraction service.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Text-generation service used for summaries and topics.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding model settings (served by the `[llm]` endpoint).
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Density clustering parameters.
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Cluster topic sampling.
    #[serde(default)]
    pub topics: TopicsConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; stores are written under `<data_dir>/df_storage/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "var/data".into()
}

/// Which extraction collaborator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionProvider {
    /// Tavily extract API.
    Tavily,
    /// Fetch pages directly and convert HTML locally.
    Http,
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_provider")]
    pub provider: ExtractionProvider,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_extraction_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_extraction_base_url")]
    pub base_url: String,

    /// URLs per extraction call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Tavily `extract_depth` ("basic" or "advanced").
    #[serde(default = "default_extract_depth")]
    pub extract_depth: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_extraction_provider(),
            api_key_env: default_extraction_key_env(),
            base_url: default_extraction_base_url(),
            chunk_size: default_chunk_size(),
            extract_depth: default_extract_depth(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_extraction_provider() -> ExtractionProvider {
    ExtractionProvider::Tavily
}
fn default_extraction_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_extraction_base_url() -> String {
    "https://api.tavily.com".into()
}
fn default_chunk_size() -> usize {
    2
}
fn default_extract_depth() -> String {
    "basic".into()
}
fn default_request_timeout() -> u64 {
    60
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Chat model for summaries and topics.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Page text beyond this many characters is cut before summarizing.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_input_chars: default_max_input_chars(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_input_chars() -> usize {
    12_000
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Requested output dimensionality, if the model supports shortening.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimensions: None,
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".into()
}

/// `[clustering]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Clusters smaller than this are dissolved into noise.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Neighbours (including the point itself) needed for a core point.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Neighbourhood radius in cosine distance.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            min_samples: default_min_samples(),
            epsilon: default_epsilon(),
        }
    }
}

fn default_min_cluster_size() -> usize {
    3
}
fn default_min_samples() -> usize {
    2
}
fn default_epsilon() -> f64 {
    0.35
}

/// `[topics]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Members sampled per cluster when asking for a topic.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Fixed RNG seed for reproducible sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            seed: None,
        }
    }
}

fn default_sample_size() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, handed to the orchestrator's constructor.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Data directory holding `df_storage/`.
    pub data_dir: PathBuf,
    /// URLs per extraction call (at least 1).
    pub chunk_size: usize,
    /// Members sampled per cluster for topic labeling.
    pub topic_sample_size: usize,
    /// RNG seed for topic sampling; entropy-seeded when `None`.
    pub topic_seed: Option<u64>,
}

impl PipelineConfig {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            chunk_size: default_chunk_size(),
            topic_sample_size: default_sample_size(),
            topic_seed: None,
        }
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            data_dir: PathBuf::from(&config.storage.data_dir),
            chunk_size: config.extraction.chunk_size.max(1),
            topic_sample_size: config.topics.sample_size.max(1),
            topic_seed: config.topics.seed,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.linkdigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LinkDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.linkdigest/linkdigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LinkDigestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LinkDigestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LinkDigestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LinkDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LinkDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that every API key env var the configured collaborators need is set.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    let mut required = vec![config.llm.api_key_env.as_str()];
    if config.extraction.provider == ExtractionProvider::Tavily {
        required.push(config.extraction.api_key_env.as_str());
    }

    for var_name in required {
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => {}
            _ => {
                return Err(LinkDigestError::config(format!(
                    "API key not found. Set the {var_name} environment variable."
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("TAVILY_API_KEY"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.extraction.chunk_size, 2);
        assert_eq!(parsed.extraction.provider, ExtractionProvider::Tavily);
        assert_eq!(parsed.topics.sample_size, 5);
        assert_eq!(parsed.clustering.min_cluster_size, 3);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/linkdigest"

[extraction]
provider = "http"
chunk_size = 4

[topics]
seed = 7
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.storage.data_dir, "/tmp/linkdigest");
        assert_eq!(config.extraction.provider, ExtractionProvider::Http);
        assert_eq!(config.extraction.chunk_size, 4);
        assert_eq!(config.extraction.request_timeout_secs, 60);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.topics.seed, Some(7));
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let mut app = AppConfig::default();
        app.extraction.chunk_size = 0;
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.chunk_size, 1);
        assert_eq!(pipeline.topic_sample_size, 5);
        assert_eq!(pipeline.data_dir, PathBuf::from("var/data"));
        assert!(pipeline.topic_seed.is_none());
    }

    #[test]
    fn zero_topic_sample_size_is_clamped() {
        let mut app = AppConfig::default();
        app.topics.sample_size = 0;
        assert_eq!(PipelineConfig::from(&app).topic_sample_size, 1);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Unique env var names to avoid interfering with other tests
        config.llm.api_key_env = "LD_TEST_NONEXISTENT_LLM_KEY_12345".into();
        config.extraction.provider = ExtractionProvider::Http;
        let result = validate_api_keys(&config);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("LD_TEST_NONEXISTENT_LLM_KEY_12345")
        );
    }
}
