//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use linkdigest_core::{Collaborators, Pipeline, ProgressReporter, RunOutcome, RunReport, RunState};
use linkdigest_providers::{
    DensityClusterer, Extractor, OpenAiClient, PageExtractor, TavilyExtractor,
};
use linkdigest_shared::{
    AppConfig, ExtractionProvider, LinkDigestError, PipelineConfig, Stage, init_config,
    load_config, load_config_from, validate_api_keys,
};
use linkdigest_storage::{Storage, Table};
use rand::seq::SliceRandom;
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LinkDigest: summarize, embed and cluster the pages behind your links.
#[derive(Parser)]
#[command(
    name = "linkdigest",
    version,
    about = "Incrementally enrich URLs with page text, summaries, embeddings and topic clusters.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.linkdigest/linkdigest.toml).
    #[arg(long, global = true, env = "LINKDIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory override (stores live in <data-dir>/df_storage).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest new URLs: extract, summarize, embed, cluster and merge.
    Run {
        /// URLs to ingest.
        urls: Vec<String>,

        /// Text file with one URL per line (blank lines and # comments ignored).
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show row counts of every store.
    Status,

    /// Look up merged records by URL and/or cluster label.
    Query {
        /// Exact URL to match.
        #[arg(long)]
        url: Option<String>,

        /// Cluster label to match (-1 for noise).
        #[arg(long, allow_negative_numbers = true)]
        label: Option<i32>,

        /// Print records as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Print one random clustered URL with its topic.
    Recommend,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "linkdigest=info",
        1 => "linkdigest=debug",
        _ => "linkdigest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let data_dir = cli.data_dir.as_deref();

    match cli.command {
        Command::Run { urls, file } => {
            cmd_run(config_path, data_dir, &urls, file.as_deref()).await
        }
        Command::Status => cmd_status(config_path, data_dir),
        Command::Query { url, label, json } => {
            cmd_query(config_path, data_dir, url.as_deref(), label, json)
        }
        Command::Recommend => cmd_recommend(config_path, data_dir),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path, data_dir),
        },
    }
}

/// Load the config file (explicit path or default) and apply flag overrides.
fn resolve_config(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<AppConfig> {
    let mut config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir.to_string_lossy().into_owned();
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    data_dir: Option<&Path>,
    inline: &[String],
    file: Option<&Path>,
) -> Result<()> {
    let config = resolve_config(config_path, data_dir)?;
    let urls = collect_urls(inline, file)?;
    if urls.is_empty() {
        return Err(eyre!("no URLs given: pass them as arguments or with --file"));
    }

    validate_api_keys(&config)?;
    let collaborators = build_collaborators(&config)?;
    let pipeline = Pipeline::new(PipelineConfig::from(&config), collaborators)?;

    info!(
        urls = urls.len(),
        data_dir = %config.storage.data_dir,
        "ingesting URLs"
    );

    let reporter = CliProgress::new();
    let report = match pipeline.run(&urls, &reporter).await {
        Ok(report) => report,
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    print_report(&report);
    Ok(())
}

/// Gather URLs from arguments and an optional list file, in that order.
pub(crate) fn collect_urls(
    inline: &[String],
    file: Option<&Path>,
) -> linkdigest_shared::Result<Vec<String>> {
    let mut urls: Vec<String> = inline.iter().map(|u| u.trim().to_string()).collect();

    if let Some(path) = file {
        let content = std::fs::read_to_string(path).map_err(|e| LinkDigestError::io(path, e))?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    for url in &urls {
        let parsed = Url::parse(url)
            .map_err(|e| LinkDigestError::validation(format!("invalid URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LinkDigestError::validation(format!(
                "unsupported URL scheme in '{url}': expected http or https"
            )));
        }
    }

    Ok(urls)
}

/// Wire concrete collaborators from config. API keys come from the env vars
/// the config names.
fn build_collaborators(config: &AppConfig) -> Result<Collaborators> {
    let extractor: Box<dyn Extractor> = match config.extraction.provider {
        ExtractionProvider::Tavily => Box::new(TavilyExtractor::new(
            api_key(&config.extraction.api_key_env)?,
            &config.extraction,
        )?),
        ExtractionProvider::Http => Box::new(PageExtractor::new(&config.extraction)?),
    };

    let llm_key = api_key(&config.llm.api_key_env)?;
    let summarizer = OpenAiClient::new(llm_key.clone(), &config.llm, &config.embedding)?;
    let embedder = OpenAiClient::new(llm_key, &config.llm, &config.embedding)?;

    Ok(Collaborators {
        extractor,
        summarizer: Box::new(summarizer),
        embedder: Box::new(embedder),
        clusterer: Box::new(DensityClusterer::from(&config.clustering)),
    })
}

fn api_key(var_name: &str) -> Result<String> {
    std::env::var(var_name).map_err(|_| eyre!("{var_name} is not set"))
}

fn print_report(report: &RunReport) {
    println!();
    match report.outcome {
        RunOutcome::NothingNew => {
            println!("  Nothing new: all {} URL(s) were already ingested.", report.requested);
        }
        RunOutcome::Completed => {
            println!("  Run complete!");
            println!("  Run:        {}", report.run_id);
            println!("  Requested:  {}", report.requested);
            println!("  New:        {}", report.new_urls);
            println!("  Extracted:  {}", report.extracted);
            println!("  Summarized: {}", report.summarized);
            println!("  Embedded:   {}", report.embedded);
            println!("  Clustered:  {}", report.clustered);
            println!("  Merged:     {}", report.merged);
            if !report.failures.is_empty() {
                println!("  Failures:   {}", report.failures.len());
                for failure in &report.failures {
                    println!(
                        "    - [{}] {}: {}",
                        failure.stage,
                        failure.key.as_deref().unwrap_or("-"),
                        failure.message
                    );
                }
            }
        }
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn state(&self, state: RunState) {
        self.spinner.set_message(state.description());
    }

    fn item_progress(&self, stage: Stage, current: usize, total: usize) {
        self.spinner
            .set_message(format!("{stage} [{current}/{total}]"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Inspection commands (read-only)
// ---------------------------------------------------------------------------

fn open_readonly(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<Storage> {
    let config = resolve_config(config_path, data_dir)?;
    Ok(Storage::open_readonly(Path::new(&config.storage.data_dir))?)
}

fn cmd_status(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<()> {
    let storage = open_readonly(config_path, data_dir)?;
    let counts = storage.counts()?;

    println!("  Stores in {}", storage.root().display());
    for (table, rows) in &counts.0 {
        println!("  {:<10} {:>7}  ({})", table.name(), rows, table.file_name());
    }
    Ok(())
}

fn cmd_query(
    config_path: Option<&Path>,
    data_dir: Option<&Path>,
    url: Option<&str>,
    label: Option<i32>,
    json: bool,
) -> Result<()> {
    let storage = open_readonly(config_path, data_dir)?;
    let records = storage.query_merged(url, label)?;

    if records.is_empty() {
        println!("no matching records");
        return Ok(());
    }

    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!("{}", record.url);
            println!("  label: {}  topic: {}", record.label, display_topic(&record.topic));
            println!("  {}", record.summary);
        }
    }
    Ok(())
}

fn cmd_recommend(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<()> {
    let storage = open_readonly(config_path, data_dir)?;
    let clusters = storage.load_clusters()?;

    match clusters.records().choose(&mut rand::thread_rng()) {
        Some(pick) => println!("{}  [{}]", pick.url, display_topic(&pick.topic)),
        None => println!(
            "nothing ingested yet ({} is empty)",
            storage.path(Table::Clusters).display()
        ),
    }
    Ok(())
}

fn display_topic(topic: &str) -> &str {
    if topic.is_empty() { "(untitled)" } else { topic }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path, data_dir)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_file(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ld_test_{}.txt", Uuid::now_v7()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn collects_inline_then_file_urls() {
        let file = temp_file("# reading list\nhttps://b.example\n\n  https://c.example  \n");
        let urls = collect_urls(&["https://a.example".into()], Some(&file)).unwrap();
        assert_eq!(
            urls,
            vec!["https://a.example", "https://b.example", "https://c.example"]
        );
    }

    #[test]
    fn missing_url_file_is_an_error() {
        let missing = std::env::temp_dir().join(format!("ld_test_{}.txt", Uuid::now_v7()));
        let err = collect_urls(&[], Some(&missing)).unwrap_err();
        assert!(matches!(err, LinkDigestError::Io { .. }));
    }

    #[test]
    fn invalid_urls_are_rejected() {
        assert!(collect_urls(&["not a url".into()], None).is_err());
        assert!(collect_urls(&["ftp://files.example/x".into()], None).is_err());
    }

    #[test]
    fn query_accepts_noise_label() {
        let cli = Cli::try_parse_from(["linkdigest", "query", "--label", "-1"]).unwrap();
        match cli.command {
            Command::Query { label, url, json } => {
                assert_eq!(label, Some(-1));
                assert!(url.is_none());
                assert!(!json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn data_dir_flag_overrides_config() {
        let config_file = temp_file("[storage]\ndata_dir = \"from-file\"\n");
        let config = resolve_config(Some(&config_file), Some(Path::new("/tmp/override"))).unwrap();
        assert_eq!(config.storage.data_dir, "/tmp/override");

        let config = resolve_config(Some(&config_file), None).unwrap();
        assert_eq!(config.storage.data_dir, "from-file");
    }
}
