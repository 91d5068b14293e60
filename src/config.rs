//! Run settings and the YAML task file.
//!
//! [`Settings`] is built once from the parsed CLI and passed by reference to
//! every component that needs credentials, limits, or defaults. Task files
//! describe the searches to run; any problem with them is fatal because it
//! invalidates the whole run before work starts.

use crate::cli::Cli;
use crate::models::SourceType;
use crate::search::{DateRange, SearchRequest, split_keywords};
use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Which engine renders pages for text extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Renderer {
    /// Headless Chromium over the DevTools protocol.
    #[default]
    Chromium,
    /// Plain HTTP fetch, no JavaScript.
    Http,
}

/// Limits and timings for the scrape stage.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    /// Maximum number of pages in flight at once.
    pub concurrency: usize,
    /// Politeness pause each task takes before freeing its slot.
    pub per_item_delay: Duration,
    pub nav_timeout: Duration,
    /// Extra wait after DOM content is loaded, for client-rendered pages.
    pub settle_delay: Duration,
    /// Navigation timeout for the title lookup.
    pub title_timeout: Duration,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            per_item_delay: Duration::from_secs(2),
            nav_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(3),
            title_timeout: Duration::from_secs(15),
        }
    }
}

/// Where the relevance filter finds its prompts.
#[derive(Debug, Clone)]
pub struct RelevanceSettings {
    /// YAML file holding the user prompt.
    pub prompts: PathBuf,
    /// Chat template carrying the system prompt.
    pub template: String,
    /// LLM config file; the default config location is used when absent.
    pub llm_config: Option<PathBuf>,
}

/// Immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub serper_api_key: String,
    pub serper_base_url: String,
    /// Jurisdiction assigned to citations that have none.
    pub default_jurisdiction: String,
    pub renderer: Renderer,
    pub scrape: ScrapeSettings,
    pub relevance: Option<RelevanceSettings>,
}

impl Settings {
    /// Validate CLI values and freeze them into settings.
    pub fn from_cli(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let serper_api_key = cli
            .serper_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or("missing search API key (set --serper-api-key or SERPER_API_KEY)")?
            .to_string();

        if cli.concurrency == 0 {
            return Err("--concurrency must be at least 1".into());
        }
        if !cli.delay_secs.is_finite() || cli.delay_secs < 0.0 {
            return Err(format!("--delay-secs must be a non-negative number, got {}", cli.delay_secs).into());
        }

        let relevance = cli.relevance_prompts.as_ref().map(|prompts| RelevanceSettings {
            prompts: prompts.clone(),
            template: cli.relevance_template.clone(),
            llm_config: cli.llm_config.clone(),
        });

        Ok(Self {
            serper_api_key,
            serper_base_url: cli.serper_url.clone(),
            default_jurisdiction: cli.jurisdiction.clone(),
            renderer: cli.renderer,
            scrape: ScrapeSettings {
                concurrency: cli.concurrency,
                per_item_delay: Duration::from_secs_f64(cli.delay_secs),
                nav_timeout: Duration::from_secs(cli.nav_timeout_secs),
                settle_delay: Duration::from_millis(cli.settle_ms),
                ..ScrapeSettings::default()
            },
            relevance,
        })
    }
}

/// Keywords given either as one comma-separated string or as a list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum KeywordSet {
    Csv(String),
    List(Vec<String>),
}

impl Default for KeywordSet {
    fn default() -> Self {
        KeywordSet::List(Vec::new())
    }
}

impl KeywordSet {
    /// Trimmed, non-empty keyword terms.
    pub fn terms(&self) -> Vec<String> {
        match self {
            KeywordSet::Csv(csv) => split_keywords(csv),
            KeywordSet::List(items) => items
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

fn default_country() -> String {
    "ca".to_string()
}

fn default_location() -> String {
    "Canada".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_pages() -> usize {
    1
}

/// One search to run, as written in the task file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeTask {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub keywords: KeywordSet,
    #[serde(default)]
    pub search_type: SourceType,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default)]
    pub exclude_publishers: Vec<String>,
}

impl ScrapeTask {
    pub fn to_request(&self) -> SearchRequest {
        SearchRequest {
            query: self.query.clone(),
            keywords: self.keywords.terms(),
            search_type: self.search_type,
            country: self.country.clone(),
            location: self.location.clone(),
            language: self.language.clone(),
            date_range: self.date_range,
            max_pages: self.max_pages,
            exclude_publishers: self.exclude_publishers.clone(),
        }
    }
}

/// Parse task YAML: either a root list or a mapping with a `tasks` list.
pub fn parse_tasks(yaml: &str) -> Result<Vec<ScrapeTask>, Box<dyn Error>> {
    let doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let list = match doc {
        serde_yaml::Value::Mapping(mut map) => map
            .remove("tasks")
            .ok_or("task file mapping has no `tasks` key")?,
        other => other,
    };

    if !list.is_sequence() {
        return Err("task file must contain a list of tasks (under `tasks` or as the root list)".into());
    }

    let tasks: Vec<ScrapeTask> = serde_yaml::from_value(list)?;
    for (i, task) in tasks.iter().enumerate() {
        if task.query.trim().is_empty() && task.keywords.terms().is_empty() {
            return Err(format!("task #{} has neither a query nor keywords", i + 1).into());
        }
        if task.max_pages == 0 {
            return Err(format!("task #{} has max_pages = 0", i + 1).into());
        }
    }
    debug!(count = tasks.len(), "Parsed tasks");
    Ok(tasks)
}

/// Read and parse a task file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_tasks(path: &Path) -> Result<Vec<ScrapeTask>, Box<dyn Error>> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read task file {}: {e}", path.display()))?;
    let tasks = parse_tasks(&yaml)?;
    info!(count = tasks.len(), "Loaded tasks");
    Ok(tasks)
}
