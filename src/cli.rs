//! Command-line interface definitions for Press Clipper.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials can also be supplied through environment variables.

use crate::config::Renderer;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Press Clipper application.
///
/// # Examples
///
/// ```sh
/// # Run every task in tasks.yaml and write output.jsonl
/// press_clipper --tasks tasks.yaml --output output.jsonl
///
/// # Filter citations with the LLM before scraping
/// press_clipper --tasks tasks.yaml --relevance-prompts prompts.yaml
///
/// # No browser available: fall back to plain HTTP fetching
/// press_clipper --tasks tasks.yaml --renderer http
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML file listing the search tasks to run
    #[arg(short, long)]
    pub tasks: PathBuf,

    /// JSONL file receiving one record per scraped article
    #[arg(short, long, default_value = "output.jsonl")]
    pub output: PathBuf,

    /// Serper API key
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    pub serper_api_key: Option<String>,

    /// Base URL of the search provider
    #[arg(long, env = "SERPER_URL", default_value = "https://google.serper.dev")]
    pub serper_url: String,

    /// Jurisdiction recorded on citations that have none
    #[arg(long, default_value = "Canada")]
    pub jurisdiction: String,

    /// Maximum number of pages scraped at once
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Pause after each page before starting another, in seconds
    #[arg(long, default_value_t = 2.0)]
    pub delay_secs: f64,

    /// Page navigation timeout, in seconds
    #[arg(long, default_value_t = 30)]
    pub nav_timeout_secs: u64,

    /// Wait after DOM content loads before extracting, in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub settle_ms: u64,

    /// Page rendering engine
    #[arg(long, value_enum, default_value_t = Renderer::Chromium)]
    pub renderer: Renderer,

    /// YAML prompt file; enables LLM relevance filtering before scraping
    #[arg(long)]
    pub relevance_prompts: Option<PathBuf>,

    /// Chat template holding the relevance filter's system prompt
    #[arg(long, default_value = "citation_filter")]
    pub relevance_template: String,

    /// Optional path to the LLM config.yaml file
    #[arg(long)]
    pub llm_config: Option<PathBuf>,
}
