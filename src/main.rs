//! # Press Clipper
//!
//! A news clipping pipeline that runs keyword searches against a
//! Serper-compatible provider, turns the hits into citations, optionally
//! filters them for relevance with an LLM, and extracts the full text of each
//! article with a headless browser.
//!
//! ## Features
//!
//! - Web, news, and video searches with keyword OR-clauses, recency windows,
//!   and pagination
//! - Normalized publication dates (absolute and relative, e.g. "3 hours ago")
//! - Optional LLM relevance filter (feature `relevance`)
//! - Bounded concurrent scraping with per-page politeness delays
//! - Paragraph chunks with character offsets, written as JSON Lines
//!
//! ## Usage
//!
//! ```sh
//! SERPER_API_KEY=... press_clipper -t tasks.yaml -o output.jsonl
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture, once per task:
//! 1. **Search**: Query the provider page by page and build citations
//! 2. **Filtering**: Ask the LLM which citations are relevant (optional)
//! 3. **Scraping**: Render and extract article text, `--concurrency` at a time
//! 4. **Output**: Append the task's results to the JSONL file

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod citations;
mod cli;
mod config;
mod dates;
mod models;
mod outputs;
mod relevance;
mod scrapers;
mod search;
mod utils;

use cli::Cli;
use config::{Settings, load_tasks};
use outputs::jsonl::JsonlSink;
use scrapers::browser::Session;
use scrapers::coordinator::ScrapeCoordinator;
use search::{QueryAggregator, SerperClient};

#[cfg(feature = "relevance")]
use relevance::RelevanceFilter;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("press_clipper starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(tasks = %args.tasks.display(), output = %args.output.display(), "Parsed CLI arguments");

    // ---- Configuration: every problem here is fatal ----
    let settings = Settings::from_cli(&args)?;
    let tasks = load_tasks(&args.tasks)?;

    #[cfg(feature = "relevance")]
    let relevance = match &settings.relevance {
        Some(relevance_settings) => Some(RelevanceFilter::load(relevance_settings).await?),
        None => None,
    };
    if cfg!(not(feature = "relevance")) && settings.relevance.is_some() {
        warn!("Built without the `relevance` feature; relevance prompts are ignored");
    }

    let mut sink = JsonlSink::create(&args.output).await?;
    let search = QueryAggregator::new(SerperClient::new(&settings)?);
    let coordinator = ScrapeCoordinator::new(&settings.scrape, &settings.default_jurisdiction);

    // ---- Run tasks in order ----
    let total_tasks = tasks.len();
    for (i, task) in tasks.iter().enumerate() {
        let request = task.to_request();
        info!(
            task = i + 1,
            total = total_tasks,
            query = %request.query,
            keywords = ?request.keywords,
            search_type = %request.search_type,
            "Running task"
        );

        let citations = search.search(&request, Utc::now()).await;
        info!(task = i + 1, count = citations.len(), "Built citations");

        #[cfg(feature = "relevance")]
        let citations = match &relevance {
            Some(filter) => match filter.filter(citations).await {
                Ok(kept) => kept,
                Err(e) => {
                    error!(task = i + 1, error = %e, "Relevance filter failed; skipping task");
                    continue;
                }
            },
            None => citations,
        };

        if !citations.iter().any(|c| c.is_scrapable()) {
            info!(task = i + 1, "Nothing to scrape");
            continue;
        }

        let browser = match Session::launch(settings.renderer, &settings.scrape).await {
            Ok(browser) => browser,
            Err(e) => {
                error!(task = i + 1, error = %e, "Browser failed to start; skipping task");
                continue;
            }
        };
        let results = coordinator.scrape(browser, &citations).await;

        if let Err(e) = sink.write_batch(&results).await {
            error!(task = i + 1, error = %e, "Failed to write results");
            return Err(e);
        }
    }

    if sink.written() == 0 {
        warn!("No articles were scraped");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        articles = sink.written(),
        "Execution complete"
    );

    Ok(())
}
