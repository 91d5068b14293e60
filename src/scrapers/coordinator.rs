//! Bounded concurrent scraping of a citation batch.
//!
//! All tasks are futures polled by a single `buffer_unordered` stream in the
//! caller's task, so at most `concurrency` pages are in flight. They share
//! one browser session by reference and each opens its own contexts.

use crate::config::ScrapeSettings;
use crate::models::{Citation, MediaType, ScrapeResult};
use crate::scrapers::browser::{Browser, BrowsingContext, catch_panic};
use crate::scrapers::chunk::chunk_paragraphs;
use crate::scrapers::extract::ContentExtractor;
use crate::utils::{publisher_from_url, word_count};
use chrono::Utc;
use futures::FutureExt;
use futures::future;
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Extracted text shorter than this is not worth keeping.
pub const MIN_CONTENT_CHARS: usize = 400;

/// Tracks how many scrape tasks are running and the most seen at once.
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

pub struct InFlightGuard<'a>(&'a InFlightGauge);

impl InFlightGauge {
    pub fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scrapes citations with a bounded number of pages in flight.
pub struct ScrapeCoordinator {
    extractor: ContentExtractor,
    concurrency: usize,
    per_item_delay: Duration,
    title_timeout: Duration,
    default_jurisdiction: String,
    gauge: InFlightGauge,
}

impl ScrapeCoordinator {
    pub fn new(settings: &ScrapeSettings, default_jurisdiction: &str) -> Self {
        Self {
            extractor: ContentExtractor::new(settings),
            concurrency: settings.concurrency.max(1),
            per_item_delay: settings.per_item_delay,
            title_timeout: settings.title_timeout,
            default_jurisdiction: default_jurisdiction.to_string(),
            gauge: InFlightGauge::default(),
        }
    }

    /// Most scrape tasks ever running at once on this coordinator.
    pub fn peak_in_flight(&self) -> usize {
        self.gauge.peak()
    }

    /// Scrape every text citation with a URL and return the successes in
    /// completion order.
    ///
    /// The browser is closed once every task has finished, including when
    /// there is nothing to scrape. Input citations are never modified.
    #[instrument(level = "info", skip_all, fields(citations = citations.len()))]
    pub async fn scrape<B: Browser>(&self, browser: B, citations: &[Citation]) -> Vec<ScrapeResult> {
        let started = Instant::now();
        let eligible: Vec<&Citation> = citations.iter().filter(|c| c.is_scrapable()).collect();
        let skipped = citations.len() - eligible.len();

        let results: Vec<ScrapeResult> = if eligible.is_empty() {
            info!(skipped, "No citations eligible for scraping");
            Vec::new()
        } else {
            let browser = &browser;
            stream::iter(eligible)
                .map(|citation| self.run_task(browser, citation))
                .buffer_unordered(self.concurrency)
                .filter_map(future::ready)
                .collect()
                .await
        };

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser shutdown failed");
        }

        info!(
            scraped = results.len(),
            skipped,
            peak_in_flight = self.peak_in_flight(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scrape batch finished"
        );
        results
    }

    /// Hold a concurrency slot for one citation, including the politeness delay.
    async fn run_task<B: Browser>(&self, browser: &B, citation: &Citation) -> Option<ScrapeResult> {
        let _slot = self.gauge.enter();

        let result = match AssertUnwindSafe(self.scrape_one(browser, citation))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(citation_id = %citation.citation_id, url = %citation.url, "Scrape task panicked");
                None
            }
        };

        sleep(self.per_item_delay).await;
        result
    }

    #[instrument(level = "debug", skip_all, fields(citation_id = %citation.citation_id))]
    async fn scrape_one<B: Browser>(&self, browser: &B, citation: &Citation) -> Option<ScrapeResult> {
        let text = self.extractor.extract(browser, &citation.url).await?;

        let chars = text.chars().count();
        if chars < MIN_CONTENT_CHARS {
            debug!(url = %citation.url, chars, "Extracted text too short; dropping");
            return None;
        }

        let mut scraped = citation.clone();
        if scraped.needs_title() {
            if let Some(title) = self.lookup_title(browser, &scraped.url).await {
                scraped.title = Some(title);
            }
        }
        self.enrich(&mut scraped, &text);

        let chunks = chunk_paragraphs(&scraped.citation_id, &text);
        debug!(url = %scraped.url, chars, chunks = chunks.len(), "Scraped citation");
        Some(ScrapeResult {
            citation: scraped,
            chunks,
        })
    }

    /// Page title from a short second visit; failures leave the title alone.
    async fn lookup_title<B: Browser>(&self, browser: &B, url: &str) -> Option<String> {
        let mut context = match browser.new_context(self.extractor.profile()).await {
            Ok(context) => context,
            Err(e) => {
                debug!(error = %e, %url, "Title lookup could not open a context");
                return None;
            }
        };

        let title = catch_panic(read_title(&mut context, url, self.title_timeout)).await;
        if let Err(e) = browser.close_context(context).await {
            debug!(error = %e, %url, "Closing title context failed");
        }

        match title {
            Ok(title) => title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(e) => {
                debug!(error = %e, %url, "Title lookup failed");
                None
            }
        }
    }

    fn enrich(&self, citation: &mut Citation, text: &str) {
        citation.media_type = MediaType::Text;

        if citation.publisher.as_deref().is_none_or(|p| p.trim().is_empty()) {
            citation.publisher = publisher_from_url(&citation.url);
        }

        citation.access_date = Utc::now();

        if citation.jurisdiction.as_deref().is_none_or(|j| j.trim().is_empty()) {
            citation.jurisdiction = Some(self.default_jurisdiction.clone());
        }

        let mut metadata = citation.metadata.take().unwrap_or_default();
        metadata.full_text_scraped = Some(true);
        metadata.scraped_word_count = Some(word_count(text));
        citation.metadata = Some(metadata);
    }
}

async fn read_title<C: BrowsingContext>(
    context: &mut C,
    url: &str,
    timeout: Duration,
) -> Result<Option<String>, Box<dyn Error>> {
    context.navigate(url, timeout).await?;
    context.title().await
}
