//! In-memory browser used by the scraper tests.

use crate::scrapers::browser::{Browser, BrowsingContext, ContextProfile};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Article markup with `paragraphs` long paragraphs.
pub fn article_html(paragraphs: usize) -> String {
    let body = (1..=paragraphs)
        .map(|i| {
            format!(
                "<p>Paragraph {i}: officials confirmed the new measures would take effect next month across every province.</p>"
            )
        })
        .collect::<String>();
    format!("<html><head><title>Rendered title</title></head><body><nav>Menu</nav><article>{body}</article></body></html>")
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    html: Option<String>,
    title: Option<String>,
    panics: bool,
}

impl FakePage {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            title: None,
            panics: false,
        }
    }

    /// A page whose navigation fails.
    pub fn failing() -> Self {
        Self::default()
    }

    /// A page whose navigation panics.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// Counters shared between a [`FakeBrowser`] and the test observing it.
#[derive(Debug, Default)]
pub struct BrowserStats {
    opened: AtomicUsize,
    closed_contexts: AtomicUsize,
    navigations: AtomicUsize,
    closed: AtomicBool,
}

impl BrowserStats {
    pub fn contexts_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.closed_contexts.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn browser_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct FakeBrowser {
    pages: Arc<HashMap<String, FakePage>>,
    latency: Duration,
    stats: Arc<BrowserStats>,
}

pub struct FakeContext {
    pages: Arc<HashMap<String, FakePage>>,
    latency: Duration,
    stats: Arc<BrowserStats>,
    current: Option<FakePage>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.to_string(), page);
        self
    }

    /// Time every navigation takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn stats(&self) -> Arc<BrowserStats> {
        Arc::clone(&self.stats)
    }
}

impl Browser for FakeBrowser {
    type Context = FakeContext;

    async fn new_context(&self, _profile: &ContextProfile) -> Result<FakeContext, Box<dyn Error>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeContext {
            pages: Arc::clone(&self.pages),
            latency: self.latency,
            stats: Arc::clone(&self.stats),
            current: None,
        })
    }

    async fn close_context(&self, _context: FakeContext) -> Result<(), Box<dyn Error>> {
        self.stats.closed_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self) -> Result<(), Box<dyn Error>> {
        self.stats.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl BrowsingContext for FakeContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), Box<dyn Error>> {
        self.stats.navigations.fetch_add(1, Ordering::SeqCst);
        if self.latency > timeout {
            sleep(timeout).await;
            return Err(format!("navigation timed out after {timeout:?}").into());
        }
        sleep(self.latency).await;

        let page = self.pages.get(url).ok_or("net::ERR_NAME_NOT_RESOLVED")?;
        if page.panics {
            panic!("renderer crashed on {url}");
        }
        if page.html.is_none() {
            return Err("net::ERR_CONNECTION_RESET".into());
        }
        self.current = Some(page.clone());
        Ok(())
    }

    async fn content(&self) -> Result<String, Box<dyn Error>> {
        self.current
            .as_ref()
            .and_then(|page| page.html.clone())
            .ok_or_else(|| "no page has been loaded".into())
    }

    async fn title(&self) -> Result<Option<String>, Box<dyn Error>> {
        Ok(self.current.as_ref().and_then(|page| page.title.clone()))
    }
}
