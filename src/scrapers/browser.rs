//! Browser abstraction shared by every rendering backend.
//!
//! A [`Browser`] is one long-lived session (for Chromium, one OS process)
//! that hands out isolated [`BrowsingContext`]s. Each context is owned by a
//! single scrape task and must be returned through
//! [`Browser::close_context`] on every exit path.

use crate::config::{Renderer, ScrapeSettings};
use crate::scrapers::chromium::{ChromiumBrowser, ChromiumContext};
use crate::scrapers::http::{HttpBrowser, HttpContext};
use futures::FutureExt;
use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::info;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0 Safari/537.36";

/// URL patterns for images, fonts, and stylesheets.
pub const HEAVY_ASSET_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.webp", "*.css", "*.woff", "*.woff2",
];

/// How a browsing context is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub javascript: bool,
    pub bypass_csp: bool,
    /// Wildcard URL patterns whose requests are refused.
    pub blocked_urls: Vec<String>,
}

impl ContextProfile {
    /// Desktop Chrome with heavy assets blocked, used for article extraction.
    pub fn desktop() -> Self {
        Self {
            user_agent: DESKTOP_USER_AGENT.to_string(),
            viewport: (1920, 1080),
            javascript: true,
            bypass_csp: true,
            blocked_urls: HEAVY_ASSET_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A browser session that creates isolated contexts.
pub trait Browser {
    type Context: BrowsingContext;

    async fn new_context(&self, profile: &ContextProfile) -> Result<Self::Context, Box<dyn Error>>;

    /// Tear down a context and everything it opened.
    async fn close_context(&self, context: Self::Context) -> Result<(), Box<dyn Error>>;

    /// Shut the session down. Only called once every context is closed.
    async fn close(self) -> Result<(), Box<dyn Error>>;
}

/// A single page inside an isolated context.
pub trait BrowsingContext {
    /// Load `url` and wait until its DOM content is loaded, failing after `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), Box<dyn Error>>;

    /// Serialized HTML of the current document, including client-rendered content.
    async fn content(&self) -> Result<String, Box<dyn Error>>;

    async fn title(&self) -> Result<Option<String>, Box<dyn Error>>;
}

/// Run work against an open context, turning a panic into an error so the
/// caller still reaches [`Browser::close_context`].
pub async fn catch_panic<T, F>(work: F) -> Result<T, Box<dyn Error>>
where
    F: Future<Output = Result<T, Box<dyn Error>>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err("browsing context panicked".into()),
    }
}

/// The browser selected for this run.
pub enum Session {
    Chromium(ChromiumBrowser),
    Http(HttpBrowser),
}

pub enum SessionContext {
    Chromium(ChromiumContext),
    Http(HttpContext),
}

impl Session {
    /// Start the configured renderer.
    pub async fn launch(renderer: Renderer, settings: &ScrapeSettings) -> Result<Self, Box<dyn Error>> {
        let session = match renderer {
            Renderer::Chromium => Session::Chromium(ChromiumBrowser::launch(settings).await?),
            Renderer::Http => Session::Http(HttpBrowser::new(settings)?),
        };
        info!(?renderer, "Browser session started");
        Ok(session)
    }
}

impl Browser for Session {
    type Context = SessionContext;

    async fn new_context(&self, profile: &ContextProfile) -> Result<SessionContext, Box<dyn Error>> {
        Ok(match self {
            Session::Chromium(b) => SessionContext::Chromium(b.new_context(profile).await?),
            Session::Http(b) => SessionContext::Http(b.new_context(profile).await?),
        })
    }

    async fn close_context(&self, context: SessionContext) -> Result<(), Box<dyn Error>> {
        match (self, context) {
            (Session::Chromium(b), SessionContext::Chromium(c)) => b.close_context(c).await,
            (Session::Http(b), SessionContext::Http(c)) => b.close_context(c).await,
            _ => Err("browsing context belongs to a different renderer".into()),
        }
    }

    async fn close(self) -> Result<(), Box<dyn Error>> {
        match self {
            Session::Chromium(b) => b.close().await,
            Session::Http(b) => b.close().await,
        }
    }
}

impl BrowsingContext for SessionContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), Box<dyn Error>> {
        match self {
            SessionContext::Chromium(c) => c.navigate(url, timeout).await,
            SessionContext::Http(c) => c.navigate(url, timeout).await,
        }
    }

    async fn content(&self) -> Result<String, Box<dyn Error>> {
        match self {
            SessionContext::Chromium(c) => c.content().await,
            SessionContext::Http(c) => c.content().await,
        }
    }

    async fn title(&self) -> Result<Option<String>, Box<dyn Error>> {
        match self {
            SessionContext::Chromium(c) => c.title().await,
            SessionContext::Http(c) => c.title().await,
        }
    }
}
