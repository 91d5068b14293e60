//! Plain HTTP rendering backend.
//!
//! Fetches the server-rendered HTML with `reqwest`; no JavaScript runs, so
//! client-rendered articles come back empty. Useful where no Chromium binary
//! is available.

use crate::config::ScrapeSettings;
use crate::scrapers::browser::{Browser, BrowsingContext, ContextProfile};
use once_cell::sync::Lazy;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use std::error::Error;
use std::time::Duration;
use tokio::time::timeout as with_timeout;
use tracing::debug;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// Shared HTTP client standing in for a browser session.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    client: reqwest::Client,
}

/// The last document fetched in a context.
#[derive(Debug)]
pub struct HttpContext {
    client: reqwest::Client,
    user_agent: String,
    html: Option<String>,
}

impl HttpBrowser {
    pub fn new(settings: &ScrapeSettings) -> Result<Self, Box<dyn Error>> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.nav_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Browser for HttpBrowser {
    type Context = HttpContext;

    async fn new_context(&self, profile: &ContextProfile) -> Result<HttpContext, Box<dyn Error>> {
        Ok(HttpContext {
            client: self.client.clone(),
            user_agent: profile.user_agent.clone(),
            html: None,
        })
    }

    async fn close_context(&self, _context: HttpContext) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    async fn close(self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}

impl HttpContext {
    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}").into());
        }
        Ok(response.text().await?)
    }
}

impl BrowsingContext for HttpContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), Box<dyn Error>> {
        let html = match with_timeout(timeout, self.fetch(url)).await {
            Ok(result) => result?,
            Err(_) => return Err(format!("navigation timed out after {timeout:?}").into()),
        };
        debug!(%url, bytes = html.len(), "Fetched page");
        self.html = Some(html);
        Ok(())
    }

    async fn content(&self) -> Result<String, Box<dyn Error>> {
        self.html
            .clone()
            .ok_or_else(|| "no page has been loaded".into())
    }

    async fn title(&self) -> Result<Option<String>, Box<dyn Error>> {
        Ok(self.html.as_deref().and_then(document_title))
    }
}

/// Text of the document's `<title>`, trimmed; `None` when missing or blank.
pub fn document_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE)
        .next()?
        .text()
        .collect::<String>();
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_title() {
        assert_eq!(
            document_title("<html><head><title>  Budget tabled  </title></head></html>"),
            Some("Budget tabled".to_string())
        );
        assert_eq!(document_title("<html><head><title> </title></head></html>"), None);
        assert_eq!(document_title("<p>no title</p>"), None);
    }

    #[tokio::test]
    async fn test_content_before_navigation_is_an_error() {
        let browser = HttpBrowser::new(&ScrapeSettings::default()).unwrap();
        let context = browser.new_context(&ContextProfile::desktop()).await.unwrap();
        assert!(context.content().await.is_err());
        assert_eq!(context.title().await.unwrap(), None);
        browser.close_context(context).await.unwrap();
    }
}
