//! Headless Chromium backend driven over the DevTools protocol.
//!
//! One Chromium process is launched per session. Every browsing context is
//! a separate CDP browser context (its own cookies and cache) holding one
//! page, configured from a [`ContextProfile`] before navigation.

use crate::config::ScrapeSettings;
use crate::scrapers::browser::{Browser, BrowsingContext, ContextProfile};
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetScriptExecutionDisabledParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{NavigateParams, SetBypassCspParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use futures::StreamExt;
use std::error::Error;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout as with_timeout};
use tracing::{debug, info, instrument, warn};

/// How often `document.readyState` is polled while a page loads.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// True once the new document has left the `loading` state.
const DOM_READY_SCRIPT: &str =
    "document.location.href !== 'about:blank' && document.readyState !== 'loading'";

/// A running Chromium process and its CDP event loop.
pub struct ChromiumBrowser {
    browser: CdpBrowser,
    handler: JoinHandle<()>,
}

/// One isolated CDP browser context with a single page.
pub struct ChromiumContext {
    page: Page,
    context_id: BrowserContextId,
}

impl ChromiumBrowser {
    #[instrument(level = "info", skip_all)]
    pub async fn launch(settings: &ScrapeSettings) -> Result<Self, Box<dyn Error>> {
        let (width, height) = ContextProfile::desktop().viewport;
        let config = BrowserConfig::builder()
            .window_size(width, height)
            .request_timeout(settings.nav_timeout)
            .build()?;

        let (browser, mut handler) = CdpBrowser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler error");
                }
            }
        });

        info!("Launched headless Chromium");
        Ok(Self { browser, handler })
    }

    async fn configure_page(&self, page: &Page, profile: &ContextProfile) -> Result<(), Box<dyn Error>> {
        let (width, height) = profile.viewport;
        page.execute(SetUserAgentOverrideParams::new(profile.user_agent.clone()))
            .await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(width),
            i64::from(height),
            1.0,
            false,
        ))
        .await?;
        page.execute(SetBypassCspParams::new(profile.bypass_csp)).await?;
        if !profile.javascript {
            page.execute(SetScriptExecutionDisabledParams::new(true)).await?;
        }
        if !profile.blocked_urls.is_empty() {
            page.execute(NetworkEnableParams::default()).await?;
            page.execute(SetBlockedUrLsParams::new(profile.blocked_urls.clone()))
                .await?;
        }
        Ok(())
    }

    async fn dispose(&self, context_id: BrowserContextId) -> Result<(), Box<dyn Error>> {
        self.browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await?;
        Ok(())
    }
}

impl Browser for ChromiumBrowser {
    type Context = ChromiumContext;

    async fn new_context(&self, profile: &ContextProfile) -> Result<ChromiumContext, Box<dyn Error>> {
        let created = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        let context_id = created.result.browser_context_id.clone();

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()?;
        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                let _ = self.dispose(context_id).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.configure_page(&page, profile).await {
            let _ = page.close().await;
            let _ = self.dispose(context_id).await;
            return Err(e);
        }

        Ok(ChromiumContext { page, context_id })
    }

    async fn close_context(&self, context: ChromiumContext) -> Result<(), Box<dyn Error>> {
        let ChromiumContext { page, context_id } = context;
        if let Err(e) = page.close().await {
            debug!(error = %e, "Page close failed; disposing context anyway");
        }
        self.dispose(context_id).await
    }

    async fn close(mut self) -> Result<(), Box<dyn Error>> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Chromium did not close cleanly");
        }
        let _ = self.browser.wait().await;
        let _ = self.handler.await;
        info!("Chromium closed");
        Ok(())
    }
}

impl BrowsingContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), Box<dyn Error>> {
        match with_timeout(timeout, load_dom(&self.page, url)).await {
            Ok(result) => result,
            Err(_) => Err(format!("navigation timed out after {timeout:?}").into()),
        }
    }

    async fn content(&self) -> Result<String, Box<dyn Error>> {
        Ok(self.page.content().await?)
    }

    async fn title(&self) -> Result<Option<String>, Box<dyn Error>> {
        Ok(self.page.get_title().await?)
    }
}

/// Start navigation, then poll until DOM content has loaded.
async fn load_dom(page: &Page, url: &str) -> Result<(), Box<dyn Error>> {
    let nav = page.execute(NavigateParams::new(url)).await?;
    if let Some(error_text) = nav.result.error_text.as_deref() {
        return Err(format!("navigation failed: {error_text}").into());
    }
    loop {
        let ready: bool = page.evaluate(DOM_READY_SCRIPT).await?.into_value()?;
        if ready {
            return Ok(());
        }
        sleep(READY_POLL_INTERVAL).await;
    }
}
