//! Playwright-backed page driver.
//!
//! One [`BrowserSession`] per run; every site and tool gets a fresh browsing context from
//! [`PageFactory::open_page`]. Without the `browser` feature the session cannot be launched.

use async_trait::async_trait;
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use playwright::api::{
    page::Event as PageEvent, Browser, BrowserContext, DocumentLoadState, Page, Viewport as PwViewport,
};
#[cfg(feature = "browser")]
use playwright::Playwright;
#[cfg(feature = "browser")]
use std::collections::BTreeMap;
use std::path::Path;
#[cfg(feature = "browser")]
use std::time::Duration;
#[cfg(feature = "browser")]
use tracing::{debug, warn};

use super::page::{
    ContextOptions, PageDriver, PageFactory, RawImage, RawProduct, ScreenshotTarget, TimedNetworkEvent, WaitUntil,
};
#[cfg(feature = "browser")]
use super::page::NetworkEvent;
#[cfg(feature = "browser")]
use super::script;
use crate::config::{BrowserConfig, PaginationConfig, SelectorSet};
use crate::error::{ScrapeError, ScrapeResult};

#[cfg(feature = "browser")]
fn browser_err<E: std::fmt::Display>(err: E) -> ScrapeError {
    ScrapeError::browser(err.to_string())
}

/// A launched headless Chromium
#[cfg(feature = "browser")]
pub struct BrowserSession {
    config: BrowserConfig,
    // Keeps the driver process alive as long as the browser
    _playwright: Playwright,
    browser: Browser,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    /// Start the playwright driver and launch Chromium
    pub async fn launch(config: &BrowserConfig) -> ScrapeResult<Self> {
        debug!("Initializing playwright");
        let playwright = Playwright::initialize()
            .await
            .map_err(|e| ScrapeError::BrowserUnavailable { message: e.to_string() })?;
        playwright
            .prepare()
            .map_err(|e| ScrapeError::BrowserUnavailable { message: e.to_string() })?;

        let browser = playwright
            .chromium()
            .launcher()
            .headless(config.headless)
            .launch()
            .await
            .map_err(|e| ScrapeError::BrowserUnavailable { message: e.to_string() })?;

        debug!("Chromium launched (headless: {})", config.headless);
        Ok(Self {
            config: config.clone(),
            _playwright: playwright,
            browser,
        })
    }

    pub async fn close(self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait(?Send)]
impl PageFactory for BrowserSession {
    type Page = PlaywrightPage;

    async fn open_page(&self, options: &ContextOptions) -> ScrapeResult<PlaywrightPage> {
        let user_agent = options.user_agent.clone().or_else(|| self.config.user_agent.clone());
        let viewport = options.viewport.or(self.config.viewport);

        let mut builder = self.browser.context_builder();
        if let Some(agent) = user_agent.as_deref() {
            builder = builder.user_agent(agent);
        }
        if let Some(viewport) = viewport {
            builder = builder.viewport(Some(PwViewport {
                width: viewport.width as i32,
                height: viewport.height as i32,
            }));
        }
        if let Some(scale) = options.device_scale_factor {
            builder = builder.device_scale_factor(scale);
        }
        if options.is_mobile {
            builder = builder.is_mobile(true);
        }
        if options.has_touch {
            builder = builder.has_touch(true);
        }

        let context = builder.build().await.map_err(browser_err)?;
        let page = context.new_page().await.map_err(browser_err)?;
        page.set_default_timeout(self.config.navigation_timeout_ms as u32)
            .await
            .map_err(browser_err)?;

        Ok(PlaywrightPage { context, page })
    }
}

/// A page in its own browsing context
#[cfg(feature = "browser")]
pub struct PlaywrightPage {
    context: BrowserContext,
    page: Page,
}

#[cfg(feature = "browser")]
impl PlaywrightPage {
    async fn evaluate_value(&self, script: &str) -> ScrapeResult<serde_json::Value> {
        self.page
            .evaluate::<(), serde_json::Value>(script, ())
            .await
            .map_err(|e| ScrapeError::scraping(format!("page script failed: {}", e)))
    }

    async fn response_event(&self, response: playwright::api::Response) -> Option<NetworkEvent> {
        let url = response.url().ok()?;
        let status = response.status().ok().map(|s| s as u16).unwrap_or(0);
        let status_text = response.status_text().ok().unwrap_or_default();
        let resource_type = response.request().resource_type().ok().unwrap_or_default();
        let headers: BTreeMap<String, String> = response
            .headers()
            .await
            .map(|headers| {
                headers
                    .into_iter()
                    .map(|header| (header.name.to_lowercase(), header.value))
                    .collect()
            })
            .unwrap_or_default();
        let content_type = headers.get("content-type").cloned();

        // Bodies only for script-initiated traffic
        let body = if matches!(resource_type.as_str(), "xhr" | "fetch") {
            response.body().await.ok()
        } else {
            None
        };

        Some(NetworkEvent::Response { url, status, status_text, headers, content_type, body })
    }
}

#[cfg(feature = "browser")]
fn load_state(wait_until: WaitUntil) -> DocumentLoadState {
    match wait_until {
        WaitUntil::Load => DocumentLoadState::Load,
        WaitUntil::DomContentLoaded => DocumentLoadState::DomContentLoaded,
        WaitUntil::NetworkIdle => DocumentLoadState::NetworkIdle,
    }
}

#[cfg(feature = "browser")]
#[async_trait(?Send)]
impl PageDriver for PlaywrightPage {
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout_ms: u64) -> ScrapeResult<Option<u16>> {
        let response = self
            .page
            .goto_builder(url)
            .wait_until(load_state(wait_until))
            .timeout(timeout_ms as f64)
            .goto()
            .await
            .map_err(|e| ScrapeError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(response.and_then(|r| r.status().ok()).map(|s| s as u16))
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> ScrapeResult<bool> {
        match self
            .page
            .wait_for_selector_builder(selector)
            .timeout(timeout_ms as f64)
            .wait_for_selector()
            .await
        {
            Ok(found) => Ok(found.is_some()),
            Err(e) => {
                debug!("Selector {} did not appear: {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn auto_scroll(&self) -> ScrapeResult<()> {
        self.evaluate_value(script::auto_scroll_script()).await?;
        Ok(())
    }

    async fn extract_products(&self, selectors: &SelectorSet) -> ScrapeResult<Vec<RawProduct>> {
        let value = self.evaluate_value(&script::extraction_script(selectors)).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn extract_images(&self) -> ScrapeResult<Vec<RawImage>> {
        let value = self.evaluate_value(script::images_script()).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click_next(&self, pagination: &PaginationConfig, next_page: u32) -> ScrapeResult<bool> {
        let value = self
            .evaluate_value(&script::click_next_script(pagination, next_page))
            .await?;
        match value.as_str() {
            Some(control) => {
                debug!("Clicked {} control for page {}", control, next_page);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        self.page.url().map_err(browser_err)
    }

    async fn evaluate_json(&self, script: &str) -> ScrapeResult<serde_json::Value> {
        self.evaluate_value(script).await
    }

    async fn screenshot(&self, target: &ScreenshotTarget, path: &Path) -> ScrapeResult<()> {
        let bytes = match target {
            ScreenshotTarget::FullPage | ScreenshotTarget::Viewport => self
                .page
                .screenshot_builder()
                .full_page(matches!(target, ScreenshotTarget::FullPage))
                .screenshot()
                .await
                .map_err(browser_err)?,
            ScreenshotTarget::Element { selector, timeout_ms } => {
                let element = self
                    .page
                    .wait_for_selector_builder(selector)
                    .timeout(*timeout_ms as f64)
                    .wait_for_selector()
                    .await
                    .ok()
                    .flatten()
                    .ok_or_else(|| ScrapeError::ElementNotFound { selector: selector.clone() })?;
                element
                    .screenshot_builder()
                    .await
                    .screenshot()
                    .await
                    .map_err(browser_err)?
            }
        };

        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| ScrapeError::FileWrite { path: path.display().to_string(), source })
    }

    async fn capture_network(
        &self,
        url: &str,
        timeout_ms: u64,
        wait_ms: u64,
    ) -> ScrapeResult<Vec<TimedNetworkEvent>> {
        let events = self.page.subscribe_event().map_err(browser_err)?;
        tokio::pin!(events);

        let started = std::time::Instant::now();
        let navigation = self.goto(url, WaitUntil::DomContentLoaded, timeout_ms);
        tokio::pin!(navigation);
        let settle = tokio::time::sleep(Duration::from_millis(timeout_ms.saturating_add(wait_ms)));
        tokio::pin!(settle);

        let mut navigated = false;
        let mut captured = Vec::new();

        loop {
            tokio::select! {
                result = &mut navigation, if !navigated => {
                    result?;
                    navigated = true;
                    settle.as_mut().reset(tokio::time::Instant::now() + Duration::from_millis(wait_ms));
                    debug!("Loaded {}, recording traffic for {}ms", url, wait_ms);
                }
                _ = &mut settle => break,
                event = events.next() => {
                    let event = match event {
                        Some(Ok(event)) => event,
                        Some(Err(_)) => continue,
                        None => break,
                    };
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    let network_event = match event {
                        PageEvent::Request(request) => Some(NetworkEvent::Request {
                            url: request.url().unwrap_or_default(),
                            method: request.method().unwrap_or_default(),
                            resource_type: request.resource_type().unwrap_or_default(),
                            headers: request
                                .headers()
                                .map(|headers| {
                                    headers.into_iter().map(|(name, value)| (name.to_lowercase(), value)).collect()
                                })
                                .unwrap_or_default(),
                            post_data: request.post_post_as_string().ok().flatten(),
                        }),
                        PageEvent::Response(response) => self.response_event(response).await,
                        _ => None,
                    };
                    if let Some(event) = network_event {
                        captured.push(TimedNetworkEvent { elapsed_ms, event });
                    }
                }
            }
        }

        Ok(captured)
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.context.close().await.map_err(browser_err)
    }
}

/// Stand-in when the `browser` feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserSession;

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub async fn launch(_config: &BrowserConfig) -> ScrapeResult<Self> {
        Err(ScrapeError::BrowserUnavailable {
            message: "built without the `browser` feature".to_string(),
        })
    }

    pub async fn close(self) {}
}

/// No page can exist without the `browser` feature
#[cfg(not(feature = "browser"))]
pub enum PlaywrightPage {}

#[cfg(not(feature = "browser"))]
#[async_trait(?Send)]
impl PageFactory for BrowserSession {
    type Page = PlaywrightPage;

    async fn open_page(&self, _options: &ContextOptions) -> ScrapeResult<PlaywrightPage> {
        Err(ScrapeError::BrowserUnavailable {
            message: "built without the `browser` feature".to_string(),
        })
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait(?Send)]
impl PageDriver for PlaywrightPage {
    async fn goto(&self, _url: &str, _wait_until: WaitUntil, _timeout_ms: u64) -> ScrapeResult<Option<u16>> {
        match *self {}
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout_ms: u64) -> ScrapeResult<bool> {
        match *self {}
    }

    async fn auto_scroll(&self) -> ScrapeResult<()> {
        match *self {}
    }

    async fn extract_products(&self, _selectors: &SelectorSet) -> ScrapeResult<Vec<RawProduct>> {
        match *self {}
    }

    async fn extract_images(&self) -> ScrapeResult<Vec<RawImage>> {
        match *self {}
    }

    async fn click_next(&self, _pagination: &PaginationConfig, _next_page: u32) -> ScrapeResult<bool> {
        match *self {}
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        match *self {}
    }

    async fn evaluate_json(&self, _script: &str) -> ScrapeResult<serde_json::Value> {
        match *self {}
    }

    async fn screenshot(&self, _target: &ScreenshotTarget, _path: &Path) -> ScrapeResult<()> {
        match *self {}
    }

    async fn capture_network(
        &self,
        _url: &str,
        _timeout_ms: u64,
        _wait_ms: u64,
    ) -> ScrapeResult<Vec<TimedNetworkEvent>> {
        match *self {}
    }

    async fn close(&self) -> ScrapeResult<()> {
        match *self {}
    }
}
