//! The seam between extraction logic and the browser.
//!
//! Everything that touches a live page goes through [`PageDriver`]. The playwright
//! implementation lives in [`super::browser`]; tests drive the same logic over static HTML.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{PaginationConfig, SelectorSet, Viewport};
use crate::error::ScrapeResult;

/// Navigation completion condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl WaitUntil {
    pub fn for_site(wait_for_network_idle: bool) -> Self {
        if wait_for_network_idle {
            WaitUntil::NetworkIdle
        } else {
            WaitUntil::Load
        }
    }
}

/// Where an image URL candidate was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// `src`/`currentSrc` property or plain URL attribute
    Src,
    /// Inline `style` attribute
    Style,
    /// Comma separated candidate list (`srcset`, `data-bgset`)
    Srcset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub source: ImageSource,
    pub value: String,
}

impl ImageCandidate {
    pub fn src(value: impl Into<String>) -> Self {
        Self { source: ImageSource::Src, value: value.into() }
    }

    pub fn style(value: impl Into<String>) -> Self {
        Self { source: ImageSource::Style, value: value.into() }
    }

    pub fn srcset(value: impl Into<String>) -> Self {
        Self { source: ImageSource::Srcset, value: value.into() }
    }
}

/// A product element as the page reports it, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawProduct {
    pub index: usize,
    pub name: String,
    pub price: String,
    pub image_candidates: Vec<ImageCandidate>,
    pub link: Option<String>,
    pub fallback_link: Option<String>,
}

/// An `<img>` element as the page reports it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawImage {
    pub src: String,
    pub alt: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenshotTarget {
    FullPage,
    Viewport,
    /// Waits up to `timeout_ms` for the element before capturing it
    Element { selector: String, timeout_ms: u64 },
}

/// Browsing context settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOptions {
    pub viewport: Option<Viewport>,
    pub user_agent: Option<String>,
    pub device_scale_factor: Option<f64>,
    pub is_mobile: bool,
    pub has_touch: bool,
}

/// Network traffic seen while a page loads
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Request {
        url: String,
        method: String,
        resource_type: String,
        /// Header names are lower-case
        headers: BTreeMap<String, String>,
        post_data: Option<String>,
    },
    Response {
        url: String,
        status: u16,
        status_text: String,
        headers: BTreeMap<String, String>,
        content_type: Option<String>,
        body: Option<Vec<u8>>,
    },
}

/// A network event with the milliseconds elapsed since navigation started
#[derive(Debug, Clone, PartialEq)]
pub struct TimedNetworkEvent {
    pub elapsed_ms: u64,
    pub event: NetworkEvent,
}

/// Operations the scrapers and tools need from an open page
#[async_trait(?Send)]
pub trait PageDriver {
    /// Navigate and return the main document's HTTP status when there is one
    async fn goto(&self, url: &str, wait_until: WaitUntil, timeout_ms: u64) -> ScrapeResult<Option<u16>>;

    /// Returns false when the selector did not show up within the timeout
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> ScrapeResult<bool>;

    async fn wait(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    async fn auto_scroll(&self) -> ScrapeResult<()>;

    async fn extract_products(&self, selectors: &SelectorSet) -> ScrapeResult<Vec<RawProduct>>;

    async fn extract_images(&self) -> ScrapeResult<Vec<RawImage>>;

    /// Click the control leading to page `next_page`. Returns false when there is none.
    async fn click_next(&self, pagination: &PaginationConfig, next_page: u32) -> ScrapeResult<bool>;

    async fn current_url(&self) -> ScrapeResult<String>;

    async fn evaluate_json(&self, script: &str) -> ScrapeResult<serde_json::Value>;

    async fn screenshot(&self, target: &ScreenshotTarget, path: &Path) -> ScrapeResult<()>;

    /// Navigate to `url` and record traffic until `wait_ms` after DOMContentLoaded
    async fn capture_network(
        &self,
        url: &str,
        timeout_ms: u64,
        wait_ms: u64,
    ) -> ScrapeResult<Vec<TimedNetworkEvent>>;

    async fn close(&self) -> ScrapeResult<()>;
}

/// Opens pages in fresh browsing contexts
#[async_trait(?Send)]
pub trait PageFactory {
    type Page: PageDriver;

    async fn open_page(&self, options: &ContextOptions) -> ScrapeResult<Self::Page>;
}
