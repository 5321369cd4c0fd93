use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

pub mod browser;
pub mod devices;
pub mod image;
pub mod normalize;
pub mod page;
pub mod pagination;
pub mod script;
pub mod standard;

#[cfg(test)]
pub(crate) mod static_page;

pub use page::{ContextOptions, PageDriver, PageFactory, ScreenshotTarget, WaitUntil};

use crate::config::BrowserConfig;
use crate::logging::LogContext;

/// One scraped product as written to the results file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: u64,
    pub name: String,
    pub price: String,
    pub image: String,
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
}

impl ProductRecord {
    /// Identity used to drop products repeated on later pages
    pub fn dedup_key(&self) -> (String, Option<String>) {
        (self.image.clone(), self.url.clone())
    }
}

/// State shared by the extraction steps of one site
pub struct ScrapeContext {
    pub rng: StdRng,
    pub log: LogContext,
    pub wait_selector_timeout_ms: u64,
}

impl ScrapeContext {
    pub fn new(log: LogContext, browser: &BrowserConfig) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            log,
            wait_selector_timeout_ms: browser.wait_selector_timeout_ms,
        }
    }

    /// Deterministic placeholder data
    pub fn seeded(log: LogContext, browser: &BrowserConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(log, browser)
        }
    }
}
