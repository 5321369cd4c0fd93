//! Per-site scrape parameters.

use serde::{Deserialize, Serialize};

/// Which extraction routine a site uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScraperKind {
    #[default]
    Standard,
    Image,
}

impl std::fmt::Display for ScraperKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScraperKind::Standard => write!(f, "standard"),
            ScraperKind::Image => write!(f, "image"),
        }
    }
}

/// One CSS selector or an ordered list of fallbacks.
///
/// In TOML either `name = ".title"` or `name = [".title", "h3 a"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorChain {
    One(String),
    Many(Vec<String>),
}

impl SelectorChain {
    /// Selectors in the order they are tried, blanks removed
    pub fn selectors(&self) -> Vec<&str> {
        match self {
            SelectorChain::One(s) => vec![s.as_str()],
            SelectorChain::Many(list) => list.iter().map(String::as_str).collect(),
        }
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors().is_empty()
    }
}

impl From<&str> for SelectorChain {
    fn from(s: &str) -> Self {
        SelectorChain::One(s.to_string())
    }
}

/// Named selectors locating each product field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    pub product: SelectorChain,
    pub name: SelectorChain,
    pub price: SelectorChain,
    pub image: SelectorChain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<SelectorChain>,
}

impl SelectorSet {
    /// Every chain paired with its field name
    pub fn chains(&self) -> Vec<(&'static str, &SelectorChain)> {
        let mut chains = vec![
            ("product", &self.product),
            ("name", &self.name),
            ("price", &self.price),
            ("image", &self.image),
        ];
        if let Some(link) = &self.link {
            chains.push(("link", link));
        }
        chains
    }
}

pub const DEFAULT_MAX_PAGES: u32 = 10;
pub const DEFAULT_PAGINATION_WAIT_MS: u64 = 2000;

/// "Next page" handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_selector: Option<String>,
    /// Numbered page links; the one whose text is the wanted page number gets clicked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u64>,
}

impl PaginationConfig {
    pub fn max_pages(&self) -> u32 {
        self.max_pages.unwrap_or(DEFAULT_MAX_PAGES)
    }

    pub fn wait_ms(&self) -> u64 {
        self.wait_ms.unwrap_or(DEFAULT_PAGINATION_WAIT_MS)
    }
}

fn default_true() -> bool {
    true
}

/// Scrape parameters of one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: String,
    #[serde(default)]
    pub kind: ScraperKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_ms: Option<u64>,
    #[serde(default)]
    pub auto_scroll: bool,
    #[serde(default)]
    pub wait_for_network_idle: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<SelectorSet>,
}

impl SiteConfig {
    /// Pagination settings when pagination is switched on
    pub fn active_pagination(&self) -> Option<&PaginationConfig> {
        self.pagination.as_ref().filter(|p| p.enabled)
    }

    /// Site limit first, then the global one; 0 means unlimited
    pub fn effective_limit(&self, global: usize) -> Option<usize> {
        match self.product_limit.unwrap_or(global) {
            0 => None,
            n => Some(n),
        }
    }
}
