//! shopscrape - configuration-driven product scraper
//!
//! This library provides:
//! - Per-site scraping with selector fallback chains, pagination and auto-scroll
//! - Image gallery scraping
//! - Synthetic names and prices for placeholder values
//! - Chunked JSON result files
//! - Browser side tools: screenshots, performance timing, visual diff, AJAX monitor

pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod filler;
pub mod logging;
pub mod scraper;
pub mod tools;
pub mod utils;

pub use crate::config::AppConfig;
pub use crate::core::{RunReport, ScrapeRunner, SiteOutcome};
pub use crate::error::{ContextualError, ScrapeError, ScrapeResult};
pub use crate::scraper::ProductRecord;
