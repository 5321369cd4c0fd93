//! Page-by-page collection for sites with a "next" control.

use std::collections::HashSet;

use super::page::PageDriver;
use super::standard::{self, PageExtraction};
use super::{ProductRecord, ScrapeContext};
use crate::config::{PaginationConfig, SiteConfig};
use crate::error::ScrapeResult;
use crate::{log_debug, log_info, log_warn};

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Disabled,
    NoNextControl,
    MaxPages,
    LimitReached,
    NoNewRecords,
    /// A page after the first failed; the records gathered before it are kept
    PageError(String),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::Disabled => "pagination disabled",
            StopReason::NoNextControl => "no next-page control",
            StopReason::MaxPages => "page cap reached",
            StopReason::LimitReached => "product limit reached",
            StopReason::NoNewRecords => "page had no new products",
            StopReason::PageError(error) => return write!(f, "page failed: {}", error),
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationSummary {
    pub pages_visited: u32,
    pub stop_reason: StopReason,
}

fn limit_reached(records: &[ProductRecord], limit: Option<usize>) -> bool {
    limit.map_or(false, |limit| records.len() >= limit)
}

/// Move to page `next_page` and extract it. `None` when no control leads there.
async fn next_extraction<P: PageDriver + ?Sized>(
    page: &P,
    site: &SiteConfig,
    pagination: &PaginationConfig,
    next_page: u32,
    ctx: &mut ScrapeContext,
) -> ScrapeResult<Option<PageExtraction>> {
    if !page.click_next(pagination, next_page).await? {
        return Ok(None);
    }

    page.wait(pagination.wait_ms()).await;
    if site.auto_scroll {
        page.auto_scroll().await?;
    }

    standard::extract_page(page, site, ctx).await.map(Some)
}

/// Scrape the first page, then follow next-page controls until a stop condition holds.
///
/// The page must already be navigated to the site URL. Records seen on an earlier page
/// (same image and link) are not repeated, and ids continue from the previous pages.
/// Only a failure on the first page is an error; later failures end the loop with
/// [`StopReason::PageError`].
pub async fn collect<P: PageDriver + ?Sized>(
    page: &P,
    site: &SiteConfig,
    limit: Option<usize>,
    ctx: &mut ScrapeContext,
) -> ScrapeResult<(Vec<ProductRecord>, PaginationSummary)> {
    let first = standard::scrape_page(page, site, ctx).await?;
    let mut seen: HashSet<(String, Option<String>)> =
        first.records.iter().map(ProductRecord::dedup_key).collect();
    let mut records = first.records;
    let mut pages_visited = 1;

    let pagination = match site.active_pagination() {
        Some(pagination) => pagination,
        None => {
            return Ok((records, PaginationSummary { pages_visited, stop_reason: StopReason::Disabled }));
        }
    };

    let max_pages = pagination.max_pages();
    let mut stop_reason = StopReason::MaxPages;

    for next_page in 2..=max_pages {
        if limit_reached(&records, limit) {
            stop_reason = StopReason::LimitReached;
            break;
        }

        let extraction = match next_extraction(page, site, pagination, next_page, ctx).await {
            Ok(Some(extraction)) => extraction,
            Ok(None) => {
                log_debug!(ctx.log, format!("No control leading to page {}", next_page));
                stop_reason = StopReason::NoNextControl;
                break;
            }
            Err(error) => {
                let log = ctx.log.clone()
                    .with_number_field("page", next_page as i64)
                    .with_error_category(error.category());
                log_warn!(log, format!("Page {} failed, keeping {} products: {}", next_page, records.len(), error));
                stop_reason = StopReason::PageError(error.to_string());
                break;
            }
        };
        pages_visited = next_page;

        let offset = records.iter().map(|r| r.id).max().unwrap_or(0);
        let before = records.len();
        for mut record in extraction.records {
            record.id += offset;
            if seen.insert(record.dedup_key()) {
                records.push(record);
            }
        }

        let added = records.len() - before;
        let log = ctx.log.clone()
            .with_number_field("page", next_page as i64)
            .with_number_field("added", added as i64);
        log_info!(log, format!("Page {} added {} products", next_page, added));

        if added == 0 {
            stop_reason = StopReason::NoNewRecords;
            break;
        }
    }

    if stop_reason == StopReason::MaxPages && limit_reached(&records, limit) {
        stop_reason = StopReason::LimitReached;
    }

    Ok((records, PaginationSummary { pages_visited, stop_reason }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserConfig, PaginationConfig, SelectorChain, SelectorSet};
    use crate::logging::LogContext;
    use crate::scraper::static_page::StaticPage;

    const BASE: &str = "https://usasnackshop.com/collections/all";

    fn listing(items: &[&str], next: Option<&str>) -> String {
        let products: String = items
            .iter()
            .map(|item| {
                format!(
                    r#"<div class="card"><img src="/img/{item}.jpg"><a class="name" href="/products/{item}">{item}</a><span class="price">$1.00</span></div>"#,
                    item = item
                )
            })
            .collect();
        let next = next
            .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
            .unwrap_or_default();
        format!("<html><body>{}<nav>{}</nav></body></html>", products, next)
    }

    fn site(max_pages: u32) -> SiteConfig {
        SiteConfig {
            url: BASE.into(),
            kind: Default::default(),
            wait_selector: None,
            wait_time_ms: None,
            auto_scroll: false,
            wait_for_network_idle: false,
            product_limit: None,
            pagination: Some(PaginationConfig {
                enabled: true,
                next_selector: Some("a.next".into()),
                page_selector: None,
                max_pages: Some(max_pages),
                wait_ms: Some(0),
            }),
            selectors: Some(SelectorSet {
                product: ".card".into(),
                name: "a.name".into(),
                price: ".price".into(),
                image: "img".into(),
                link: Some(SelectorChain::One("a.name".into())),
            }),
        }
    }

    fn ctx() -> ScrapeContext {
        ScrapeContext::seeded(LogContext::new("pagination", "test"), &BrowserConfig::default(), 5)
    }

    fn three_pages() -> StaticPage {
        StaticPage::new(vec![
            (BASE.to_string(), listing(&["a", "b"], Some("?page=2"))),
            (format!("{}?page=2", BASE), listing(&["c", "d"], Some("?page=3"))),
            (format!("{}?page=3", BASE), listing(&["e"], None)),
        ])
    }

    #[tokio::test]
    async fn test_follows_next_until_no_control() {
        let page = three_pages();
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site(10), None, &mut ctx).await.unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(summary.pages_visited, 3);
        assert_eq!(summary.stop_reason, StopReason::NoNextControl);
    }

    #[tokio::test]
    async fn test_stops_at_page_cap() {
        let page = three_pages();
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site(2), None, &mut ctx).await.unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(summary.pages_visited, 2);
        assert_eq!(summary.stop_reason, StopReason::MaxPages);
    }

    #[tokio::test]
    async fn test_stops_when_limit_reached() {
        let page = three_pages();
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site(10), Some(2), &mut ctx).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.stop_reason, StopReason::LimitReached);
    }

    #[tokio::test]
    async fn test_repeated_page_ends_loop() {
        let page = StaticPage::new(vec![
            (BASE.to_string(), listing(&["a", "b"], Some("?page=2"))),
            (format!("{}?page=2", BASE), listing(&["a", "b"], Some("?page=3"))),
        ]);
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site(10), None, &mut ctx).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(summary.stop_reason, StopReason::NoNewRecords);
    }

    #[tokio::test]
    async fn test_disabled_pagination_scrapes_one_page() {
        let page = three_pages();
        let mut site = site(10);
        if let Some(pagination) = site.pagination.as_mut() {
            pagination.enabled = false;
        }
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site, None, &mut ctx).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(summary.stop_reason, StopReason::Disabled);
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_earlier_records() {
        let page = three_pages().failing_extraction(2);
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site(10), None, &mut ctx).await.unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(summary.pages_visited, 1);
        match &summary.stop_reason {
            StopReason::PageError(error) => assert!(error.contains("Execution context was destroyed")),
            other => panic!("unexpected stop reason: {:?}", other),
        }
        assert!(summary.stop_reason.to_string().starts_with("page failed: "));
    }

    #[tokio::test]
    async fn test_first_page_failure_is_an_error() {
        let page = three_pages().failing_extraction(1);
        let mut ctx = ctx();

        assert!(collect(&page, &site(10), None, &mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_ids_continue_across_pages() {
        let page = three_pages();
        let mut ctx = ctx();

        let (records, _) = collect(&page, &site(10), None, &mut ctx).await.unwrap();

        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_disabled_next_control_ends_loop() {
        let last_page = listing(&["c", "d"], None)
            .replace("<nav></nav>", r#"<nav><a class="next disabled" href="?page=3">Next</a></nav>"#);
        let page = StaticPage::new(vec![
            (BASE.to_string(), listing(&["a", "b"], Some("?page=2"))),
            (format!("{}?page=2", BASE), last_page),
            (format!("{}?page=3", BASE), listing(&["e"], None)),
        ]);
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site(10), None, &mut ctx).await.unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(summary.pages_visited, 2);
        assert_eq!(summary.stop_reason, StopReason::NoNextControl);
    }

    #[tokio::test]
    async fn test_numbered_page_links() {
        let numbers = r#"<nav><a class="pg" href="?page=1">1</a><a class="pg" href="?page=2">2</a><a class="pg" href="?page=3">3</a></nav>"#;
        let with_numbers = |items: &[&str]| listing(items, None).replace("<nav></nav>", numbers);
        let page = StaticPage::new(vec![
            (BASE.to_string(), with_numbers(&["a", "b"])),
            (format!("{}?page=2", BASE), with_numbers(&["c"])),
            (format!("{}?page=3", BASE), with_numbers(&["d"])),
        ]);
        let mut site = site(3);
        if let Some(pagination) = site.pagination.as_mut() {
            pagination.next_selector = None;
            pagination.page_selector = Some("a.pg".into());
        }
        let mut ctx = ctx();

        let (records, summary) = collect(&page, &site, None, &mut ctx).await.unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(summary.stop_reason, StopReason::MaxPages);
        assert_eq!(
            page.visited(),
            vec![format!("{}?page=2", BASE), format!("{}?page=3", BASE)]
        );
    }
}
