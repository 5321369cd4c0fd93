//! In-memory [`PageDriver`] over fixed HTML documents, for tests.
//!
//! Mirrors what the in-page scripts do using the `scraper` crate, so extraction and
//! pagination run without a browser. Next-page clicks follow the control's `href` to another
//! registered document.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::collections::HashMap;
use std::path::Path;
use url::Url;

use super::page::{
    ContextOptions, ImageCandidate, PageDriver, PageFactory, RawImage, RawProduct, ScreenshotTarget,
    TimedNetworkEvent, WaitUntil,
};
use crate::config::{PaginationConfig, SelectorChain, SelectorSet};
use crate::error::{ScrapeError, ScrapeResult};

pub struct StaticPage {
    documents: Vec<(String, String)>,
    current: Cell<usize>,
    scrolls: Cell<usize>,
    visited: RefCell<Vec<String>>,
    screenshots: HashMap<String, image::RgbaImage>,
    network: Vec<TimedNetworkEvent>,
    evaluations: RefCell<Vec<serde_json::Value>>,
    closed: Rc<Cell<usize>>,
    extractions: Cell<usize>,
    failing_extraction: Option<usize>,
}

impl StaticPage {
    pub fn new(documents: Vec<(String, String)>) -> Self {
        Self {
            documents,
            current: Cell::new(0),
            scrolls: Cell::new(0),
            visited: RefCell::new(Vec::new()),
            screenshots: HashMap::new(),
            network: Vec::new(),
            evaluations: RefCell::new(Vec::new()),
            closed: Rc::new(Cell::new(0)),
            extractions: Cell::new(0),
            failing_extraction: None,
        }
    }

    pub fn single(url: &str, html: &str) -> Self {
        Self::new(vec![(url.to_string(), html.to_string())])
    }

    /// Image written by `screenshot` while `url` is the current document
    pub fn with_screenshot(mut self, url: &str, image: image::RgbaImage) -> Self {
        self.screenshots.insert(url.to_string(), image);
        self
    }

    pub fn with_network(mut self, events: Vec<TimedNetworkEvent>) -> Self {
        self.network = events;
        self
    }

    /// Values returned by successive `evaluate_json` calls
    pub fn with_evaluations(self, values: Vec<serde_json::Value>) -> Self {
        *self.evaluations.borrow_mut() = values;
        self
    }

    /// Make the `call`-th `extract_products` call (1-based) fail like a torn-down page
    pub fn failing_extraction(mut self, call: usize) -> Self {
        self.failing_extraction = Some(call);
        self
    }

    pub fn scroll_count(&self) -> usize {
        self.scrolls.get()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.borrow().clone()
    }

    fn current_url_str(&self) -> &str {
        &self.documents[self.current.get()].0
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.documents[self.current.get()].1)
    }

    fn position_of(&self, url: &str) -> Option<usize> {
        self.documents.iter().position(|(u, _)| u == url)
    }

    fn switch_to_href(&self, href: &str) -> bool {
        let target = Url::parse(self.current_url_str()).and_then(|base| base.join(href));
        match target.ok().and_then(|url| self.position_of(url.as_str())) {
            Some(index) => {
                self.current.set(index);
                self.visited.borrow_mut().push(self.documents[index].0.clone());
                true
            }
            None => false,
        }
    }
}

/// Opens a fresh [`StaticPage`] over the same documents for every context
#[derive(Default)]
pub struct StaticFactory {
    documents: Vec<(String, String)>,
    screenshots: HashMap<String, image::RgbaImage>,
    network: Vec<TimedNetworkEvent>,
    evaluations: Vec<serde_json::Value>,
    opened: Cell<usize>,
    closed: Rc<Cell<usize>>,
    contexts: RefCell<Vec<ContextOptions>>,
}

impl StaticFactory {
    pub fn new(documents: Vec<(String, String)>) -> Self {
        Self { documents, ..Self::default() }
    }

    pub fn with_screenshot(mut self, url: &str, image: image::RgbaImage) -> Self {
        self.screenshots.insert(url.to_string(), image);
        self
    }

    pub fn with_network(mut self, events: Vec<TimedNetworkEvent>) -> Self {
        self.network = events;
        self
    }

    /// Every opened page answers `evaluate_json` with these values in turn
    pub fn with_evaluations(mut self, values: Vec<serde_json::Value>) -> Self {
        self.evaluations = values;
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.get()
    }

    /// Pages closed so far across every context
    pub fn closed(&self) -> usize {
        self.closed.get()
    }

    /// Options of every opened context, in order
    pub fn contexts(&self) -> Vec<ContextOptions> {
        self.contexts.borrow().clone()
    }
}

#[async_trait(?Send)]
impl PageFactory for StaticFactory {
    type Page = StaticPage;

    async fn open_page(&self, options: &ContextOptions) -> ScrapeResult<StaticPage> {
        self.opened.set(self.opened.get() + 1);
        self.contexts.borrow_mut().push(options.clone());
        let mut page = StaticPage::new(self.documents.clone())
            .with_network(self.network.clone())
            .with_evaluations(self.evaluations.clone());
        page.screenshots = self.screenshots.clone();
        page.closed = Rc::clone(&self.closed);
        Ok(page)
    }
}

fn parse(selector: &str) -> Option<Selector> {
    Selector::parse(selector).ok()
}

fn first_match_all<'a>(root: &'a Html, chain: &SelectorChain) -> Vec<ElementRef<'a>> {
    for sel in chain.selectors() {
        if let Some(selector) = parse(sel) {
            let found: Vec<ElementRef> = root.select(&selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
    }
    Vec::new()
}

fn first_element<'a>(root: ElementRef<'a>, chain: Option<&SelectorChain>) -> Option<ElementRef<'a>> {
    chain?
        .selectors()
        .into_iter()
        .filter_map(parse)
        .find_map(|selector| root.select(&selector).next())
}

fn first_text(root: ElementRef<'_>, chain: &SelectorChain) -> String {
    chain
        .selectors()
        .into_iter()
        .filter_map(parse)
        .filter_map(|selector| root.select(&selector).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn image_candidates(img: Option<ElementRef<'_>>) -> Vec<ImageCandidate> {
    let img = match img {
        Some(img) => img.value(),
        None => return Vec::new(),
    };
    let attr = |name: &str| img.attr(name).map(str::trim).filter(|v| !v.is_empty());

    let mut out = Vec::new();
    for name in ["src", "data-src", "data-original"] {
        if let Some(value) = attr(name) {
            out.push(ImageCandidate::src(value));
        }
    }
    if let Some(style) = attr("style") {
        out.push(ImageCandidate::style(style));
    }
    for name in ["data-bgset", "srcset", "data-srcset"] {
        if let Some(value) = attr(name) {
            out.push(ImageCandidate::srcset(value));
        }
    }
    out
}

fn usable(el: &ElementRef<'_>) -> bool {
    let element = el.value();
    element.attr("disabled").is_none()
        && !element.classes().any(|class| class == "disabled")
        && element.attr("aria-disabled") != Some("true")
}

fn has_rel(el: &ElementRef<'_>, value: &str) -> bool {
    el.value()
        .attr("rel")
        .map_or(false, |rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case(value)))
}

fn has_label(el: &ElementRef<'_>, needle: &str) -> bool {
    el.value()
        .attr("aria-label")
        .map_or(false, |label| label.to_lowercase().contains(needle))
}

fn points_backward(el: &ElementRef<'_>) -> bool {
    has_rel(el, "prev") || has_label(el, "prev") || el.value().classes().any(|c| c.ends_with("--prev"))
}

fn points_forward(el: &ElementRef<'_>) -> bool {
    has_rel(el, "next") || has_label(el, "next") || el.value().classes().any(|c| c.ends_with("--next"))
}

fn closest_href(el: Option<ElementRef<'_>>) -> Option<String> {
    let el = el?;
    std::iter::once(*el)
        .chain(el.ancestors())
        .filter_map(|node| node.value().as_element())
        .find(|element| element.name() == "a")
        .and_then(|anchor| anchor.attr("href"))
        .map(str::to_string)
}

#[async_trait(?Send)]
impl PageDriver for StaticPage {
    async fn goto(&self, url: &str, _wait_until: WaitUntil, _timeout_ms: u64) -> ScrapeResult<Option<u16>> {
        let index = self.position_of(url).ok_or_else(|| ScrapeError::Navigation {
            url: url.to_string(),
            reason: "404".to_string(),
        })?;
        self.current.set(index);
        self.visited.borrow_mut().push(url.to_string());
        Ok(Some(200))
    }

    async fn wait_for_selector(&self, selector: &str, _timeout_ms: u64) -> ScrapeResult<bool> {
        let document = self.document();
        Ok(parse(selector).map_or(false, |sel| document.select(&sel).next().is_some()))
    }

    async fn wait(&self, _ms: u64) {}

    async fn auto_scroll(&self) -> ScrapeResult<()> {
        self.scrolls.set(self.scrolls.get() + 1);
        Ok(())
    }

    async fn extract_products(&self, selectors: &SelectorSet) -> ScrapeResult<Vec<RawProduct>> {
        let call = self.extractions.get() + 1;
        self.extractions.set(call);
        if self.failing_extraction == Some(call) {
            return Err(ScrapeError::browser("Execution context was destroyed, most likely because of a navigation"));
        }

        let document = self.document();
        let products = first_match_all(&document, &selectors.product)
            .into_iter()
            .enumerate()
            .map(|(index, product)| {
                let img = first_element(product, Some(&selectors.image));
                let link = first_element(product, selectors.link.as_ref())
                    .and_then(|el| el.value().attr("href"))
                    .map(str::to_string);
                RawProduct {
                    index,
                    name: first_text(product, &selectors.name),
                    price: first_text(product, &selectors.price),
                    image_candidates: image_candidates(img),
                    link,
                    fallback_link: closest_href(img).or_else(|| closest_href(Some(product))),
                }
            })
            .collect();
        Ok(products)
    }

    async fn extract_images(&self) -> ScrapeResult<Vec<RawImage>> {
        let document = self.document();
        let selector = parse("img").ok_or_else(|| ScrapeError::internal("img selector"))?;
        let dimension = |el: &ElementRef, name: &str| {
            el.value().attr(name).and_then(|v| v.parse::<u32>().ok()).unwrap_or(0)
        };
        Ok(document
            .select(&selector)
            .map(|img| RawImage {
                src: img.value().attr("src").unwrap_or_default().trim().to_string(),
                alt: img.value().attr("alt").unwrap_or_default().trim().to_string(),
                width: dimension(&img, "width"),
                height: dimension(&img, "height"),
            })
            .filter(|img| !img.src.is_empty())
            .collect())
    }

    async fn click_next(&self, pagination: &PaginationConfig, next_page: u32) -> ScrapeResult<bool> {
        let document = self.document();

        let next_href = pagination.next_selector.as_deref().and_then(parse).and_then(|sel| {
            let candidates: Vec<ElementRef> = document
                .select(&sel)
                .filter(|el| usable(el) && !points_backward(el))
                .collect();
            candidates
                .iter()
                .find(|el| points_forward(el))
                .or_else(|| candidates.last())
                .and_then(|el| el.value().attr("href").map(str::to_string))
        });

        let wanted = next_page.to_string();
        let numbered_href = pagination
            .page_selector
            .as_deref()
            .and_then(parse)
            .and_then(|sel| {
                document
                    .select(&sel)
                    .find(|el| el.text().collect::<String>().trim() == wanted)
            })
            .filter(usable)
            .and_then(|el| el.value().attr("href").map(str::to_string));

        Ok(next_href
            .or(numbered_href)
            .map_or(false, |href| self.switch_to_href(&href)))
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        Ok(self.current_url_str().to_string())
    }

    async fn evaluate_json(&self, _script: &str) -> ScrapeResult<serde_json::Value> {
        let mut queue = self.evaluations.borrow_mut();
        if queue.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(queue.remove(0))
    }

    async fn screenshot(&self, target: &ScreenshotTarget, path: &Path) -> ScrapeResult<()> {
        if let ScreenshotTarget::Element { selector, .. } = target {
            if !self.wait_for_selector(selector, 0).await? {
                return Err(ScrapeError::ElementNotFound { selector: selector.clone() });
            }
        }
        let image = self
            .screenshots
            .get(self.current_url_str())
            .cloned()
            .unwrap_or_else(|| image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255])));
        image
            .save(path)
            .map_err(|e| ScrapeError::export(e.to_string()))
    }

    async fn capture_network(
        &self,
        url: &str,
        timeout_ms: u64,
        _wait_ms: u64,
    ) -> ScrapeResult<Vec<TimedNetworkEvent>> {
        self.goto(url, WaitUntil::Load, timeout_ms).await?;
        Ok(self.network.clone())
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.closed.set(self.closed.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closest_anchor_and_numbered_pages() {
        let html = r#"<div class="p"><a href="/x"><img src="a.jpg"></a></div>
                      <nav><a class="pg" href="/p2">2</a><a class="pg" href="/p3">3</a></nav>"#;
        let page = StaticPage::new(vec![
            ("https://s.com/".into(), html.into()),
            ("https://s.com/p3".into(), "<p>three</p>".into()),
        ]);

        let selectors = SelectorSet {
            product: ".p".into(),
            name: "h3".into(),
            price: ".price".into(),
            image: "img".into(),
            link: None,
        };
        let raw = page.extract_products(&selectors).await.unwrap();
        assert_eq!(raw[0].fallback_link.as_deref(), Some("/x"));

        let pagination = PaginationConfig {
            enabled: true,
            next_selector: None,
            page_selector: Some("a.pg".into()),
            max_pages: None,
            wait_ms: None,
        };
        assert!(page.click_next(&pagination, 3).await.unwrap());
        assert_eq!(page.current_url().await.unwrap(), "https://s.com/p3");
    }

    fn arrows(next_selector: &str) -> PaginationConfig {
        PaginationConfig {
            enabled: true,
            next_selector: Some(next_selector.into()),
            page_selector: None,
            max_pages: None,
            wait_ms: None,
        }
    }

    #[tokio::test]
    async fn test_next_skips_previous_arrow() {
        let html = r#"<nav>
            <a class="pagination__item pagination__item--prev pagination__item-arrow link" aria-label="Previous page" href="/p1">&lt;</a>
            <a class="pagination__item pagination__item--next pagination__item-arrow link" aria-label="Next page" href="/p3">&gt;</a>
        </nav>"#;
        let page = StaticPage::new(vec![
            ("https://s.com/p2".into(), html.into()),
            ("https://s.com/p1".into(), "<p>one</p>".into()),
            ("https://s.com/p3".into(), "<p>three</p>".into()),
        ]);

        assert!(page.click_next(&arrows(".pagination__item-arrow.link"), 3).await.unwrap());
        assert_eq!(page.current_url().await.unwrap(), "https://s.com/p3");
    }

    #[tokio::test]
    async fn test_next_prefers_last_unmarked_match() {
        let html = r#"<a class="arrow" href="/p1">&lt;</a><a class="arrow" href="/p3">&gt;</a>"#;
        let page = StaticPage::new(vec![
            ("https://s.com/p2".into(), html.into()),
            ("https://s.com/p1".into(), "<p>one</p>".into()),
            ("https://s.com/p3".into(), "<p>three</p>".into()),
        ]);

        assert!(page.click_next(&arrows("a.arrow"), 3).await.unwrap());
        assert_eq!(page.visited(), vec!["https://s.com/p3".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_controls_are_not_followed() {
        let only_previous = r#"<a class="arrow" rel="prev" href="/p1">&lt;</a>"#;
        let disabled = r#"<a class="next disabled" href="/p9">&gt;</a>
                          <button class="next" disabled>&gt;</button>
                          <a class="next" aria-disabled="true" href="/p9">&gt;</a>"#;
        let page = StaticPage::new(vec![
            ("https://s.com/a".into(), only_previous.into()),
            ("https://s.com/b".into(), disabled.into()),
            ("https://s.com/p1".into(), "<p>one</p>".into()),
            ("https://s.com/p9".into(), "<p>nine</p>".into()),
        ]);

        assert!(!page.click_next(&arrows("a.arrow"), 2).await.unwrap());
        page.goto("https://s.com/b", WaitUntil::Load, 0).await.unwrap();
        assert!(!page.click_next(&arrows(".next"), 2).await.unwrap());
        assert_eq!(page.current_url().await.unwrap(), "https://s.com/b");
    }
}
