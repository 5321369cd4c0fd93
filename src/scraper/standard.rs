//! Selector-driven product extraction.

use rand::Rng;
use url::Url;

use super::normalize::{normalize_image, normalize_link};
use super::page::{PageDriver, RawProduct};
use super::{ProductRecord, ScrapeContext};
use crate::config::{SelectorSet, SiteConfig};
use crate::error::{ScrapeError, ScrapeResult};
use crate::filler;
use crate::{log_debug, log_info};

/// Records of one page plus what was thrown away
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtraction {
    pub records: Vec<ProductRecord>,
    /// Product elements the page reported
    pub raw_count: usize,
    /// Elements skipped for lack of a usable image
    pub dropped_without_image: usize,
    /// Records whose name or price was synthesized
    pub filled: usize,
}

fn selectors_of(site: &SiteConfig) -> ScrapeResult<&SelectorSet> {
    site.selectors
        .as_ref()
        .ok_or_else(|| ScrapeError::config(format!("site {} has no selectors", site.url)))
}

/// Wait for the page to be ready: wait selector, fixed delay, auto-scroll
pub async fn prepare_page<P: PageDriver + ?Sized>(
    page: &P,
    site: &SiteConfig,
    ctx: &ScrapeContext,
) -> ScrapeResult<()> {
    if let Some(selector) = &site.wait_selector {
        log_debug!(ctx.log, format!("Waiting for selector {}", selector));
        if !page.wait_for_selector(selector, ctx.wait_selector_timeout_ms).await? {
            return Err(ScrapeError::WaitTimeout {
                selector: selector.clone(),
                timeout_ms: ctx.wait_selector_timeout_ms,
            });
        }
    }

    if let Some(ms) = site.wait_time_ms {
        page.wait(ms).await;
    }

    if site.auto_scroll {
        log_debug!(ctx.log, "Auto-scrolling to load lazy content");
        page.auto_scroll().await?;
    }

    Ok(())
}

/// Extract the products currently rendered on the page
pub async fn extract_page<P: PageDriver + ?Sized>(
    page: &P,
    site: &SiteConfig,
    ctx: &mut ScrapeContext,
) -> ScrapeResult<PageExtraction> {
    let selectors = selectors_of(site)?;
    let raw = page.extract_products(selectors).await?;
    let page_url = page.current_url().await?;
    let base = Url::parse(&page_url)
        .or_else(|_| Url::parse(&site.url))
        .map_err(|_| ScrapeError::InvalidUrl { url: page_url.clone() })?;

    let extraction = build_records(raw, &base, &mut ctx.rng);

    let log = ctx.log.clone()
        .with_url(page_url)
        .with_number_field("elements", extraction.raw_count as i64)
        .with_number_field("records", extraction.records.len() as i64)
        .with_number_field("without_image", extraction.dropped_without_image as i64)
        .with_number_field("filled", extraction.filled as i64);
    log_info!(log, format!("Extracted {} products", extraction.records.len()));

    Ok(extraction)
}

/// Prepare the page, then extract it
pub async fn scrape_page<P: PageDriver + ?Sized>(
    page: &P,
    site: &SiteConfig,
    ctx: &mut ScrapeContext,
) -> ScrapeResult<PageExtraction> {
    prepare_page(page, site, ctx).await?;
    extract_page(page, site, ctx).await
}

/// Normalize raw products into records. Products without a usable image are dropped;
/// ids keep the element position so gaps show what was skipped.
pub fn build_records<R: Rng + ?Sized>(raw: Vec<RawProduct>, base: &Url, rng: &mut R) -> PageExtraction {
    let raw_count = raw.len();
    let mut records = Vec::with_capacity(raw_count);
    let mut dropped_without_image = 0;
    let mut filled = 0;

    for product in raw {
        let image = match normalize_image(&product.image_candidates, base) {
            Some(image) => image,
            None => {
                dropped_without_image += 1;
                continue;
            }
        };

        let mut record = ProductRecord {
            id: product.index as u64 + 1,
            name: product.name.trim().to_string(),
            price: product.price.trim().to_string(),
            image,
            url: normalize_link(product.link.as_deref(), product.fallback_link.as_deref(), base),
            dimensions: None,
        };

        if filler::fill(&mut record, rng) {
            filled += 1;
        }
        records.push(record);
    }

    PageExtraction {
        records,
        raw_count,
        dropped_without_image,
        filled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserConfig, SelectorChain};
    use crate::logging::LogContext;
    use crate::scraper::page::ImageCandidate;
    use crate::scraper::static_page::StaticPage;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const LISTING: &str = r#"
        <html><body>
          <ul id="grid">
            <li class="product">
              <a href="/products/takis"><img src="//cdn.shop.com/takis.jpg"></a>
              <h3 class="title">Takis Fuego</h3>
              <span class="price">$3.49</span>
            </li>
            <li class="product">
              <h3 class="title">No Picture Chips</h3>
              <span class="price">$1.99</span>
            </li>
            <li class="product">
              <div class="media" style="background-image: url('/files/nerds.png')"></div>
              <h3 class="title">Product #3</h3>
              <span class="price"></span>
              <a class="link" href="https://usasnackshop.com/products/nerds">View</a>
            </li>
          </ul>
        </body></html>
    "#;

    fn site() -> SiteConfig {
        SiteConfig {
            url: "https://usasnackshop.com/collections/all".into(),
            kind: Default::default(),
            wait_selector: Some("#grid".into()),
            wait_time_ms: None,
            auto_scroll: true,
            wait_for_network_idle: false,
            product_limit: None,
            pagination: None,
            selectors: Some(SelectorSet {
                product: SelectorChain::Many(vec![".missing".into(), "li.product".into()]),
                name: ".title".into(),
                price: ".price".into(),
                image: SelectorChain::Many(vec!["img".into(), ".media".into()]),
                link: Some("a.link".into()),
            }),
        }
    }

    fn ctx() -> ScrapeContext {
        ScrapeContext::seeded(LogContext::new("standard", "test"), &BrowserConfig::default(), 11)
    }

    #[tokio::test]
    async fn test_scrape_page_over_static_html() {
        let site = site();
        let page = StaticPage::single(&site.url, LISTING);
        let mut ctx = ctx();

        let extraction = scrape_page(&page, &site, &mut ctx).await.unwrap();

        assert_eq!(extraction.raw_count, 3);
        assert_eq!(extraction.dropped_without_image, 1);
        assert_eq!(extraction.records.len(), 2);

        let takis = &extraction.records[0];
        assert_eq!(takis.id, 1);
        assert_eq!(takis.name, "Takis Fuego");
        assert_eq!(takis.price, "$3.49");
        assert_eq!(takis.image, "https://cdn.shop.com/takis.jpg");
        assert_eq!(takis.url.as_deref(), Some("https://usasnackshop.com/products/takis"));

        let nerds = &extraction.records[1];
        assert_eq!(nerds.id, 3);
        assert_eq!(nerds.image, "https://usasnackshop.com/files/nerds.png");
        assert_eq!(nerds.url.as_deref(), Some("https://usasnackshop.com/products/nerds"));
        assert!(!filler::is_artifact_name(&nerds.name));
        assert!(nerds.price.starts_with("Rs. "));
        assert_eq!(extraction.filled, 1);
        assert!(page.scroll_count() >= 1);
    }

    #[tokio::test]
    async fn test_missing_wait_selector_is_a_timeout() {
        let mut site = site();
        site.wait_selector = Some("#never".into());
        let page = StaticPage::single(&site.url, LISTING);
        let mut ctx = ctx();

        let err = scrape_page(&page, &site, &mut ctx).await.unwrap_err();
        assert!(matches!(err, ScrapeError::WaitTimeout { .. }));
    }

    #[test]
    fn test_build_records_without_link() {
        let base = Url::parse("https://shop.example.com/").unwrap();
        let raw = vec![RawProduct {
            index: 0,
            name: "  Pocky  ".into(),
            price: "$2.00".into(),
            image_candidates: vec![ImageCandidate::src("/p.jpg")],
            link: None,
            fallback_link: None,
        }];
        let mut rng = StdRng::seed_from_u64(1);

        let extraction = build_records(raw, &base, &mut rng);
        assert_eq!(extraction.records[0].name, "Pocky");
        assert_eq!(extraction.records[0].url, None);
        assert_eq!(extraction.filled, 0);
    }
}
