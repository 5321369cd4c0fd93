use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::TOOL_NAVIGATION_TIMEOUT_MS;
use crate::config::Viewport;
use crate::error::ScrapeResult;
use crate::scraper::devices;
use crate::scraper::{PageDriver, PageFactory, ScreenshotTarget, WaitUntil};
use crate::utils::{ensure_dir, parse_http_url, selector_slug, timestamped_path};

/// How long an element screenshot waits for its selector
pub const ELEMENT_WAIT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    pub url: String,
    /// Capture only this element
    pub selector: Option<String>,
    /// Whole scrollable page rather than the viewport
    pub full_page: bool,
    pub wait_ms: u64,
    pub device: Option<String>,
    pub viewport: Option<Viewport>,
    pub output_dir: PathBuf,
}

impl ScreenshotOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: None,
            full_page: true,
            wait_ms: 2_000,
            device: None,
            viewport: None,
            output_dir: PathBuf::from("results/screenshots"),
        }
    }

    pub fn target(&self) -> ScreenshotTarget {
        match &self.selector {
            Some(selector) => ScreenshotTarget::Element {
                selector: selector.clone(),
                timeout_ms: ELEMENT_WAIT_TIMEOUT_MS,
            },
            None if self.full_page => ScreenshotTarget::FullPage,
            None => ScreenshotTarget::Viewport,
        }
    }
}

/// Load `url` in `page`, give it `wait_ms` to settle, capture `target` into `path`
pub async fn capture_page<P: PageDriver + ?Sized>(
    page: &P,
    url: &str,
    wait_ms: u64,
    target: &ScreenshotTarget,
    path: &Path,
) -> ScrapeResult<()> {
    page.goto(url, WaitUntil::DomContentLoaded, TOOL_NAVIGATION_TIMEOUT_MS).await?;
    info!("Loaded {}", url);

    if wait_ms > 0 {
        page.wait(wait_ms).await;
    }

    page.screenshot(target, path).await
}

/// Take one screenshot and return the written file
pub async fn capture<F: PageFactory>(factory: &F, options: &ScreenshotOptions) -> ScrapeResult<PathBuf> {
    let url = parse_http_url(&options.url)?;
    let context = devices::context_options(options.device.as_deref(), options.viewport)?;
    if let Some(device) = &options.device {
        info!("Emulating device: {}", device);
    }

    ensure_dir(&options.output_dir).await?;
    let slug = options.selector.as_deref().map(selector_slug);
    let path = timestamped_path(&options.output_dir, &url, slug.as_deref(), "png", chrono::Utc::now());

    let page = factory.open_page(&context).await?;
    let result = capture_page(&page, url.as_str(), options.wait_ms, &options.target(), &path).await;
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {}", e);
    }
    result?;

    info!("Screenshot saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::scraper::static_page::StaticFactory;
    use tempfile::TempDir;

    const URL: &str = "https://shop.example.com/";

    fn factory() -> StaticFactory {
        StaticFactory::new(vec![(URL.to_string(), "<div id='hero'>Sale</div>".to_string())])
            .with_screenshot(URL, image::RgbaImage::from_pixel(6, 3, image::Rgba([10, 20, 30, 255])))
    }

    #[tokio::test]
    async fn test_capture_element_names_file_after_selector() {
        let dir = TempDir::new().unwrap();
        let mut options = ScreenshotOptions::new(URL);
        options.selector = Some("#hero".to_string());
        options.device = Some("iPhone 12".to_string());
        options.output_dir = dir.path().to_path_buf();
        let factory = factory();

        let path = capture(&factory, &options).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("shop.example.com_"));
        assert!(name.ends_with("_-hero.png"));
        let shot = image::open(&path).unwrap();
        assert_eq!((shot.width(), shot.height()), (6, 3));
        assert!(factory.contexts()[0].is_mobile);
    }

    #[tokio::test]
    async fn test_missing_element_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut options = ScreenshotOptions::new(URL);
        options.selector = Some(".absent".to_string());
        options.output_dir = dir.path().to_path_buf();

        let err = capture(&factory(), &options).await.unwrap_err();
        assert!(matches!(err, ScrapeError::ElementNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let options = ScreenshotOptions::new("file:///etc/passwd");
        let err = capture(&factory(), &options).await.unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl { .. }));
    }

    #[test]
    fn test_target_selection() {
        let mut options = ScreenshotOptions::new(URL);
        assert_eq!(options.target(), ScreenshotTarget::FullPage);
        options.full_page = false;
        assert_eq!(options.target(), ScreenshotTarget::Viewport);
    }
}
