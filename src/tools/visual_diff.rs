use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::screenshot::{capture_page, ELEMENT_WAIT_TIMEOUT_MS};
use crate::config::Viewport;
use crate::error::{ScrapeError, ScrapeResult};
use crate::export::json_exporter::write_report;
use crate::scraper::{devices, ContextOptions, PageDriver, PageFactory, ScreenshotTarget};
use crate::utils::{ensure_dir, file_timestamp, parse_http_url};

/// Largest possible YIQ distance between two colours
const MAX_YIQ_DELTA: f64 = 35_215.0;

#[derive(Debug, Clone)]
pub struct VisualDiffOptions {
    pub baseline_url: String,
    pub compare_url: String,
    /// Colour sensitivity between 0 and 1, smaller is stricter
    pub threshold: f64,
    /// Count anti-aliased pixels as differences
    pub include_aa: bool,
    pub selector: Option<String>,
    pub wait_ms: u64,
    pub device: Option<String>,
    pub viewport: Option<Viewport>,
    pub output_dir: PathBuf,
}

impl VisualDiffOptions {
    pub fn new(baseline_url: impl Into<String>, compare_url: impl Into<String>) -> Self {
        Self {
            baseline_url: baseline_url.into(),
            compare_url: compare_url.into(),
            threshold: 0.1,
            include_aa: false,
            selector: None,
            wait_ms: 2_000,
            device: None,
            viewport: None,
            output_dir: PathBuf::from("results/visual-regression"),
        }
    }

    fn target(&self) -> ScreenshotTarget {
        match &self.selector {
            Some(selector) => ScreenshotTarget::Element {
                selector: selector.clone(),
                timeout_ms: ELEMENT_WAIT_TIMEOUT_MS,
            },
            None => ScreenshotTarget::FullPage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub identical: bool,
    pub diff_pixels: u64,
    pub diff_percentage: f64,
    pub total_pixels: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffFiles {
    pub baseline: PathBuf,
    pub compare: PathBuf,
    pub diff: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualDiffReport {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub baseline_url: String,
    pub compare_url: String,
    pub threshold: f64,
    pub include_aa: bool,
    pub device: Option<String>,
    pub viewport: Option<Viewport>,
    pub selector: Option<String>,
    pub result: DiffResult,
    pub files: DiffFiles,
}

fn blend(channel: u8, alpha: f64) -> f64 {
    255.0 + (channel as f64 - 255.0) * alpha
}

/// Pixel colour in YIQ space, alpha blended over white
fn yiq(pixel: &Rgba<u8>) -> (f64, f64, f64) {
    let alpha = pixel[3] as f64 / 255.0;
    let (r, g, b) = (blend(pixel[0], alpha), blend(pixel[1], alpha), blend(pixel[2], alpha));
    (
        r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23,
        r * 0.595_977_99 - g * 0.274_176_47 - b * 0.321_801_52,
        r * 0.211_470_17 - g * 0.522_617_47 + b * 0.311_147_3,
    )
}

fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    if a == b {
        return 0.0;
    }
    let (y1, i1, q1) = yiq(a);
    let (y2, i2, q2) = yiq(b);
    let (y, i, q) = (y1 - y2, i1 - i2, q1 - q2);
    0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q
}

/// Signed brightness difference, used to find darker and lighter neighbours
fn brightness_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    if a == b {
        return 0.0;
    }
    yiq(a).0 - yiq(b).0
}

/// Clamped 3x3 window around `(x, y)`, the pixel itself excluded
fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let (x0, x2) = (x.saturating_sub(1), (x + 1).min(width - 1));
    let (y0, y2) = (y.saturating_sub(1), (y + 1).min(height - 1));
    (x0..=x2)
        .flat_map(move |nx| (y0..=y2).map(move |ny| (nx, ny)))
        .filter(move |&(nx, ny)| (nx, ny) != (x, y))
}

fn on_edge(x: u32, y: u32, width: u32, height: u32) -> bool {
    x == 0 || y == 0 || x + 1 >= width || y + 1 >= height
}

/// More than two neighbours with exactly the same colour
fn has_many_siblings(img: &RgbaImage, x: u32, y: u32) -> bool {
    let (width, height) = img.dimensions();
    let pixel = img.get_pixel(x, y);
    let mut zeroes = on_edge(x, y, width, height) as u32;
    for (nx, ny) in neighbours(x, y, width, height) {
        if img.get_pixel(nx, ny) == pixel {
            zeroes += 1;
        }
        if zeroes > 2 {
            return true;
        }
    }
    false
}

/// Whether the pixel at `(x, y)` of `img` looks like anti-aliasing: it sits between a darker
/// and a lighter neighbour, and one of those lies in a flat area in both images.
fn antialiased(img: &RgbaImage, x: u32, y: u32, other: &RgbaImage) -> bool {
    let (width, height) = img.dimensions();
    let pixel = img.get_pixel(x, y);
    let mut zeroes = on_edge(x, y, width, height) as u32;
    let (mut min, mut max) = (0.0, 0.0);
    let (mut darkest, mut lightest) = ((x, y), (x, y));

    for (nx, ny) in neighbours(x, y, width, height) {
        let delta = brightness_delta(pixel, img.get_pixel(nx, ny));
        if delta == 0.0 {
            zeroes += 1;
            if zeroes > 2 {
                return false;
            }
        } else if delta < min {
            min = delta;
            lightest = (nx, ny);
        } else if delta > max {
            max = delta;
            darkest = (nx, ny);
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    let flat = |(px, py): (u32, u32)| has_many_siblings(img, px, py) && has_many_siblings(other, px, py);
    flat(lightest) || flat(darkest)
}

fn faded_gray(pixel: &Rgba<u8>) -> Rgba<u8> {
    let (y, _, _) = yiq(pixel);
    let value = blend(y.round().clamp(0.0, 255.0) as u8, 0.1).round() as u8;
    Rgba([value, value, value, 255])
}

/// Compare two equally sized images. Differing pixels are red in the returned
/// diff image, the rest a faded greyscale copy of the baseline.
///
/// Unless `include_aa` is set, differences that look like anti-aliasing in either image are
/// painted yellow and not counted.
pub fn compare_images(
    baseline: &RgbaImage,
    compare: &RgbaImage,
    threshold: f64,
    include_aa: bool,
) -> ScrapeResult<(DiffResult, RgbaImage)> {
    if baseline.dimensions() != compare.dimensions() {
        return Err(ScrapeError::ImageCompare {
            message: format!(
                "image sizes differ: {}x{} vs {}x{}",
                baseline.width(),
                baseline.height(),
                compare.width(),
                compare.height()
            ),
        });
    }

    let limit = MAX_YIQ_DELTA * threshold * threshold;
    let (width, height) = baseline.dimensions();
    let mut diff = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for (x, y, base_pixel) in baseline.enumerate_pixels() {
        let other = compare.get_pixel(x, y);
        if color_delta(base_pixel, other) > limit {
            if !include_aa && (antialiased(baseline, x, y, compare) || antialiased(compare, x, y, baseline)) {
                diff.put_pixel(x, y, Rgba([255, 255, 0, 255]));
            } else {
                diff_pixels += 1;
                diff.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        } else {
            diff.put_pixel(x, y, faded_gray(base_pixel));
        }
    }

    let total_pixels = width as u64 * height as u64;
    let diff_percentage = if total_pixels == 0 {
        0.0
    } else {
        diff_pixels as f64 * 100.0 / total_pixels as f64
    };

    Ok((
        DiffResult {
            identical: diff_pixels == 0,
            diff_pixels,
            diff_percentage,
            total_pixels,
        },
        diff,
    ))
}

fn load_png(path: &Path) -> ScrapeResult<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| ScrapeError::ImageCompare {
            message: format!("cannot read {}: {}", path.display(), e),
        })
}

/// Compare two PNG files and write the diff image
pub async fn compare_files(
    baseline: &Path,
    compare: &Path,
    diff_path: &Path,
    threshold: f64,
    include_aa: bool,
) -> ScrapeResult<DiffResult> {
    let (baseline, compare, diff_path) = (baseline.to_path_buf(), compare.to_path_buf(), diff_path.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let (result, diff) = compare_images(&load_png(&baseline)?, &load_png(&compare)?, threshold, include_aa)?;
        diff.save(&diff_path).map_err(|e| ScrapeError::ImageCompare {
            message: format!("cannot write {}: {}", diff_path.display(), e),
        })?;
        Ok(result)
    })
    .await
    .map_err(|e| ScrapeError::internal(format!("image comparison task failed: {}", e)))?
}

async fn capture_into<F: PageFactory>(
    factory: &F,
    context: &ContextOptions,
    url: &str,
    options: &VisualDiffOptions,
    path: &Path,
) -> ScrapeResult<()> {
    let page = factory.open_page(context).await?;
    let result = capture_page(&page, url, options.wait_ms, &options.target(), path).await;
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {}", e);
    }
    result
}

/// Screenshot both pages, compare them and save the diff image plus a JSON report
pub async fn run<F: PageFactory>(factory: &F, options: &VisualDiffOptions) -> ScrapeResult<(VisualDiffReport, PathBuf)> {
    let baseline_url = parse_http_url(&options.baseline_url)?;
    let compare_url = parse_http_url(&options.compare_url)?;
    if !(0.0..=1.0).contains(&options.threshold) {
        return Err(ScrapeError::config("threshold must be between 0 and 1"));
    }
    let context = devices::context_options(options.device.as_deref(), options.viewport)?;

    ensure_dir(&options.output_dir).await?;
    let timestamp = chrono::Utc::now();
    let prefix = format!("visual_regression_{}", file_timestamp(timestamp));
    let files = DiffFiles {
        baseline: options.output_dir.join(format!("{}_baseline.png", prefix)),
        compare: options.output_dir.join(format!("{}_compare.png", prefix)),
        diff: options.output_dir.join(format!("{}_diff.png", prefix)),
    };

    info!("Capturing baseline {}", baseline_url);
    capture_into(factory, &context, baseline_url.as_str(), options, &files.baseline).await?;
    info!("Capturing comparison {}", compare_url);
    capture_into(factory, &context, compare_url.as_str(), options, &files.compare).await?;

    let result = compare_files(
        &files.baseline,
        &files.compare,
        &files.diff,
        options.threshold,
        options.include_aa,
    )
    .await?;
    if result.identical {
        info!("Screenshots match");
    } else {
        warn!(
            "{} pixels differ ({:.2}%), diff saved to {}",
            result.diff_pixels,
            result.diff_percentage,
            files.diff.display()
        );
    }

    let report = VisualDiffReport {
        timestamp,
        baseline_url: baseline_url.to_string(),
        compare_url: compare_url.to_string(),
        threshold: options.threshold,
        include_aa: options.include_aa,
        device: options.device.clone(),
        viewport: options.viewport,
        selector: options.selector.clone(),
        result,
        files,
    };
    let report_path = options.output_dir.join(format!("{}_report.json", prefix));
    write_report(&report, &report_path).await?;
    info!("Visual regression report saved to {}", report_path.display());

    Ok((report, report_path))
}
