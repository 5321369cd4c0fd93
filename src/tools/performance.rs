use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{print_table, TOOL_NAVIGATION_TIMEOUT_MS};
use crate::error::{ScrapeError, ScrapeResult};
use crate::export::json_exporter::write_report;
use crate::scraper::{devices, script, PageDriver, PageFactory, WaitUntil};
use crate::utils::{ensure_dir, parse_http_url, timestamped_path};

/// Network profile recorded with a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Throttling {
    #[serde(rename = "slow3G")]
    Slow3G,
    #[serde(rename = "fast3G")]
    Fast3G,
}

impl std::str::FromStr for Throttling {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow3g" => Ok(Throttling::Slow3G),
            "fast3g" => Ok(Throttling::Fast3G),
            _ => Err(ScrapeError::config(format!("unknown throttling profile '{}' (slow3g, fast3g)", s))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceOptions {
    pub url: String,
    pub runs: u32,
    pub device: Option<String>,
    pub throttling: Option<Throttling>,
    /// Pause after load so late resources reach the timeline
    pub settle_ms: u64,
    pub output_dir: PathBuf,
}

impl PerformanceOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            runs: 3,
            device: None,
            throttling: None,
            settle_ms: 1_000,
            output_dir: PathBuf::from("results/performance"),
        }
    }
}

/// Browser timing figures in milliseconds, sizes in bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceTimings {
    pub redirect_time: f64,
    pub dns_time: f64,
    pub connect_time: f64,
    pub response_time: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded: f64,
    pub dom_complete: f64,
    pub load_event: f64,
    pub first_paint: f64,
    pub first_contentful_paint: f64,
    pub resource_count: f64,
    pub total_resource_size: f64,
    pub time_to_first_byte: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_type: Option<String>,
}

impl PerformanceTimings {
    fn values_mut(&mut self) -> [&mut f64; 13] {
        [
            &mut self.redirect_time,
            &mut self.dns_time,
            &mut self.connect_time,
            &mut self.response_time,
            &mut self.dom_interactive,
            &mut self.dom_content_loaded,
            &mut self.dom_complete,
            &mut self.load_event,
            &mut self.first_paint,
            &mut self.first_contentful_paint,
            &mut self.resource_count,
            &mut self.total_resource_size,
            &mut self.time_to_first_byte,
        ]
    }

    /// Field-wise mean; the navigation type is dropped
    pub fn mean(samples: &[PerformanceTimings]) -> PerformanceTimings {
        let mut mean = PerformanceTimings::default();
        if samples.is_empty() {
            return mean;
        }
        for sample in samples {
            let mut sample = sample.clone();
            for (total, value) in mean.values_mut().into_iter().zip(sample.values_mut()) {
                *total += *value;
            }
        }
        let n = samples.len() as f64;
        for value in mean.values_mut() {
            *value /= n;
        }
        mean
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub run_number: u32,
    pub load_time: f64,
    pub status_code: Option<u16>,
    pub timings: PerformanceTimings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Averages {
    pub timings: PerformanceTimings,
    pub load_time: f64,
    pub resource_count: f64,
    pub resource_size: f64,
}

impl Averages {
    pub fn from_runs(runs: &[RunMetrics]) -> Self {
        if runs.is_empty() {
            return Self::default();
        }
        let samples: Vec<PerformanceTimings> = runs.iter().map(|r| r.timings.clone()).collect();
        let timings = PerformanceTimings::mean(&samples);
        let load_time = runs.iter().map(|r| r.load_time).sum::<f64>() / runs.len() as f64;
        Self {
            resource_count: timings.resource_count,
            resource_size: timings.total_resource_size,
            timings,
            load_time,
        }
    }
}

/// Load time rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Average,
    Slow,
    VerySlow,
}

impl Rating {
    pub fn from_load_time(ms: f64) -> Self {
        if ms < 1000.0 {
            Rating::Excellent
        } else if ms < 2000.0 {
            Rating::Good
        } else if ms < 3000.0 {
            Rating::Average
        } else if ms < 5000.0 {
            Rating::Slow
        } else {
            Rating::VerySlow
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rating::Excellent => "excellent (< 1s)",
            Rating::Good => "good (< 2s)",
            Rating::Average => "average (< 3s)",
            Rating::Slow => "slow (< 5s)",
            Rating::VerySlow => "very slow (>= 5s)",
        }
    }
}

/// Hints for the figures that cross the usual thresholds
pub fn suggestions(averages: &Averages) -> Vec<&'static str> {
    let mut hints = Vec::new();
    if averages.timings.time_to_first_byte > 200.0 {
        hints.push("Time to first byte is high; look at server response time");
    }
    if averages.resource_count > 30.0 {
        hints.push("Many resources; bundle files or serve over HTTP/2");
    }
    if averages.resource_size > 1024.0 * 1024.0 {
        hints.push("Resources exceed 1MB; compress or lazy-load them");
    }
    if averages.timings.first_contentful_paint > 1500.0 {
        hints.push("First contentful paint is slow; trim the critical rendering path");
    }
    hints
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub url: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub device: Option<String>,
    pub throttling: Option<Throttling>,
    pub runs: Vec<RunMetrics>,
    pub averages: Averages,
    pub rating: Rating,
    pub suggestions: Vec<String>,
}

async fn measure_once<P: PageDriver + ?Sized>(
    page: &P,
    url: &str,
    run_number: u32,
    settle_ms: u64,
) -> ScrapeResult<RunMetrics> {
    let started = std::time::Instant::now();
    let status_code = page.goto(url, WaitUntil::Load, TOOL_NAVIGATION_TIMEOUT_MS).await?;
    let load_time = started.elapsed().as_secs_f64() * 1000.0;

    if settle_ms > 0 {
        page.wait(settle_ms).await;
    }

    let value = page.evaluate_json(script::performance_script()).await?;
    let timings: PerformanceTimings = serde_json::from_value(value)?;

    Ok(RunMetrics {
        run_number,
        load_time,
        status_code,
        timings,
    })
}

/// Load the page `runs` times in fresh contexts, save the report, return it with its path
pub async fn measure<F: PageFactory>(
    factory: &F,
    options: &PerformanceOptions,
) -> ScrapeResult<(PerformanceReport, PathBuf)> {
    let url = parse_http_url(&options.url)?;
    if options.runs == 0 {
        return Err(ScrapeError::config("runs must be at least 1"));
    }
    let context = devices::context_options(options.device.as_deref(), None)?;
    if let Some(profile) = options.throttling {
        warn!("Throttling profile {:?} is recorded in the report but not applied", profile);
    }

    let mut runs = Vec::with_capacity(options.runs as usize);
    for run_number in 1..=options.runs {
        info!("Performance run {}/{}", run_number, options.runs);
        let page = factory.open_page(&context).await?;
        let result = measure_once(&page, url.as_str(), run_number, options.settle_ms).await;
        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
        runs.push(result?);
    }

    let averages = Averages::from_runs(&runs);
    let report = PerformanceReport {
        url: url.to_string(),
        timestamp: chrono::Utc::now(),
        device: options.device.clone(),
        throttling: options.throttling,
        rating: Rating::from_load_time(averages.load_time),
        suggestions: suggestions(&averages).into_iter().map(String::from).collect(),
        runs,
        averages,
    };

    ensure_dir(&options.output_dir).await?;
    let path = timestamped_path(&options.output_dir, &url, None, "json", report.timestamp);
    write_report(&report, &path).await?;
    info!("Performance report saved to {}", path.display());

    Ok((report, path))
}

/// Summary table, rating and suggestions on stdout
pub fn print_summary(report: &PerformanceReport) {
    let a = &report.averages;
    let rows: Vec<Vec<String>> = [
        ("Page load time (ms)", a.load_time),
        ("First paint (ms)", a.timings.first_paint),
        ("First contentful paint (ms)", a.timings.first_contentful_paint),
        ("DOM interactive (ms)", a.timings.dom_interactive),
        ("DOM content loaded (ms)", a.timings.dom_content_loaded),
        ("DOM complete (ms)", a.timings.dom_complete),
        ("Time to first byte (ms)", a.timings.time_to_first_byte),
        ("Resources", a.resource_count),
        ("Resource size (KB)", a.resource_size / 1024.0),
    ]
    .iter()
    .map(|(name, value)| vec![name.to_string(), format!("{}", value.round())])
    .collect();

    println!("\nPerformance summary for {} ({} runs):", report.url, report.runs.len());
    print_table(&["Metric", "Value"], &rows);
    println!("\nRating: {}", report.rating.label());
    if !report.suggestions.is_empty() {
        println!("\nSuggestions:");
        for hint in &report.suggestions {
            println!("- {}", hint);
        }
    }
}
