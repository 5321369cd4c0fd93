use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{percentage, print_table, TOOL_NAVIGATION_TIMEOUT_MS};
use crate::error::ScrapeResult;
use crate::export::json_exporter::write_report;
use crate::scraper::{ContextOptions, PageDriver, PageFactory};
use crate::scraper::page::{NetworkEvent, TimedNetworkEvent};
use crate::utils::{ensure_dir, parse_http_url, timestamped_path, truncate_string};

/// Resource types the monitor keeps
pub const AJAX_TYPES: [&str; 2] = ["xhr", "fetch"];

pub const BINARY_BODY: &str = "[binary data]";

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub url: String,
    /// How long to keep listening after DOMContentLoaded
    pub wait_ms: u64,
    pub output_dir: PathBuf,
}

impl MonitorOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_ms: 10_000,
            output_dir: PathBuf::from("results/requests"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedResponse {
    pub status: u16,
    pub status_text: String,
    pub time_since_start: u64,
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub body: Option<String>,
    pub parsed_body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedRequest {
    pub id: usize,
    pub url: String,
    pub method: String,
    pub resource_type: String,
    pub time_since_start: u64,
    pub headers: BTreeMap<String, String>,
    pub post_data: Option<String>,
    pub parsed_post_data: Option<serde_json::Value>,
    pub query_params: Option<BTreeMap<String, String>>,
    pub response: Option<TrackedResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub total_requests: usize,
    pub total_responses: usize,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    /// Milliseconds
    pub duration: i64,
    pub target_url: String,
    pub requests: Vec<TrackedRequest>,
}

impl MonitorReport {
    /// Request counts per resource type
    pub fn type_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for request in &self.requests {
            *counts.entry(request.resource_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Response counts per HTTP status
    pub fn status_counts(&self) -> BTreeMap<u16, usize> {
        let mut counts = BTreeMap::new();
        for response in self.requests.iter().filter_map(|r| r.response.as_ref()) {
            *counts.entry(response.status).or_insert(0) += 1;
        }
        counts
    }
}

fn query_params(url: &str) -> Option<BTreeMap<String, String>> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.query()?;
    Some(parsed.query_pairs().into_owned().collect())
}

/// Text bodies are kept, JSON bodies are parsed too, anything else becomes a marker
fn decode_body(body: Option<Vec<u8>>) -> (Option<String>, Option<serde_json::Value>) {
    match body {
        None => (None, None),
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(text) => {
                let parsed = serde_json::from_str(&text).ok();
                (Some(text), parsed)
            }
            Err(_) => (Some(BINARY_BODY.to_string()), None),
        },
    }
}

/// Folds captured traffic into AJAX request records
#[derive(Debug, Default)]
pub struct RequestTracker {
    requests: Vec<TrackedRequest>,
    latest_by_url: HashMap<String, usize>,
    responses: usize,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timed: TimedNetworkEvent) {
        match timed.event {
            NetworkEvent::Request { url, method, resource_type, headers, post_data } => {
                if !AJAX_TYPES.contains(&resource_type.as_str()) {
                    return;
                }
                let parsed_post_data = post_data.as_deref().and_then(|data| serde_json::from_str(data).ok());
                let index = self.requests.len();
                debug!("[request] {} {} ({})", method, url, resource_type);
                self.latest_by_url.insert(url.clone(), index);
                self.requests.push(TrackedRequest {
                    id: index + 1,
                    query_params: query_params(&url),
                    url,
                    method,
                    resource_type,
                    time_since_start: timed.elapsed_ms,
                    headers,
                    post_data,
                    parsed_post_data,
                    response: None,
                });
            }
            NetworkEvent::Response { url, status, status_text, headers, content_type, body } => {
                let Some(&index) = self.latest_by_url.get(&url) else {
                    return;
                };
                debug!("[response] {} {}", status, url);
                let (body, parsed_body) = decode_body(body);
                self.responses += 1;
                self.requests[index].response = Some(TrackedResponse {
                    status,
                    status_text,
                    time_since_start: timed.elapsed_ms,
                    headers,
                    content_type,
                    body,
                    parsed_body,
                });
            }
        }
    }

    pub fn finish(
        self,
        target_url: &str,
        start_time: chrono::DateTime<chrono::Utc>,
        end_time: chrono::DateTime<chrono::Utc>,
    ) -> MonitorReport {
        MonitorReport {
            total_requests: self.requests.len(),
            total_responses: self.responses,
            start_time,
            end_time,
            duration: (end_time - start_time).num_milliseconds(),
            target_url: target_url.to_string(),
            requests: self.requests,
        }
    }
}

/// Load `url`, record its AJAX traffic for `wait_ms`, save the report
pub async fn monitor<F: PageFactory>(factory: &F, options: &MonitorOptions) -> ScrapeResult<(MonitorReport, PathBuf)> {
    let url = parse_http_url(&options.url)?;
    info!("Monitoring AJAX requests on {} for {}ms", url, options.wait_ms);

    let start_time = chrono::Utc::now();
    let page = factory.open_page(&ContextOptions::default()).await?;
    let captured = page
        .capture_network(url.as_str(), TOOL_NAVIGATION_TIMEOUT_MS, options.wait_ms)
        .await;
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {}", e);
    }
    let events = captured?;
    let end_time = chrono::Utc::now();

    let mut tracker = RequestTracker::new();
    for event in events {
        tracker.record(event);
    }
    let report = tracker.finish(url.as_str(), start_time, end_time);

    ensure_dir(&options.output_dir).await?;
    let path = timestamped_path(&options.output_dir, &url, None, "json", end_time);
    write_report(&report, &path).await?;
    info!(
        "Captured {} requests and {} responses, saved to {}",
        report.total_requests,
        report.total_responses,
        path.display()
    );

    Ok((report, path))
}

fn status_line(response: &TrackedResponse) -> String {
    match &response.content_type {
        Some(content_type) => format!("{} {} ({})", response.status, response.status_text, content_type),
        None => format!("{} {}", response.status, response.status_text),
    }
}

fn indented_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_default()
        .replace('\n', "\n  ")
}

pub fn print_summary(report: &MonitorReport) {
    println!("\nAJAX monitor summary for {}", report.target_url);
    println!("Requests:  {}", report.total_requests);
    println!("Responses: {}", report.total_responses);
    println!("Duration:  {:.1}s", report.duration as f64 / 1000.0);
    println!("Started:   {}", report.start_time.to_rfc3339());
    println!("Finished:  {}", report.end_time.to_rfc3339());

    let type_rows: Vec<Vec<String>> = report
        .type_counts()
        .into_iter()
        .map(|(kind, count)| vec![kind, count.to_string(), percentage(count, report.total_requests)])
        .collect();
    println!("\nRequest types:");
    print_table(&["Type", "Requests", "Share"], &type_rows);

    let status_rows: Vec<Vec<String>> = report
        .status_counts()
        .into_iter()
        .map(|(status, count)| {
            vec![status.to_string(), count.to_string(), percentage(count, report.total_responses)]
        })
        .collect();
    println!("\nResponse status codes:");
    print_table(&["Status", "Responses", "Share"], &status_rows);

    let rule = "-".repeat(100);
    println!("\n{}", rule);
    for (i, request) in report.requests.iter().enumerate() {
        println!("{}. {} {}", i + 1, request.method, request.url);

        let mut has_params = false;
        if let Some(params) = request.query_params.as_ref().filter(|p| !p.is_empty()) {
            if let Ok(value) = serde_json::to_value(params) {
                println!("  Query parameters:\n  {}", indented_json(&value));
                has_params = true;
            }
        }
        if let Some(parsed) = &request.parsed_post_data {
            println!("  POST data (JSON):\n  {}", indented_json(parsed));
            has_params = true;
        } else if let Some(data) = &request.post_data {
            println!("  POST data:\n  {}", truncate_string(data, 100));
            has_params = true;
        }
        if !has_params {
            println!("  No parameters");
        }

        match &request.response {
            Some(response) => {
                println!("  Status: {}", status_line(response));
                if let Some(parsed) = &response.parsed_body {
                    println!("  Body (JSON):\n  {}", indented_json(parsed));
                } else if let Some(body) = &response.body {
                    println!("  Body:\n  {}", truncate_string(body, 200));
                }
            }
            None => println!("  No response"),
        }
        println!("{}", rule);
    }
}
