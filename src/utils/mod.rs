/// Utility functions and helpers
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ScrapeError;

/// Create a directory tree if it does not exist yet
pub async fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}

/// Format file size in human readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes < THRESHOLD {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Format duration in human readable format
pub fn format_duration(duration: std::time::Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}.{}s", total_seconds, duration.subsec_millis() / 100)
    } else if total_seconds < 3600 {
        format!("{}m {}s", total_seconds / 60, total_seconds % 60)
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    }
}

/// Timestamp usable inside a file name: ISO-8601 to the second, `:` replaced by `-`
pub fn file_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Parse an http(s) URL given on the command line or in a config file
pub fn parse_http_url(raw: &str) -> Result<url::Url, ScrapeError> {
    let parsed = url::Url::parse(raw).map_err(|_| ScrapeError::InvalidUrl { url: raw.to_string() })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(ScrapeError::InvalidUrl { url: raw.to_string() }),
    }
}

/// Extract domain from URL
pub fn extract_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(|s| s.to_string())
}

/// Replace every non-word character of a CSS selector so it fits in a file name
pub fn selector_slug(selector: &str) -> String {
    selector
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}

/// `{dir}/{host}_{timestamp}[_{suffix}].{ext}`
pub fn timestamped_path(
    dir: &Path,
    url: &url::Url,
    suffix: Option<&str>,
    extension: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> PathBuf {
    let host = url.host_str().unwrap_or("unknown");
    let mut name = format!("{}_{}", host, file_timestamp(now));
    if let Some(suffix) = suffix {
        name.push('_');
        name.push_str(suffix);
    }
    name.push('.');
    name.push_str(extension);
    dir.join(name)
}

/// Truncate string to at most `max_chars` characters, appending `...` when cut
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars).collect();
        format!("{}...", kept)
    }
}
