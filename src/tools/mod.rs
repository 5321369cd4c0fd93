//! Single-purpose browser tools sharing the scraper's page driver.

pub mod performance;
pub mod request_monitor;
pub mod screenshot;
pub mod visual_diff;

pub use performance::{PerformanceOptions, PerformanceReport, Throttling};
pub use request_monitor::{MonitorOptions, MonitorReport};
pub use screenshot::ScreenshotOptions;
pub use visual_diff::{VisualDiffOptions, VisualDiffReport};

/// Navigation timeout used by every tool
pub const TOOL_NAVIGATION_TIMEOUT_MS: u64 = 60_000;

/// Render rows as an aligned plain-text table
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let total = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    let mut out = String::new();
    out.push_str(&line(headers.to_vec()));
    out.push('\n');
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// `part` of `total` as a percentage with two decimals
pub fn percentage(part: usize, total: usize) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", part as f64 * 100.0 / total as f64)
}
