use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::error::{ScrapeError, ScrapeResult};

/// Serialize `value` to `path` and return the written size in bytes.
/// Pretty output is indented with two spaces.
pub async fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path, pretty: bool) -> ScrapeResult<u64> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(path, &bytes)
        .await
        .map_err(|source| ScrapeError::FileWrite { path: path.display().to_string(), source })?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(bytes.len() as u64)
}

/// Write a tool report, always pretty-printed
pub async fn write_report<T: Serialize + ?Sized>(report: &T, path: &Path) -> ScrapeResult<u64> {
    write_json(report, path, true).await
}
