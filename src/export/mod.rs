use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod json_exporter;

use crate::config::OutputConfig;
use crate::error::ScrapeResult;
use crate::scraper::ProductRecord;

/// One written results file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub record_count: usize,
    pub file_size_bytes: u64,
}

/// What `write_site` put on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub records: usize,
    pub files: Vec<FileStats>,
    pub export_duration_ms: u64,
}

/// Writes per-site result files
pub struct ResultWriter {
    results_dir: PathBuf,
    max_records_per_file: usize,
    pretty: bool,
}

impl ResultWriter {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            results_dir: config.results_dir.clone(),
            max_records_per_file: config.max_records_per_file,
            pretty: config.pretty,
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Write `records` as `{site}.json`, or as `{site}-1.json`, `{site}-2.json`, ... when
    /// they exceed the per-file cap. Nothing is written for an empty list.
    ///
    /// Result files of this site left by an earlier run and not rewritten now are removed.
    pub async fn write_site(
        &self,
        site: &str,
        mut records: Vec<ProductRecord>,
        reindex: bool,
    ) -> ScrapeResult<WriteSummary> {
        if records.is_empty() {
            info!("No records for {}, nothing written", site);
            return Ok(WriteSummary::default());
        }

        let start_time = std::time::Instant::now();
        crate::utils::ensure_dir(&self.results_dir).await?;

        if reindex {
            reindex_records(&mut records);
        }

        let mut files = Vec::new();
        for (path, chunk) in self.plan_files(site, &records) {
            let file_size_bytes = json_exporter::write_json(chunk, &path, self.pretty).await?;
            info!(
                "Saved {} records to {} ({})",
                chunk.len(),
                path.display(),
                crate::utils::format_file_size(file_size_bytes)
            );
            files.push(FileStats {
                path,
                record_count: chunk.len(),
                file_size_bytes,
            });
        }

        let keep: Vec<&Path> = files.iter().map(|f| f.path.as_path()).collect();
        self.remove_stale_files(site, &keep).await?;

        Ok(WriteSummary {
            records: records.len(),
            files,
            export_duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    async fn remove_stale_files(&self, site: &str, keep: &[&Path]) -> ScrapeResult<()> {
        let mut entries = tokio::fs::read_dir(&self.results_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let owned = entry
                .file_name()
                .to_str()
                .map_or(false, |name| is_site_file(site, name));
            if owned && !keep.contains(&path.as_path()) {
                tokio::fs::remove_file(&path).await?;
                debug!("Removed stale result file {}", path.display());
            }
        }
        Ok(())
    }

    /// Target path of each chunk
    fn plan_files<'a>(&self, site: &str, records: &'a [ProductRecord]) -> Vec<(PathBuf, &'a [ProductRecord])> {
        let cap = self.max_records_per_file;
        if cap == 0 || records.len() <= cap {
            return vec![(self.results_dir.join(format!("{}.json", site)), records)];
        }

        records
            .chunks(cap)
            .enumerate()
            .map(|(i, chunk)| (self.results_dir.join(format!("{}-{}.json", site, i + 1)), chunk))
            .collect()
    }
}

/// `{site}.json` or `{site}-N.json`
fn is_site_file(site: &str, name: &str) -> bool {
    let stem = match name.strip_prefix(site).and_then(|rest| rest.strip_suffix(".json")) {
        Some(stem) => stem,
        None => return false,
    };
    stem.is_empty()
        || stem
            .strip_prefix('-')
            .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Renumber ids 1..=n in output order
pub fn reindex_records(records: &mut [ProductRecord]) {
    for (i, record) in records.iter_mut().enumerate() {
        record.id = i as u64 + 1;
    }
}
