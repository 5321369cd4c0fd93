use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::config::{AppConfig, ScraperKind, SiteConfig};
use crate::error::{ContextualError, ErrorContext, ScrapeResult};
use crate::export::ResultWriter;
use crate::logging::{LogContext, PerformanceLogger, RunIdGenerator};
use crate::scraper::browser::BrowserSession;
use crate::scraper::pagination::{self, PaginationSummary, StopReason};
use crate::scraper::{image, ContextOptions, PageDriver, PageFactory, ProductRecord, ScrapeContext, WaitUntil};
use crate::{log_error, log_info, log_warn};

/// Result of one site
#[derive(Debug, Clone, Serialize)]
pub struct SiteOutcome {
    pub site: String,
    pub url: String,
    pub http_status: Option<u16>,
    pub records_written: usize,
    pub files: Vec<PathBuf>,
    pub pages_visited: u32,
    pub stop_reason: Option<StopReason>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl SiteOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of every attempted site, in run order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub sites: Vec<SiteOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.sites.iter().filter(|s| s.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.sites.len() - self.succeeded()
    }

    /// True only when sites were attempted and none of them worked
    pub fn all_failed(&self) -> bool {
        !self.sites.is_empty() && self.succeeded() == 0
    }
}

/// What a site produced before writing
struct Collected {
    http_status: Option<u16>,
    records: Vec<ProductRecord>,
    summary: PaginationSummary,
}

/// Runs configured sites one after another, each in its own browsing context
pub struct ScrapeRunner<'a, F: PageFactory> {
    config: &'a AppConfig,
    factory: &'a F,
    writer: ResultWriter,
    run_id: String,
}

impl<'a, F: PageFactory> ScrapeRunner<'a, F> {
    pub fn new(config: &'a AppConfig, factory: &'a F) -> Self {
        Self {
            config,
            factory,
            writer: ResultWriter::new(&config.output),
            run_id: RunIdGenerator::generate(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Scrape the named sites, or every active site when `filter` is empty.
    /// A failing site is reported and the run moves on.
    pub async fn run_all(&self, filter: &[String]) -> Result<RunReport> {
        let sites = if filter.is_empty() {
            self.config.active_sites()
        } else {
            self.config.select_sites(filter)?
        };

        info!("Run {}: {} site(s), results in {}", self.run_id, sites.len(), self.writer.results_dir().display());

        let mut outcomes = Vec::with_capacity(sites.len());
        for (name, site) in sites {
            outcomes.push(self.run_site(name, site).await);
        }

        let report = RunReport {
            run_id: self.run_id.clone(),
            sites: outcomes,
        };
        info!("Run {} finished: {} succeeded, {} failed", report.run_id, report.succeeded(), report.failed());
        Ok(report)
    }

    /// One site inside its error boundary
    pub async fn run_site(&self, name: &str, site: &SiteConfig) -> SiteOutcome {
        let log = LogContext::new("runner", "scrape_site")
            .with_run_id(&self.run_id)
            .with_site(name)
            .with_url(&site.url);
        let perf = PerformanceLogger::new(log.clone());

        let mut outcome = SiteOutcome {
            site: name.to_string(),
            url: site.url.clone(),
            http_status: None,
            records_written: 0,
            files: Vec::new(),
            pages_visited: 0,
            stop_reason: None,
            duration_ms: 0,
            error: None,
        };

        log_info!(log, format!("Scraping {} ({} scraper)", name, site.kind));

        let result = async {
            let collected = self.collect_site(site, log.clone()).await?;
            outcome.http_status = collected.http_status;
            outcome.pages_visited = collected.summary.pages_visited;
            outcome.stop_reason = Some(collected.summary.stop_reason);

            let mut records = collected.records;
            if let Some(limit) = site.effective_limit(self.config.global.product_limit) {
                records.truncate(limit);
            }
            self.writer
                .write_site(name, records, self.config.global.reindex_products)
                .await
        }
        .await;

        outcome.duration_ms = perf.elapsed().as_millis() as u64;
        match result {
            Ok(summary) => {
                outcome.records_written = summary.records;
                outcome.files = summary.files.into_iter().map(|f| f.path).collect();
                perf.finish_with_status(&format!("{}: {} records written", name, outcome.records_written), "success");
            }
            Err(error) => {
                let contextual = ContextualError::new(
                    error,
                    ErrorContext::new("scrape_site", "runner")
                        .with_site(name)
                        .with_url(&site.url)
                        .with_data("scraper", site.kind.to_string()),
                );
                let log = log.clone()
                    .with_error_category(contextual.error.category())
                    .with_bool_field("transient", contextual.error.is_transient());
                log_error!(log, &contextual, format!("Failed to scrape {}", name));
                outcome.error = Some(contextual.error.to_string());
                perf.finish_with_error(&format!("{} failed", name), &contextual.error);
            }
        }

        outcome
    }

    /// Open a context, navigate, extract. The page is closed whatever happened.
    async fn collect_site(&self, site: &SiteConfig, log: LogContext) -> ScrapeResult<Collected> {
        let page = self.factory.open_page(&ContextOptions::default()).await?;
        let mut ctx = ScrapeContext::new(log.clone(), &self.config.browser);

        let result = self.collect_on_page(&page, site, &mut ctx).await;

        if let Err(e) = page.close().await {
            log_warn!(log, format!("Failed to close page: {}", e));
        }
        result
    }

    async fn collect_on_page(
        &self,
        page: &F::Page,
        site: &SiteConfig,
        ctx: &mut ScrapeContext,
    ) -> ScrapeResult<Collected> {
        let http_status = page
            .goto(
                &site.url,
                WaitUntil::for_site(site.wait_for_network_idle),
                self.config.browser.navigation_timeout_ms,
            )
            .await?;

        let limit = site.effective_limit(self.config.global.product_limit);
        let (records, summary) = match site.kind {
            ScraperKind::Standard => pagination::collect(page, site, limit, ctx).await?,
            ScraperKind::Image => {
                let records = image::scrape(page, ctx).await?;
                (records, PaginationSummary { pages_visited: 1, stop_reason: StopReason::Disabled })
            }
        };

        Ok(Collected { http_status, records, summary })
    }
}

/// Launch a browser, run the sites, close the browser
pub async fn run_with_browser(config: &AppConfig, filter: &[String]) -> Result<RunReport> {
    let session = BrowserSession::launch(&config.browser).await?;
    let report = ScrapeRunner::new(config, &session).run_all(filter).await;
    session.close().await;
    report
}
