use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use shopscrape::config::{AppConfig, ConfigOverrides, LoggingConfig, Viewport};
use shopscrape::core::{run_with_browser, RunReport};
use shopscrape::logging::{init_logging, LogContext, RunIdGenerator};
use shopscrape::scraper::browser::BrowserSession;
use shopscrape::tools::{
    self, performance, request_monitor, screenshot, visual_diff, MonitorOptions, PerformanceOptions,
    ScreenshotOptions, Throttling, VisualDiffOptions,
};
use shopscrape::utils::{format_duration, parse_http_url};

#[derive(Parser)]
#[command(name = "shopscrape")]
#[command(about = "Configuration-driven product scraper with browser side tools")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,
}

/// Page size options shared by the screenshot tools
#[derive(Args, Clone)]
struct PageArgs {
    #[arg(short, long, help = "Capture only the element matching this CSS selector")]
    selector: Option<String>,

    #[arg(long, default_value_t = 2000, help = "Extra wait after load, in milliseconds")]
    wait_ms: u64,

    #[arg(short, long, help = "Emulate a device, e.g. \"iPhone 12\"")]
    device: Option<String>,

    #[arg(long, requires = "height", help = "Viewport width")]
    width: Option<u32>,

    #[arg(long, requires = "width", help = "Viewport height")]
    height: Option<u32>,
}

impl PageArgs {
    fn viewport(&self) -> Option<Viewport> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(Viewport { width, height }),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the configured sites
    Scrape {
        #[arg(short, long = "site", help = "Only scrape this site (repeatable)")]
        sites: Vec<String>,

        #[arg(short, long, help = "Results directory")]
        results_dir: Option<PathBuf>,
    },

    /// List configured sites
    Sites,

    /// Take a screenshot of a page or element
    Screenshot {
        #[arg(help = "Page URL")]
        url: String,

        #[arg(long, help = "Capture the viewport instead of the full page")]
        viewport_only: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Measure page load performance
    Perf {
        #[arg(help = "Page URL")]
        url: String,

        #[arg(short, long, default_value_t = 3, help = "Number of runs to average")]
        runs: u32,

        #[arg(short, long, help = "Emulate a device")]
        device: Option<String>,

        #[arg(short, long, help = "Network profile: slow3g or fast3g")]
        throttling: Option<Throttling>,
    },

    /// Compare screenshots of two pages
    Diff {
        #[arg(help = "Baseline URL")]
        baseline: String,

        #[arg(help = "URL to compare against the baseline")]
        compare: String,

        #[arg(short, long, default_value_t = 0.1, help = "Colour threshold between 0 and 1")]
        threshold: f64,

        #[arg(long, help = "Count anti-aliased pixels as differences")]
        include_aa: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Record the AJAX requests a page makes
    Monitor {
        #[arg(help = "Page URL")]
        url: String,

        #[arg(short, long, default_value_t = 10_000, help = "Listening time after load, in milliseconds")]
        wait_ms: u64,
    },

    /// Write the default configuration file
    InitConfig {
        #[arg(default_value = "shopscrape.toml", help = "Destination path")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        start_logging(&LoggingConfig::default(), cli.verbose)?;
        AppConfig::default().save_to(path).await?;
        println!("Default configuration written to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = AppConfig::load(cli.config.as_deref()).await?;
    ConfigOverrides::apply(&mut config);
    start_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Scrape { sites, results_dir } => {
            if let Some(dir) = results_dir {
                config.output.results_dir = dir;
            }
            let report = run_with_browser(&config, &sites).await?;
            print_run_summary(&report);
            if report.all_failed() {
                error!("Every site failed");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Sites => list_sites(&config),
        Commands::Screenshot { url, viewport_only, page } => {
            parse_http_url(&url)?;
            let mut options = ScreenshotOptions::new(url);
            options.full_page = !viewport_only;
            options.selector = page.selector.clone();
            options.wait_ms = page.wait_ms;
            options.device = page.device.clone();
            options.viewport = page.viewport();

            let session = BrowserSession::launch(&config.browser).await?;
            let result = screenshot::capture(&session, &options).await;
            session.close().await;
            println!("Screenshot saved to {}", result?.display());
        }
        Commands::Perf { url, runs, device, throttling } => {
            parse_http_url(&url)?;
            let mut options = PerformanceOptions::new(url);
            options.runs = runs;
            options.device = device;
            options.throttling = throttling;

            let session = BrowserSession::launch(&config.browser).await?;
            let result = performance::measure(&session, &options).await;
            session.close().await;
            let (report, path) = result?;
            performance::print_summary(&report);
            println!("\nReport saved to {}", path.display());
        }
        Commands::Diff { baseline, compare, threshold, include_aa, page } => {
            parse_http_url(&baseline)?;
            parse_http_url(&compare)?;
            let mut options = VisualDiffOptions::new(baseline, compare);
            options.threshold = threshold;
            options.include_aa = include_aa;
            options.selector = page.selector.clone();
            options.wait_ms = page.wait_ms;
            options.device = page.device.clone();
            options.viewport = page.viewport();

            let session = BrowserSession::launch(&config.browser).await?;
            let result = visual_diff::run(&session, &options).await;
            session.close().await;
            let (report, path) = result?;
            if report.result.identical {
                println!("No visual differences");
            } else {
                println!(
                    "{} of {} pixels differ ({:.2}%), diff image: {}",
                    report.result.diff_pixels,
                    report.result.total_pixels,
                    report.result.diff_percentage,
                    report.files.diff.display()
                );
            }
            println!("Report saved to {}", path.display());
        }
        Commands::Monitor { url, wait_ms } => {
            parse_http_url(&url)?;
            let mut options = MonitorOptions::new(url);
            options.wait_ms = wait_ms;

            let session = BrowserSession::launch(&config.browser).await?;
            let result = request_monitor::monitor(&session, &options).await;
            session.close().await;
            let (report, path) = result?;
            request_monitor::print_summary(&report);
            println!("\nFull data saved to {}", path.display());
        }
        // Written before the configuration is loaded
        Commands::InitConfig { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn start_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let mut logging = logging.clone();
    if verbose {
        logging.level = "debug".to_string();
    }
    init_logging(&logging)?;

    let context = LogContext::new("main", "startup")
        .with_run_id(RunIdGenerator::generate())
        .with_string_field("version", env!("CARGO_PKG_VERSION"));
    shopscrape::log_debug!(context, "shopscrape starting up");
    info!("shopscrape v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn list_sites(config: &AppConfig) {
    let rows: Vec<Vec<String>> = config
        .sites
        .iter()
        .map(|(name, site)| {
            vec![
                name.clone(),
                format!("{:?}", site.kind).to_lowercase(),
                site.url.clone(),
                if config.is_ignored(name) { "ignored" } else { "active" }.to_string(),
            ]
        })
        .collect();
    tools::print_table(&["Site", "Kind", "URL", "State"], &rows);
}

fn print_run_summary(report: &RunReport) {
    let rows: Vec<Vec<String>> = report
        .sites
        .iter()
        .map(|outcome| {
            vec![
                outcome.site.clone(),
                if outcome.succeeded() { "ok" } else { "failed" }.to_string(),
                outcome.records_written.to_string(),
                outcome.pages_visited.to_string(),
                outcome.stop_reason.as_ref().map(|r| r.to_string()).unwrap_or_default(),
                format_duration(std::time::Duration::from_millis(outcome.duration_ms)),
                outcome.error.clone().unwrap_or_default(),
            ]
        })
        .collect();

    println!("\nRun {}:", report.run_id);
    tools::print_table(&["Site", "Result", "Records", "Pages", "Stopped", "Time", "Error"], &rows);
    println!("{} succeeded, {} failed", report.succeeded(), report.failed());
}
