use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod sites;

pub use sites::{PaginationConfig, ScraperKind, SelectorChain, SelectorSet, SiteConfig};

pub use crate::logging::LoggingConfig;
use crate::error::ScrapeError;

/// Name of the configuration file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "shopscrape.toml";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Maximum products kept per site; 0 disables the cap
    pub product_limit: usize,
    /// Renumber ids 1..n after pages are concatenated
    pub reindex_products: bool,
    /// Sites skipped by `scrape` unless asked for by name
    pub ignore: Vec<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            product_limit: 30,
            reindex_products: true,
            ignore: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub navigation_timeout_ms: u64,
    pub wait_selector_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_ms: 60_000,
            wait_selector_timeout_ms: 60_000,
            user_agent: None,
            viewport: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    /// Split a site's output into numbered files above this many records; 0 never splits
    pub max_records_per_file: usize,
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            max_records_per_file: 0,
            pretty: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig {
                ignore: vec!["doughnut".to_string()],
                ..GlobalConfig::default()
            },
            browser: BrowserConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
            sites: default_sites(),
        }
    }
}

fn default_sites() -> BTreeMap<String, SiteConfig> {
    let mut sites = BTreeMap::new();

    sites.insert(
        "usasnackshop".to_string(),
        SiteConfig {
            url: "https://usasnackshop.com/collections/all".to_string(),
            kind: ScraperKind::Standard,
            wait_selector: Some("#product-grid".to_string()),
            wait_time_ms: Some(8000),
            auto_scroll: true,
            wait_for_network_idle: false,
            product_limit: None,
            pagination: Some(PaginationConfig {
                enabled: true,
                next_selector: Some(".pagination__item-arrow.link".to_string()),
                page_selector: Some(
                    ".pagination__item:not(.pagination__item--current):not(.pagination__item-arrow)".to_string(),
                ),
                max_pages: Some(14),
                wait_ms: None,
            }),
            selectors: Some(SelectorSet {
                product: ".grid__item".into(),
                name: ".full-unstyled-link".into(),
                price: ".price-item.price-item--regular".into(),
                image: ".media.media--transparent.media--hover-effect img".into(),
                link: None,
            }),
        },
    );

    sites.insert(
        "doughnut".to_string(),
        SiteConfig {
            url: "https://www.doughnut.com.tw/v2/official/SalePageCategory/445264?sortMode=PageView".to_string(),
            kind: ScraperKind::Standard,
            wait_selector: Some(".column-grid-container__column".to_string()),
            wait_time_ms: Some(8000),
            auto_scroll: true,
            wait_for_network_idle: false,
            product_limit: None,
            pagination: None,
            selectors: Some(SelectorSet {
                product: ".column-grid-container__column".into(),
                name: "[data-qe-id='body-meta-field-text']".into(),
                price: "[data-qe-id='body-price-text']".into(),
                image: ".product-card__vertical__media-tall".into(),
                link: Some("a.sc-hqiKlG".into()),
            }),
        },
    );

    sites
}

impl AppConfig {
    /// Load configuration: explicit path, `./shopscrape.toml`, the platform config file,
    /// else defaults (saved to the platform location for later editing)
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path).await;
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load_from_file(&local).await;
        }

        let config_path = get_config_path();
        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            info!("No configuration file found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path).await {
                warn!("Could not save default configuration: {}", e);
            }
            Ok(config)
        }
    }

    /// Load configuration from specific file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content).map_err(|e| ScrapeError::InvalidConfig {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML
    pub async fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.browser.navigation_timeout_ms == 0 {
            return Err(ScrapeError::config("browser.navigation_timeout_ms must be > 0"));
        }

        for name in &self.global.ignore {
            if !self.sites.contains_key(name) {
                warn!("Ignore list names unknown site '{}'", name);
            }
        }

        for (name, site) in &self.sites {
            validate_site(name, site)?;
        }

        Ok(())
    }

    /// Sites `scrape` runs by default: name order, ignore list removed
    pub fn active_sites(&self) -> Vec<(&str, &SiteConfig)> {
        self.sites
            .iter()
            .filter(|(name, _)| !self.is_ignored(name))
            .map(|(name, site)| (name.as_str(), site))
            .collect()
    }

    /// Sites picked explicitly by name; unknown names are an error
    pub fn select_sites<'a>(&'a self, names: &[String]) -> Result<Vec<(&'a str, &'a SiteConfig)>, ScrapeError> {
        names
            .iter()
            .map(|name| {
                self.sites
                    .get_key_value(name)
                    .map(|(k, v)| (k.as_str(), v))
                    .ok_or_else(|| ScrapeError::UnknownSite { site: name.clone() })
            })
            .collect()
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.global.ignore.iter().any(|ignored| ignored == name)
    }
}

fn validate_site(name: &str, site: &SiteConfig) -> Result<(), ScrapeError> {
    let invalid = |message: String| ScrapeError::config(format!("site '{}': {}", name, message));

    crate::utils::parse_http_url(&site.url).map_err(|_| invalid(format!("invalid url '{}'", site.url)))?;

    match (&site.kind, &site.selectors) {
        (ScraperKind::Standard, None) => return Err(invalid("standard sites need a selectors table".into())),
        (_, Some(selectors)) => {
            for (field, chain) in selectors.chains() {
                if chain.is_empty() {
                    return Err(invalid(format!("selector '{}' is empty", field)));
                }
            }
        }
        _ => {}
    }

    if let Some(pagination) = site.active_pagination() {
        if pagination.max_pages() == 0 {
            return Err(invalid("pagination.max_pages must be >= 1".into()));
        }
        if pagination.next_selector.is_none() && pagination.page_selector.is_none() {
            return Err(invalid("pagination needs next_selector or page_selector".into()));
        }
    }

    Ok(())
}

/// Get the platform configuration file path
fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "shopscrape", "shopscrape")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`
    pub fn apply_from(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("SHOPSCRAPE_RESULTS_DIR") {
            config.output.results_dir = PathBuf::from(dir);
        }

        if let Some(limit) = lookup("SHOPSCRAPE_PRODUCT_LIMIT").and_then(|v| v.parse::<usize>().ok()) {
            config.global.product_limit = limit;
        }

        if let Some(headless) = lookup("SHOPSCRAPE_HEADLESS") {
            config.browser.headless = headless.to_lowercase() != "false";
        }

        if let Some(level) = lookup("SHOPSCRAPE_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r##"
[global]
product_limit = 12
ignore = ["slow"]

[output]
results_dir = "out"
max_records_per_file = 50

[sites.snacks]
url = "https://snacks.example.com/all"
wait_selector = "#grid"
auto_scroll = true

[sites.snacks.pagination]
next_selector = "a.next"
max_pages = 3

[sites.snacks.selectors]
product = ".card"
name = [".card__title", "h3"]
price = ".price"
image = "img"

[sites.slow]
url = "https://slow.example.com"
kind = "image"
"##;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.global.product_limit, 30);
        assert!(config.global.reindex_products);
        assert_eq!(
            config.active_sites().iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec!["usasnackshop"]
        );
    }

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.global.product_limit, 12);
        assert_eq!(config.output.max_records_per_file, 50);
        assert!(config.output.pretty);

        let snacks = &config.sites["snacks"];
        assert_eq!(snacks.active_pagination().unwrap().max_pages(), 3);
        assert_eq!(snacks.selectors.as_ref().unwrap().name.selectors(), vec![".card__title", "h3"]);
        assert_eq!(config.sites["slow"].kind, ScraperKind::Image);

        let active: Vec<_> = config.active_sites().into_iter().map(|(n, _)| n).collect();
        assert_eq!(active, vec!["snacks"]);
    }

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::from_toml(include_str!("../../shopscrape.example.toml")).unwrap();
        assert_eq!(config.sites.len(), 2);
        assert!(config.is_ignored("doughnut"));
        let doughnut = config.sites["doughnut"].selectors.as_ref().unwrap();
        assert_eq!(doughnut.name.selectors().len(), 2);
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.sites, AppConfig::default().sites);
    }

    #[test]
    fn test_validation_rejects_bad_sites() {
        let missing_selectors = r#"
[sites.a]
url = "https://a.example.com"
"#;
        assert!(AppConfig::from_toml(missing_selectors).is_err());

        let bad_url = r#"
[sites.a]
url = "a.example.com"
kind = "image"
"#;
        assert!(AppConfig::from_toml(bad_url).is_err());

        let no_controls = r#"
[sites.a]
url = "https://a.example.com"
kind = "image"
[sites.a.pagination]
max_pages = 2
"#;
        assert!(AppConfig::from_toml(no_controls).is_err());
    }

    #[test]
    fn test_select_sites() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let picked = config.select_sites(&["slow".to_string()]).unwrap();
        assert_eq!(picked[0].0, "slow");
        assert!(matches!(
            config.select_sites(&["nope".to_string()]),
            Err(ScrapeError::UnknownSite { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        let env: HashMap<&str, &str> = [
            ("SHOPSCRAPE_RESULTS_DIR", "/tmp/out"),
            ("SHOPSCRAPE_PRODUCT_LIMIT", "7"),
            ("SHOPSCRAPE_HEADLESS", "false"),
        ]
        .into_iter()
        .collect();

        ConfigOverrides::apply_from(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.output.results_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.global.product_limit, 7);
        assert!(!config.browser.headless);
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shopscrape.toml");

        AppConfig::default().save_to(&path).await.unwrap();
        let loaded = AppConfig::load(Some(path.as_path())).await.unwrap();

        assert_eq!(loaded.sites.len(), 2);
        assert!(loaded.is_ignored("doughnut"));
    }
}
