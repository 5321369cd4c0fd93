use std::fmt;
use thiserror::Error;

/// Error types for shopscrape
#[derive(Error, Debug)]
pub enum ScrapeError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid configuration file: {path}: {reason}")]
    InvalidConfig { path: String, reason: String },

    #[error("Unknown site: {site}")]
    UnknownSite { site: String },

    // Browser errors
    #[error("Browser unavailable: {message}")]
    BrowserUnavailable { message: String },

    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Navigation failed: {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {timeout_ms}ms waiting for selector: {selector}")]
    WaitTimeout { selector: String, timeout_ms: u64 },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    // Extraction errors
    #[error("Scraping error: {message}")]
    Scraping { message: String },

    #[error("Unexpected page payload: {message}")]
    Payload { message: String },

    // Output errors
    #[error("Export error: {message}")]
    Export { message: String },

    #[error("File write failed: {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    // Tool errors
    #[error("Image comparison failed: {message}")]
    ImageCompare { message: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ScrapeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a browser error
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser { message: message.into() }
    }

    /// Create a scraping error
    pub fn scraping(message: impl Into<String>) -> Self {
        Self::Scraping { message: message.into() }
    }

    /// Create an export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::InvalidConfig { .. } | Self::UnknownSite { .. } => "configuration",
            Self::BrowserUnavailable { .. } | Self::Browser { .. } => "browser",
            Self::Navigation { .. } | Self::WaitTimeout { .. } => "navigation",
            Self::ElementNotFound { .. } | Self::Scraping { .. } | Self::Payload { .. } => "scraping",
            Self::Export { .. } | Self::FileWrite { .. } => "export",
            Self::Io { .. } => "io",
            Self::ImageCompare { .. } => "tools",
            Self::InvalidUrl { .. } => "input",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether another attempt at the same site could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Navigation { .. } | Self::WaitTimeout { .. } | Self::Browser { .. }
        )
    }
}

/// Result type alias for shopscrape
pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

/// Error context for per-site failures
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub operation: String,
    pub component: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub site: Option<String>,
    pub url: Option<String>,
    pub additional_data: std::collections::BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            component: component.into(),
            timestamp: chrono::Utc::now(),
            site: None,
            url: None,
            additional_data: std::collections::BTreeMap::new(),
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }
}

/// Error with the context it was raised in
#[derive(Debug)]
pub struct ContextualError {
    pub error: ScrapeError,
    pub context: ErrorContext,
}

impl ContextualError {
    pub fn new(error: ScrapeError, context: ErrorContext) -> Self {
        Self { error, context }
    }
}

impl fmt::Display for ContextualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}::{}", self.error, self.context.component, self.context.operation)?;

        if let Some(site) = &self.context.site {
            write!(f, " [site: {}]", site)?;
        }
        for (key, value) in &self.context.additional_data {
            write!(f, " [{}: {}]", key, value)?;
        }

        Ok(())
    }
}

impl std::error::Error for ContextualError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ScrapeError>() {
            Ok(inner) => inner,
            Err(other) => Self::Internal { message: format!("{:#}", other) },
        }
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload { message: err.to_string() }
    }
}
