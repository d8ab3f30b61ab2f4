//! Scraping service integrations.
//!
//! These adapters give the dispatcher a unified interface to rendering
//! scraping services so the provider path stays agnostic of vendor-specific
//! request formats.

mod scrapfly;

pub use scrapfly::{DEFAULT_SCRAPFLY_ENDPOINT, ScrapflyProvider};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::config::ScrapingSettings;

pub const DEFAULT_TAGS: [&str; 2] = ["player", "project:default"];
pub const DEFAULT_COUNTRY: &str = "de";

/// Job submitted to a scraping service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub url: Url,
    pub tags: Vec<String>,
    /// Anti scraping protection bypass.
    pub asp: bool,
    pub render_js: bool,
    pub auto_scroll: bool,
    pub country: String,
}

impl ScrapeRequest {
    pub fn new(url: Url) -> Self {
        ScrapeTemplate::default().request_for(url)
    }
}

/// Fixed job parameters applied to every URL a dispatcher scrapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTemplate {
    pub tags: Vec<String>,
    pub asp: bool,
    pub render_js: bool,
    pub auto_scroll: bool,
    pub country: String,
}

impl Default for ScrapeTemplate {
    fn default() -> Self {
        Self {
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
            asp: true,
            render_js: true,
            auto_scroll: true,
            country: DEFAULT_COUNTRY.into(),
        }
    }
}

impl ScrapeTemplate {
    pub fn from_settings(settings: &ScrapingSettings) -> Self {
        Self {
            tags: settings.tags.clone(),
            asp: settings.asp,
            render_js: settings.render_js,
            auto_scroll: settings.auto_scroll,
            country: settings.country.clone(),
        }
    }

    pub fn request_for(&self, url: Url) -> ScrapeRequest {
        ScrapeRequest {
            url,
            tags: self.tags.clone(),
            asp: self.asp,
            render_js: self.render_js,
            auto_scroll: self.auto_scroll,
            country: self.country.clone(),
        }
    }
}

/// Content returned by a successful scrape.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub content: String,
    pub status: Option<u16>,
    pub metadata: HashMap<String, String>,
}

impl ScrapedPage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn insert_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Common result type returned by scraping providers.
pub type ScrapeResult = Result<ScrapedPage, ScrapeError>;

/// Shared interface implemented by scraping vendors.
#[async_trait]
pub trait ScrapingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn scrape(&self, request: &ScrapeRequest) -> ScrapeResult;
}

/// Errors surfaced by scraping providers.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("scraping provider misconfigured: {0}")]
    Configuration(String),
    #[error("scraping provider request failed: {0}")]
    Transport(String),
    #[error("scraping provider rejected the job ({code}): {message}")]
    Provider { code: String, message: String },
    #[error("scraping timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected scraping response: {0}")]
    Decode(String),
}
