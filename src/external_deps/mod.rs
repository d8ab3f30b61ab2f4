//! Integrations that rely on third-party services.
//!
//! This module groups adapters for rendering scraping services that bridge
//! the dispatcher's provider path with the outside world.

pub mod scraping;

pub use scraping::{
    ScrapeError, ScrapeRequest, ScrapeResult, ScrapeTemplate, ScrapedPage, ScrapflyProvider,
    ScrapingProvider,
};
