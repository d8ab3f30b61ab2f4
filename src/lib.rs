//! # scrape-dispatch
//!
//! Decides per request how the raw HTML of a listing page is retrieved:
//! either a direct GET with fixed headers and a cookie string, or a job on a
//! rendering scraping service (Scrapfly) for sites that only answer real
//! browsers.
//!
//! ## Features
//!
//! - Provider selection through a pluggable policy
//! - Direct fetching with a per-client TLS policy
//! - Scrapfly integration with anti-bot bypass, JS rendering and auto scroll
//! - Bounded retries with exponential backoff and jitter
//! - Exactly one outcome per dispatch; failures are an empty body
//! - Events and metrics that keep failure kinds apart
//!
//! ## Example
//!
//! ```no_run
//! use scrape_dispatch::{DispatcherSettings, RequestContext, make_dispatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = DispatcherSettings::default().apply_env()?;
//!     let dispatcher = make_dispatcher("immoscout", [("Accept-Language", "de-DE")], &settings)?;
//!     let outcome = dispatcher
//!         .dispatch(&RequestContext::parse("https://www.immobilienscout24.de/Suche/de/berlin/berlin/wohnung-mieten")?)
//!         .await;
//!     if outcome.is_empty() {
//!         eprintln!("nothing fetched ({:?})", outcome.kind);
//!     }
//!     Ok(())
//! }
//! ```

mod dispatcher;

pub mod config;
pub mod core;
pub mod external_deps;
pub mod modules;

pub use crate::dispatcher::{
    DispatchError,
    DispatchResult,
    DispatcherBuilder,
    RequestDispatcher,
    make_dispatcher,
};

pub use crate::config::{
    ConfigError,
    DispatcherSettings,
    RetrySettings,
    ScrapingSettings,
    TransportSettings,
};

pub use crate::core::{
    DirectHttpClient,
    DirectRequest,
    DirectResponse,
    DispatchPath,
    FetchOutcome,
    HttpClientError,
    OutcomeKind,
    PageBody,
    ProviderId,
    RequestContext,
    ReqwestHttpClient,
    RetryPolicy,
};

pub use crate::external_deps::scraping::{
    ScrapeError,
    ScrapeRequest,
    ScrapeResult,
    ScrapeTemplate,
    ScrapedPage,
    ScrapflyProvider,
    ScrapingProvider,
};

pub use crate::modules::{
    DispatchEvent,
    EventDispatcher,
    EventHandler,
    LoggingHandler,
    MetricsCollector,
    MetricsHandler,
    MetricsSnapshot,
    ProviderSelector,
    StaticProviderSet,
    TlsPolicy,
    needs_proxy_provider,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
