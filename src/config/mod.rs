//! Settings and configuration module
//!
//! Provides unified configuration with:
//! - JSON loading
//! - Environment overrides for secrets
//! - Validation before any client is built

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::retry::RetryPolicy;
use crate::external_deps::scraping::{DEFAULT_COUNTRY, DEFAULT_SCRAPFLY_ENDPOINT, DEFAULT_TAGS};
use crate::modules::selection::DEFAULT_PROXY_PROVIDERS;
use crate::modules::tls::TlsPolicy;

/// Environment variable holding the scraping service API key.
pub const API_KEY_ENV: &str = "SCRAPFLY_API_KEY";
/// Environment variable overriding the provider retry budget.
pub const MAX_RETRIES_ENV: &str = "SCRAPE_DISPATCH_MAX_RETRIES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level settings consumed by [`crate::make_dispatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherSettings {
    pub scraping: ScrapingSettings,
    pub transport: TransportSettings,
    pub retry: RetrySettings,
    /// Provider identifiers routed through the scraping service.
    pub proxy_required: Vec<String>,
    /// Upper bound on in-flight dispatches per dispatcher. `None` is unbounded.
    pub max_concurrency: Option<usize>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            scraping: ScrapingSettings::default(),
            transport: TransportSettings::default(),
            retry: RetrySettings::default(),
            proxy_required: DEFAULT_PROXY_PROVIDERS.iter().map(|p| p.to_string()).collect(),
            max_concurrency: None,
        }
    }
}

impl DispatcherSettings {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.scraping.api_key = key.trim().to_string();
        }

        if let Some(raw) = lookup(MAX_RETRIES_ENV) {
            self.retry.max_retries = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "retry.max_retries",
                reason: format!("{MAX_RETRIES_ENV}={raw} is not a number"),
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraping.country.len() != 2 {
            return Err(ConfigError::Invalid {
                field: "scraping.country",
                reason: format!("expected a two letter country code, got '{}'", self.scraping.country),
            });
        }

        if url::Url::parse(&self.scraping.endpoint).is_err() {
            return Err(ConfigError::Invalid {
                field: "scraping.endpoint",
                reason: format!("'{}' is not a url", self.scraping.endpoint),
            });
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry.max_delay_ms",
                reason: "must not be lower than retry.base_delay_ms".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::Invalid {
                field: "retry.jitter",
                reason: format!("{} is outside 0.0..=1.0", self.retry.jitter),
            });
        }

        if self.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_concurrency",
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }
}

/// Scraping service credentials and job parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapingSettings {
    pub api_key: String,
    pub endpoint: String,
    pub tags: Vec<String>,
    pub asp: bool,
    pub render_js: bool,
    pub auto_scroll: bool,
    pub country: String,
    pub timeout_secs: u64,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_SCRAPFLY_ENDPOINT.into(),
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
            asp: true,
            render_js: true,
            auto_scroll: true,
            country: DEFAULT_COUNTRY.into(),
            // Rendering with auto scroll regularly takes more than a minute.
            timeout_secs: 150,
        }
    }
}

impl ScrapingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Direct path transport options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub redirect_limit: usize,
    /// Treat non-2xx responses as failures instead of delivering their body.
    pub reject_error_status: bool,
    pub tls: TlsPolicy,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: Some(30),
            user_agent: None,
            redirect_limit: 10,
            reject_error_status: false,
            tls: TlsPolicy::relaxed(),
        }
    }
}

impl TransportSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Retry budget and backoff for the scraping service path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_mirror_scraping_job() {
        let settings = DispatcherSettings::default();
        assert_eq!(settings.scraping.tags, vec!["player", "project:default"]);
        assert_eq!(settings.scraping.country, "de");
        assert!(settings.scraping.asp && settings.scraping.render_js && settings.scraping.auto_scroll);
        assert_eq!(settings.retry.max_retries, 5);
        assert!(settings.transport.tls.accept_invalid_certs);
        assert_eq!(settings.proxy_required, vec!["immoscout", "immonet"]);
        settings.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings = DispatcherSettings::from_json_str(
            r#"{
                "scraping": { "api_key": "abc", "country": "fr" },
                "retry": { "max_retries": 2, "base_delay_ms": 0, "max_delay_ms": 0 },
                "max_concurrency": 4
            }"#,
        )
        .unwrap();

        assert_eq!(settings.scraping.api_key, "abc");
        assert_eq!(settings.scraping.country, "fr");
        assert!(settings.scraping.render_js);
        assert_eq!(settings.retry.policy().max_retries, 2);
        assert_eq!(settings.max_concurrency, Some(4));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = DispatcherSettings::from_json_str(r#"{"scrapingAnt": {"apiKey": "x"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn rejects_bad_country_and_zero_concurrency() {
        let err = DispatcherSettings::from_json_str(r#"{"scraping": {"country": "deu"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "scraping.country", .. }));

        let err = DispatcherSettings::from_json_str(r#"{"max_concurrency": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_concurrency", .. }));
    }

    #[test]
    fn env_overrides_api_key_and_retries() {
        let vars = HashMap::from([
            (API_KEY_ENV, " secret "),
            (MAX_RETRIES_ENV, "3"),
        ]);
        let settings = DispatcherSettings::default()
            .apply_env_with(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.scraping.api_key, "secret");
        assert_eq!(settings.retry.max_retries, 3);
    }

    #[test]
    fn env_rejects_non_numeric_retries() {
        let err = DispatcherSettings::default()
            .apply_env_with(|name| (name == MAX_RETRIES_ENV).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "retry.max_retries", .. }));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("scrape-dispatch-{}.json", std::process::id()));
        fs::write(&path, r#"{"proxy_required": ["wg-gesucht"]}"#).unwrap();
        let settings = DispatcherSettings::from_path(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(settings.proxy_required, vec!["wg-gesucht"]);
    }
}
