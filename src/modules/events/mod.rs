//! Event system around dispatch activity.
//!
//! Provides hooks for metrics, logging, and custom reactions without
//! changing what the caller receives.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::metrics::MetricsCollector;
use crate::core::{DispatchPath, OutcomeKind, ProviderId};

#[derive(Debug, Clone)]
pub struct StartedEvent {
    pub provider: ProviderId,
    pub url: Url,
    pub path: DispatchPath,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AttemptFailedEvent {
    pub provider: ProviderId,
    pub url: Url,
    pub path: DispatchPath,
    /// 1-based attempt number that failed.
    pub attempt: u32,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub provider: ProviderId,
    pub url: Url,
    /// 1-based retry number about to run.
    pub retry: u32,
    pub max_retries: u32,
    pub scheduled_after: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompletedEvent {
    pub provider: ProviderId,
    pub url: Url,
    pub path: DispatchPath,
    pub kind: OutcomeKind,
    pub attempts: u32,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Started(StartedEvent),
    AttemptFailed(AttemptFailedEvent),
    Retry(RetryEvent),
    Completed(CompletedEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DispatchEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(&self, event: DispatchEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Started(started) => {
                log::debug!("-> [{}] {} via {}", started.provider, started.url, started.path);
            }
            DispatchEvent::AttemptFailed(failed) => {
                log::debug!(
                    "attempt {} for [{}] {} failed: {}",
                    failed.attempt,
                    failed.provider,
                    failed.url,
                    failed.error
                );
            }
            DispatchEvent::Retry(retry) => {
                log::debug!(
                    "retry {}/{} for [{}] {} after {:.2}s",
                    retry.retry,
                    retry.max_retries,
                    retry.provider,
                    retry.url,
                    retry.scheduled_after.as_secs_f64()
                );
            }
            DispatchEvent::Completed(done) => {
                log::debug!(
                    "<- [{}] {} via {} -> {:?} in {} attempt(s) ({:.2}s)",
                    done.provider,
                    done.url,
                    done.path,
                    done.kind,
                    done.attempts,
                    done.latency.as_secs_f64()
                );
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Retry(retry) => {
                self.metrics.record_retry(retry.provider.as_str());
            }
            DispatchEvent::Completed(done) => {
                self.metrics
                    .record_outcome(done.provider.as_str(), done.kind, done.latency);
            }
            _ => {}
        }
    }
}
