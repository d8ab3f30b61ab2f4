//! Cross-cutting services module
//!
//! Path selection, transport security, events, and metrics used by the
//! dispatcher.

pub mod events;
pub mod metrics;
pub mod selection;
pub mod tls;

// Re-export commonly used types
pub use events::{
    AttemptFailedEvent, CompletedEvent, DispatchEvent, EventDispatcher, EventHandler,
    LoggingHandler, MetricsHandler, RetryEvent, StartedEvent,
};
pub use metrics::{GlobalStats, MetricsCollector, MetricsSnapshot, ProviderStats};
pub use selection::{ProviderSelector, StaticProviderSet, needs_proxy_provider};
pub use tls::TlsPolicy;
