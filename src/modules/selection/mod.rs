//! Provider selection policy.
//!
//! Decides whether a provider's pages must go through the scraping service or
//! can be fetched directly.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::core::ProviderId;

/// Providers whose pages are only served to a rendering browser.
pub const DEFAULT_PROXY_PROVIDERS: [&str; 2] = ["immoscout", "immonet"];

static DEFAULT_SET: Lazy<StaticProviderSet> =
    Lazy::new(|| StaticProviderSet::new(DEFAULT_PROXY_PROVIDERS));

/// Policy deciding which path a provider takes. Must be pure and infallible.
pub trait ProviderSelector: Send + Sync {
    fn needs_proxy_provider(&self, provider: &ProviderId) -> bool;
}

/// Membership set of providers requiring the scraping service.
///
/// Anything not listed is fetched directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticProviderSet {
    members: HashSet<ProviderId>,
}

impl StaticProviderSet {
    pub fn new<I>(providers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ProviderId>,
    {
        Self {
            members: providers.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in set.
    pub fn builtin() -> Self {
        DEFAULT_SET.clone()
    }

    pub fn insert(&mut self, provider: impl Into<ProviderId>) {
        self.members.insert(provider.into());
    }

    pub fn contains(&self, provider: &ProviderId) -> bool {
        self.members.contains(provider)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl ProviderSelector for StaticProviderSet {
    fn needs_proxy_provider(&self, provider: &ProviderId) -> bool {
        self.contains(provider)
    }
}

/// Free-function form of the policy over the built-in set.
pub fn needs_proxy_provider(provider: &ProviderId) -> bool {
    DEFAULT_SET.contains(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_routes_known_sites() {
        assert!(needs_proxy_provider(&"immoscout".into()));
        assert!(needs_proxy_provider(&"Immonet".into()));
        assert!(!needs_proxy_provider(&"kleinanzeigen".into()));
        assert!(!needs_proxy_provider(&"".into()));
    }

    #[test]
    fn custom_set_is_independent_of_builtin() {
        let mut set = StaticProviderSet::new(["wg-gesucht"]);
        assert!(set.needs_proxy_provider(&"wg-gesucht".into()));
        assert!(!set.needs_proxy_provider(&"immoscout".into()));

        set.insert("immowelt");
        assert_eq!(set.len(), 2);
        assert!(StaticProviderSet::default().is_empty());
    }

    #[test]
    fn decision_is_deterministic() {
        let set = StaticProviderSet::builtin();
        let provider = ProviderId::new("unknown-provider");
        let first = set.needs_proxy_provider(&provider);
        assert!((0..100).all(|_| set.needs_proxy_provider(&provider) == first));
    }
}
