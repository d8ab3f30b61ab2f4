//! Core data structures shared by the dispatcher and its two fetch paths.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use url::Url;

/// Opaque identifier of the upstream site a dispatcher targets.
///
/// Normalized to lowercase so lookups in provider sets are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Per-request input. Only `url` is read; `extra` is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub url: Url,
    pub extra: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            extra: HashMap::new(),
        }
    }

    /// Parse `url` into a context.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Page content delivered to the caller. `Empty` doubles as the failure signal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageBody {
    Text(String),
    #[default]
    Empty,
}

impl PageBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, PageBody::Empty)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            PageBody::Text(text) => Some(text),
            PageBody::Empty => None,
        }
    }

    /// Consume into a string; `Empty` becomes `""`.
    pub fn into_text(self) -> String {
        match self {
            PageBody::Text(text) => text,
            PageBody::Empty => String::new(),
        }
    }
}

/// Which backend served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchPath {
    Direct,
    Provider,
}

impl fmt::Display for DispatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPath::Direct => f.write_str("direct"),
            DispatchPath::Provider => f.write_str("provider"),
        }
    }
}

/// Diagnostic classification of an outcome. Callers that only care about the
/// original contract can ignore it and look at [`PageBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Fetched,
    TransportFailure,
    ProviderExhausted,
}

impl OutcomeKind {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::Fetched)
    }
}

/// The single result delivered for each dispatch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub body: PageBody,
    pub kind: OutcomeKind,
    pub path: DispatchPath,
    /// Attempts issued, including the first.
    pub attempts: u32,
    pub elapsed: Duration,
    pub context: RequestContext,
}

impl FetchOutcome {
    pub(crate) fn fetched(
        context: RequestContext,
        path: DispatchPath,
        body: String,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            body: PageBody::Text(body),
            kind: OutcomeKind::Fetched,
            path,
            attempts,
            elapsed,
            context,
        }
    }

    pub(crate) fn empty(
        context: RequestContext,
        path: DispatchPath,
        kind: OutcomeKind,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            body: PageBody::Empty,
            kind,
            path,
            attempts,
            elapsed,
            context,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_is_case_insensitive() {
        assert_eq!(ProviderId::new(" ImmoScout "), ProviderId::new("immoscout"));
        assert_eq!(ProviderId::from("KLEINANZEIGEN").as_str(), "kleinanzeigen");
    }

    #[test]
    fn empty_body_converts_to_empty_string() {
        assert_eq!(PageBody::Empty.into_text(), "");
        assert_eq!(PageBody::Text("<html>".into()).text(), Some("<html>"));
        assert!(PageBody::default().is_empty());
    }

    #[test]
    fn context_keeps_extra_metadata() {
        let ctx = RequestContext::parse("https://example.com/listing/1")
            .unwrap()
            .with_extra("job", "42");
        assert_eq!(ctx.url.path(), "/listing/1");
        assert_eq!(ctx.extra.get("job").map(String::as_str), Some("42"));
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(RequestContext::parse("not a url").is_err());
    }
}
