//! Transport abstraction for the direct fetch path.
//!
//! The dispatcher only needs a GET with headers that yields a text body, so
//! the contract stays that small. Tests substitute recording stubs.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

/// Contract for the HTTP client used by the direct path.
#[async_trait]
pub trait DirectHttpClient: Send + Sync {
    async fn get(&self, request: &DirectRequest) -> Result<DirectResponse, HttpClientError>;
}

/// Outbound GET issued by the direct path.
#[derive(Debug, Clone)]
pub struct DirectRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

impl DirectRequest {
    /// Merge `headers` with a `Cookie` header carrying `cookies`.
    ///
    /// The cookie header always wins over a caller supplied one, and is sent
    /// even when `cookies` is empty.
    pub fn new(url: Url, headers: &HeaderMap, cookies: &str) -> Result<Self, HttpClientError> {
        let mut merged = headers.clone();
        let cookie = HeaderValue::from_str(cookies)
            .map_err(|_| HttpClientError::InvalidHeader(COOKIE.to_string()))?;
        merged.insert(COOKIE, cookie);
        Ok(Self {
            url,
            headers: merged,
        })
    }
}

/// Minimal response representation returned by the transport.
#[derive(Debug, Clone)]
pub struct DirectResponse {
    pub status: u16,
    pub url: Url,
    pub body: Bytes,
}

impl DirectResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: Url },
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
}

/// Convert string pairs into a header map, rejecting invalid names or values.
pub fn header_map_from_pairs<I, K, V>(pairs: I) -> Result<HeaderMap, HttpClientError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = name.as_ref();
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HttpClientError::InvalidHeader(name.to_string()))?;
        let header_value = HeaderValue::from_str(value.as_ref())
            .map_err(|_| HttpClientError::InvalidHeader(name.to_string()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/search").unwrap()
    }

    #[test]
    fn merges_headers_with_empty_cookie() {
        let headers = header_map_from_pairs([("A", "1")]).unwrap();
        let request = DirectRequest::new(url(), &headers, "").unwrap();

        assert_eq!(request.headers.get("a").unwrap(), "1");
        assert_eq!(request.headers.get(COOKIE).unwrap(), "");
    }

    #[test]
    fn cookie_overrides_caller_cookie_header() {
        let headers = header_map_from_pairs([("Cookie", "stale=1"), ("Accept", "text/html")]).unwrap();
        let request = DirectRequest::new(url(), &headers, "session=abc").unwrap();

        assert_eq!(request.headers.get(COOKIE).unwrap(), "session=abc");
        assert_eq!(request.headers.get_all(COOKIE).iter().count(), 1);
        assert_eq!(request.headers.get("accept").unwrap(), "text/html");
    }

    #[test]
    fn rejects_invalid_header_name() {
        let err = header_map_from_pairs([("bad header", "x")]).unwrap_err();
        assert!(matches!(err, HttpClientError::InvalidHeader(name) if name == "bad header"));
    }

    #[test]
    fn rejects_control_characters_in_cookie() {
        let err = DirectRequest::new(url(), &HeaderMap::new(), "a=1\nb=2").unwrap_err();
        assert!(matches!(err, HttpClientError::InvalidHeader(_)));
    }

    #[test]
    fn lossy_text_decoding() {
        let response = DirectResponse {
            status: 200,
            url: url(),
            body: Bytes::from_static(b"ok \xff"),
        };
        assert!(response.is_success());
        assert!(response.text().starts_with("ok "));
    }
}
