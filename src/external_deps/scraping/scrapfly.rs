use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ScrapeError, ScrapeRequest, ScrapeResult, ScrapedPage, ScrapingProvider};
use crate::config::ScrapingSettings;

pub const DEFAULT_SCRAPFLY_ENDPOINT: &str = "https://api.scrapfly.io";

/// Adapter for the Scrapfly scrape API.
#[derive(Clone)]
pub struct ScrapflyProvider {
    api_key: String,
    endpoint: String,
    timeout: Duration,
    client: Client,
}

impl fmt::Debug for ScrapflyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapflyProvider")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ScrapflyProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ScrapeError> {
        Self::with_settings(&ScrapingSettings {
            api_key: api_key.into(),
            ..ScrapingSettings::default()
        })
    }

    pub fn with_settings(settings: &ScrapingSettings) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .gzip(true)
            .build()
            .map_err(|err| ScrapeError::Configuration(err.to_string()))?;

        Ok(Self {
            api_key: settings.api_key.clone(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            timeout: settings.timeout(),
            client,
        })
    }

    fn scrape_url(&self) -> String {
        format!("{}/scrape", self.endpoint)
    }

    fn query_params(&self, request: &ScrapeRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("key", self.api_key.clone()),
            ("url", request.url.to_string()),
            ("asp", request.asp.to_string()),
            ("render_js", request.render_js.to_string()),
            ("country", request.country.clone()),
        ];

        if !request.tags.is_empty() {
            params.push(("tags", request.tags.join(",")));
        }

        // auto_scroll is only honoured by the browser, so it is omitted
        // unless rendering is on.
        if request.render_js && request.auto_scroll {
            params.push(("auto_scroll", "true".into()));
        }

        params
    }
}

#[async_trait]
impl ScrapingProvider for ScrapflyProvider {
    fn name(&self) -> &'static str {
        "scrapfly"
    }

    async fn scrape(&self, request: &ScrapeRequest) -> ScrapeResult {
        if self.api_key.trim().is_empty() {
            return Err(ScrapeError::Configuration("missing scrapfly api key".into()));
        }

        let response = self
            .client
            .get(self.scrape_url())
            .query(&self.query_params(request))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ScrapeError::Timeout(self.timeout)
                } else {
                    transport_error(err)
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(transport_error)?;

        parse_response(status, &body)
    }
}

// The request url carries the api key as a query parameter.
fn transport_error(err: reqwest::Error) -> ScrapeError {
    ScrapeError::Transport(err.without_url().to_string())
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    result: ApiResult,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    fn into_scrape_error(self, fallback_code: String) -> ScrapeError {
        ScrapeError::Provider {
            code: self.code.unwrap_or(fallback_code),
            message: self.message.unwrap_or_else(|| "no message".into()),
        }
    }
}

fn parse_response(status: u16, body: &str) -> ScrapeResult {
    if !(200..300).contains(&status) {
        let fallback = format!("http_{status}");
        let nested = serde_json::from_str::<ApiResponse>(body)
            .ok()
            .and_then(|parsed| parsed.result.error);
        let api_error = nested.or_else(|| {
            serde_json::from_str::<ApiError>(body)
                .ok()
                .filter(|err| err.code.is_some() || err.message.is_some())
        });

        return Err(match api_error {
            Some(api_error) => api_error.into_scrape_error(fallback),
            None => ScrapeError::Provider {
                code: fallback,
                message: body.chars().take(200).collect(),
            },
        });
    }

    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|err| ScrapeError::Decode(err.to_string()))?;
    let result = parsed.result;

    if result.success == Some(false) {
        let fallback = result
            .status_code
            .map(|code| format!("upstream_{code}"))
            .unwrap_or_else(|| "scrape_failed".into());
        return Err(match result.error {
            Some(api_error) => api_error.into_scrape_error(fallback),
            None => ScrapeError::Provider {
                code: fallback,
                message: "scrape reported failure".into(),
            },
        });
    }

    let content = result
        .content
        .ok_or_else(|| ScrapeError::Decode("result.content missing".into()))?;

    let mut page = ScrapedPage::new(content);
    if let Some(code) = result.status_code {
        page = page.with_status(code);
    }
    if let Some(url) = result.url {
        page = page.insert_metadata("final_url", url);
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn provider() -> ScrapflyProvider {
        ScrapflyProvider::new("test-key").unwrap()
    }

    fn request() -> ScrapeRequest {
        ScrapeRequest::new(Url::parse("https://www.immonet.de/angebot/123").unwrap())
    }

    #[test]
    fn builds_query_from_request() {
        let params = provider().query_params(&request());
        let get = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        };

        assert_eq!(get("key"), Some("test-key"));
        assert_eq!(get("url"), Some("https://www.immonet.de/angebot/123"));
        assert_eq!(get("tags"), Some("player,project:default"));
        assert_eq!(get("asp"), Some("true"));
        assert_eq!(get("render_js"), Some("true"));
        assert_eq!(get("auto_scroll"), Some("true"));
        assert_eq!(get("country"), Some("de"));
    }

    #[test]
    fn trims_trailing_slash_from_endpoint() {
        let settings = ScrapingSettings {
            endpoint: "http://localhost:8080/".into(),
            ..ScrapingSettings::default()
        };
        let provider = ScrapflyProvider::with_settings(&settings).unwrap();
        assert_eq!(provider.scrape_url(), "http://localhost:8080/scrape");
    }

    #[test]
    fn parses_successful_result() {
        let body = r#"{"config": {}, "context": {}, "result": {
            "content": "<html>ok</html>", "status_code": 200, "success": true,
            "url": "https://www.immonet.de/angebot/123"
        }}"#;
        let page = parse_response(200, body).unwrap();

        assert_eq!(page.content, "<html>ok</html>");
        assert_eq!(page.status, Some(200));
        assert_eq!(
            page.metadata.get("final_url").map(String::as_str),
            Some("https://www.immonet.de/angebot/123")
        );
    }

    #[test]
    fn failed_result_is_provider_error() {
        let body = r#"{"result": {"content": "", "status_code": 403, "success": false,
            "error": {"code": "ERR::ASP::SHIELD_PROTECTION_FAILED", "message": "blocked"}}}"#;
        let err = parse_response(200, body).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Provider { ref code, .. } if code == "ERR::ASP::SHIELD_PROTECTION_FAILED"
        ));
    }

    #[test]
    fn http_error_uses_api_error_body() {
        let body = r#"{"code": "ERR::SCRAPE::QUOTA_LIMIT_REACHED", "message": "quota", "http_code": 429}"#;
        let err = parse_response(429, body).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Provider { ref code, ref message } if code == "ERR::SCRAPE::QUOTA_LIMIT_REACHED" && message == "quota"
        ));
    }

    #[test]
    fn http_error_with_plain_body() {
        let err = parse_response(502, "Bad Gateway").unwrap_err();
        assert!(matches!(err, ScrapeError::Provider { ref code, .. } if code == "http_502"));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        assert!(matches!(parse_response(200, "<html>"), Err(ScrapeError::Decode(_))));
        assert!(matches!(
            parse_response(200, r#"{"result": {"success": true}}"#),
            Err(ScrapeError::Decode(_))
        ));
    }

    #[test]
    fn http_error_prefers_nested_result_error() {
        let body = r#"{"result": {"success": false, "status_code": 422,
            "error": {"code": "ERR::SCRAPE::BAD_UPSTREAM_RESPONSE", "message": "upstream 422"}}}"#;
        let err = parse_response(422, body).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Provider { ref code, ref message }
                if code == "ERR::SCRAPE::BAD_UPSTREAM_RESPONSE" && message == "upstream 422"
        ));
    }

    #[test]
    fn http_error_with_unrelated_json_keeps_body() {
        let err = parse_response(500, r#"{"detail": "boom"}"#).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Provider { ref code, ref message }
                if code == "http_500" && message.contains("boom")
        ));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let provider = ScrapflyProvider::new("hidden-key-4711").unwrap();
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("hidden-key-4711"), "{rendered}");
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_api_key() {
        let settings = ScrapingSettings {
            api_key: "hidden-key-4711".into(),
            endpoint: "http://127.0.0.1:9".into(),
            ..ScrapingSettings::default()
        };
        let provider = ScrapflyProvider::with_settings(&settings).unwrap();

        let err = provider.scrape(&request()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Transport(_) | ScrapeError::Timeout(_)));
        assert!(!err.to_string().contains("hidden-key-4711"), "{err}");
        assert!(!format!("{err:?}").contains("hidden-key-4711"));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let provider = ScrapflyProvider::new("").unwrap();
        let err = provider.scrape(&request()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(_)));
    }
}
