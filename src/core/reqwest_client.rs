//! Reqwest-based implementation of the `DirectHttpClient` trait.
//!
//! Thin adapter around `reqwest::Client` that converts between the shared
//! request/response representations and the concrete transport. The TLS
//! policy is applied to this client only.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, redirect::Policy};

use super::http::{DirectHttpClient, DirectRequest, DirectResponse, HttpClientError};
use crate::config::TransportSettings;

/// Reqwest-backed client used by the direct path.
pub struct ReqwestHttpClient {
    client: Client,
    reject_error_status: bool,
}

impl ReqwestHttpClient {
    /// Build a client from transport settings.
    ///
    /// No cookie store is enabled: the dispatcher sends its own `Cookie`
    /// header and must not pick up cookies from earlier responses.
    pub fn new(settings: &TransportSettings) -> Result<Self, HttpClientError> {
        let mut builder = Client::builder()
            .redirect(Policy::limited(settings.redirect_limit))
            .gzip(true)
            .brotli(true);

        if let Some(timeout) = settings.timeout() {
            builder = builder.timeout(timeout);
        }

        if let Some(agent) = &settings.user_agent {
            builder = builder.user_agent(agent.clone());
        }

        let client = settings
            .tls
            .apply(builder)
            .build()
            .map_err(|err| HttpClientError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            reject_error_status: settings.reject_error_status,
        })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            reject_error_status: false,
        }
    }
}

#[async_trait]
impl DirectHttpClient for ReqwestHttpClient {
    async fn get(&self, request: &DirectRequest) -> Result<DirectResponse, HttpClientError> {
        let response = self
            .client
            .get(request.url.as_str())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let url = response.url().clone();
        if self.reject_error_status && !response.status().is_success() {
            return Err(HttpClientError::Status { status, url });
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(DirectResponse { status, url, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> HttpClientError {
    if err.is_timeout() {
        HttpClientError::Timeout
    } else {
        HttpClientError::Transport(err.to_string())
    }
}

type _AssertSync = Arc<ReqwestHttpClient>;
