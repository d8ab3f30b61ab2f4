//! Core types and transports shared by the dispatcher paths.

pub mod http;
pub mod reqwest_client;
pub mod retry;
pub mod types;

pub use self::http::{
    DirectHttpClient, DirectRequest, DirectResponse, HttpClientError, header_map_from_pairs,
};
pub use reqwest_client::ReqwestHttpClient;
pub use retry::{DEFAULT_MAX_RETRIES, RetryPolicy};
pub use types::{DispatchPath, FetchOutcome, OutcomeKind, PageBody, ProviderId, RequestContext};
