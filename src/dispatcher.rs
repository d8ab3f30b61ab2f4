//! Request dispatch orchestration.
//!
//! A [`RequestDispatcher`] is bound to one provider and one header set. Each
//! dispatch consults the selection policy and then either fetches the page
//! directly or hands it to the scraping service with bounded retries. Every
//! dispatch yields exactly one [`FetchOutcome`]; failures come back as an
//! empty body, never as an error.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use http::header::{COOKIE, HeaderMap, HeaderValue};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::{ConfigError, DispatcherSettings};
use crate::core::{
	DirectHttpClient, DirectRequest, DispatchPath, FetchOutcome, HttpClientError, OutcomeKind,
	ProviderId, RequestContext, ReqwestHttpClient, RetryPolicy, header_map_from_pairs,
};
use crate::external_deps::scraping::{
	ScrapeError, ScrapeTemplate, ScrapflyProvider, ScrapingProvider,
};
use crate::modules::events::{
	AttemptFailedEvent, CompletedEvent, DispatchEvent, EventDispatcher, EventHandler,
	LoggingHandler, MetricsHandler, RetryEvent, StartedEvent,
};
use crate::modules::metrics::MetricsCollector;
use crate::modules::selection::{ProviderSelector, StaticProviderSet};

/// Result alias used while constructing dispatchers.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Construction-time errors. Dispatching itself never fails.
#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("invalid header '{0}'")]
	InvalidHeader(String),
	#[error("http client setup failed: {0}")]
	HttpClient(HttpClientError),
	#[error("scraping provider setup failed: {0}")]
	Scraping(#[from] ScrapeError),
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("dispatcher is missing a {0}")]
	MissingComponent(&'static str),
	#[error("max concurrency must be at least 1")]
	ZeroConcurrency,
}

impl From<HttpClientError> for DispatchError {
	fn from(err: HttpClientError) -> Self {
		match err {
			HttpClientError::InvalidHeader(name) => DispatchError::InvalidHeader(name),
			other => DispatchError::HttpClient(other),
		}
	}
}

/// Fluent builder for [`RequestDispatcher`].
pub struct DispatcherBuilder {
	provider: ProviderId,
	header_pairs: Vec<(String, String)>,
	header_map: HeaderMap,
	cookies: String,
	http_client: Option<Arc<dyn DirectHttpClient>>,
	scraping_provider: Option<Arc<dyn ScrapingProvider>>,
	selector: Arc<dyn ProviderSelector>,
	retry_policy: RetryPolicy,
	template: ScrapeTemplate,
	max_concurrency: Option<usize>,
	handlers: Vec<Arc<dyn EventHandler>>,
	enable_metrics: bool,
}

impl DispatcherBuilder {
	pub fn new(provider: impl Into<ProviderId>) -> Self {
		Self {
			provider: provider.into(),
			header_pairs: Vec::new(),
			header_map: HeaderMap::new(),
			cookies: String::new(),
			http_client: None,
			scraping_provider: None,
			selector: Arc::new(StaticProviderSet::builtin()),
			retry_policy: RetryPolicy::default(),
			template: ScrapeTemplate::default(),
			max_concurrency: None,
			handlers: Vec::new(),
			enable_metrics: true,
		}
	}

	/// Headers sent on every direct request. Validated in [`Self::build`].
	pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.header_pairs
			.extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
		self
	}

	pub fn with_header_map(mut self, headers: HeaderMap) -> Self {
		self.header_map.extend(headers);
		self
	}

	/// Cookie string sent with every direct request. Fixed once built.
	pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
		self.cookies = cookies.into();
		self
	}

	pub fn with_http_client(mut self, client: Arc<dyn DirectHttpClient>) -> Self {
		self.http_client = Some(client);
		self
	}

	pub fn with_scraping_provider(mut self, provider: Arc<dyn ScrapingProvider>) -> Self {
		self.scraping_provider = Some(provider);
		self
	}

	pub fn with_selector(mut self, selector: Arc<dyn ProviderSelector>) -> Self {
		self.selector = selector;
		self
	}

	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry_policy = policy;
		self
	}

	pub fn with_scrape_template(mut self, template: ScrapeTemplate) -> Self {
		self.template = template;
		self
	}

	pub fn with_max_concurrency(mut self, limit: usize) -> Self {
		self.max_concurrency = Some(limit);
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn disable_metrics(mut self) -> Self {
		self.enable_metrics = false;
		self
	}

	pub fn build(self) -> DispatchResult<RequestDispatcher> {
		let http_client = self
			.http_client
			.ok_or(DispatchError::MissingComponent("http client"))?;
		let scraping_provider = self
			.scraping_provider
			.ok_or(DispatchError::MissingComponent("scraping provider"))?;

		let mut headers = self.header_map;
		headers.extend(header_map_from_pairs(self.header_pairs)?);

		// Reject cookies that could never be sent instead of failing every request.
		HeaderValue::from_str(&self.cookies)
			.map_err(|_| DispatchError::InvalidHeader(COOKIE.to_string()))?;

		let limiter = match self.max_concurrency {
			Some(0) => return Err(DispatchError::ZeroConcurrency),
			Some(limit) => Some(Semaphore::new(limit)),
			None => None,
		};

		let metrics = self.enable_metrics.then(MetricsCollector::new);

		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		if let Some(ref collector) = metrics {
			events.register_handler(Arc::new(MetricsHandler::new(collector.clone())));
		}
		for handler in self.handlers {
			events.register_handler(handler);
		}

		Ok(RequestDispatcher {
			inner: Arc::new(DispatcherInner {
				provider: self.provider,
				headers,
				cookies: Arc::from(self.cookies),
				selector: self.selector,
				http_client,
				scraping_provider,
				retry_policy: self.retry_policy,
				template: self.template,
				limiter,
				events,
				metrics,
			}),
		})
	}
}

struct DispatcherInner {
	provider: ProviderId,
	headers: HeaderMap,
	cookies: Arc<str>,
	selector: Arc<dyn ProviderSelector>,
	http_client: Arc<dyn DirectHttpClient>,
	scraping_provider: Arc<dyn ScrapingProvider>,
	retry_policy: RetryPolicy,
	template: ScrapeTemplate,
	limiter: Option<Semaphore>,
	events: EventDispatcher,
	metrics: Option<MetricsCollector>,
}

/// Per-provider dispatcher. Cheap to clone; clones share clients and metrics.
#[derive(Clone)]
pub struct RequestDispatcher {
	inner: Arc<DispatcherInner>,
}

/// Build a dispatcher for `provider` from settings, with an empty cookie string.
///
/// Uses the reqwest direct client and the Scrapfly provider.
pub fn make_dispatcher<I, K, V>(
	provider: impl Into<ProviderId>,
	headers: I,
	settings: &DispatcherSettings,
) -> DispatchResult<RequestDispatcher>
where
	I: IntoIterator<Item = (K, V)>,
	K: Into<String>,
	V: Into<String>,
{
	settings.validate()?;

	let provider = provider.into();
	let selector = StaticProviderSet::new(settings.proxy_required.iter().map(String::as_str));
	if selector.needs_proxy_provider(&provider) && settings.scraping.api_key.trim().is_empty() {
		log::warn!(
			"provider [{}] is scraped through scrapfly but no api key is configured",
			provider
		);
	}

	let http_client = ReqwestHttpClient::new(&settings.transport)?;
	let scraping_provider = ScrapflyProvider::with_settings(&settings.scraping)?;

	let mut builder = DispatcherBuilder::new(provider)
		.with_headers(headers)
		.with_http_client(Arc::new(http_client))
		.with_scraping_provider(Arc::new(scraping_provider))
		.with_selector(Arc::new(selector))
		.with_retry_policy(settings.retry.policy())
		.with_scrape_template(ScrapeTemplate::from_settings(&settings.scraping));

	if let Some(limit) = settings.max_concurrency {
		builder = builder.with_max_concurrency(limit);
	}

	builder.build()
}

impl RequestDispatcher {
	/// Obtain a builder for a dispatcher bound to `provider`.
	pub fn builder(provider: impl Into<ProviderId>) -> DispatcherBuilder {
		DispatcherBuilder::new(provider)
	}

	pub fn provider(&self) -> &ProviderId {
		&self.inner.provider
	}

	pub fn headers(&self) -> &HeaderMap {
		&self.inner.headers
	}

	pub fn cookies(&self) -> &str {
		&self.inner.cookies
	}

	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.inner.retry_policy
	}

	/// Metrics shared by all clones, unless disabled on the builder.
	pub fn metrics(&self) -> Option<&MetricsCollector> {
		self.inner.metrics.as_ref()
	}

	/// Path the selection policy picks for this dispatcher's provider.
	pub fn path_for(&self) -> DispatchPath {
		if self.inner.selector.needs_proxy_provider(&self.inner.provider) {
			DispatchPath::Provider
		} else {
			DispatchPath::Direct
		}
	}

	/// Fetch the page for `context`.
	pub async fn dispatch(&self, context: &RequestContext) -> FetchOutcome {
		let _permit = match self.inner.limiter {
			Some(ref limiter) => limiter.acquire().await.ok(),
			None => None,
		};

		let path = self.path_for();
		let started = Instant::now();

		self.emit(DispatchEvent::Started(StartedEvent {
			provider: self.inner.provider.clone(),
			url: context.url.clone(),
			path,
			timestamp: Utc::now(),
		}));

		let outcome = match path {
			DispatchPath::Provider => self.fetch_via_provider(context, started).await,
			DispatchPath::Direct => self.fetch_direct(context, started).await,
		};

		self.emit(DispatchEvent::Completed(CompletedEvent {
			provider: self.inner.provider.clone(),
			url: context.url.clone(),
			path,
			kind: outcome.kind,
			attempts: outcome.attempts,
			latency: outcome.elapsed,
			timestamp: Utc::now(),
		}));

		outcome
	}

	/// Fetch the page and hand the outcome to `callback`, exactly once.
	pub async fn dispatch_with<F>(&self, context: RequestContext, callback: F)
	where
		F: FnOnce(FetchOutcome) + Send,
	{
		let outcome = self.dispatch(&context).await;
		callback(outcome);
	}

	/// Fire-and-forget variant of [`Self::dispatch_with`] on the tokio runtime.
	pub fn spawn<F>(&self, context: RequestContext, callback: F) -> JoinHandle<()>
	where
		F: FnOnce(FetchOutcome) + Send + 'static,
	{
		let dispatcher = self.clone();
		tokio::spawn(async move {
			dispatcher.dispatch_with(context, callback).await;
		})
	}

	/// Parse `url` and dispatch it. Only an unparsable URL is an error, and
	/// no request is made in that case.
	pub async fn dispatch_url(&self, url: &str) -> DispatchResult<FetchOutcome> {
		let context = RequestContext::parse(url)?;
		Ok(self.dispatch(&context).await)
	}

	async fn fetch_direct(&self, context: &RequestContext, started: Instant) -> FetchOutcome {
		let inner = &self.inner;
		let result = match DirectRequest::new(context.url.clone(), &inner.headers, &inner.cookies) {
			Ok(request) => inner.http_client.get(&request).await,
			Err(err) => Err(err),
		};

		match result {
			Ok(response) => FetchOutcome::fetched(
				context.clone(),
				DispatchPath::Direct,
				response.text(),
				1,
				started.elapsed(),
			),
			Err(err) => {
				log::error!(
					"error while trying to fetch {} directly for [{}]: {}",
					context.url,
					inner.provider,
					err
				);
				self.emit(DispatchEvent::AttemptFailed(AttemptFailedEvent {
					provider: inner.provider.clone(),
					url: context.url.clone(),
					path: DispatchPath::Direct,
					attempt: 1,
					error: err.to_string(),
					timestamp: Utc::now(),
				}));
				FetchOutcome::empty(
					context.clone(),
					DispatchPath::Direct,
					OutcomeKind::TransportFailure,
					1,
					started.elapsed(),
				)
			}
		}
	}

	async fn fetch_via_provider(&self, context: &RequestContext, started: Instant) -> FetchOutcome {
		let inner = &self.inner;
		let policy = &inner.retry_policy;
		let service = inner.scraping_provider.name();
		let request = inner.template.request_for(context.url.clone());
		let mut retries = 0u32;

		loop {
			let attempt = retries + 1;
			let err = match inner.scraping_provider.scrape(&request).await {
				Ok(page) => {
					return FetchOutcome::fetched(
						context.clone(),
						DispatchPath::Provider,
						page.content,
						attempt,
						started.elapsed(),
					);
				}
				Err(err) => err,
			};

			self.emit(DispatchEvent::AttemptFailed(AttemptFailedEvent {
				provider: inner.provider.clone(),
				url: context.url.clone(),
				path: DispatchPath::Provider,
				attempt,
				error: err.to_string(),
				timestamp: Utc::now(),
			}));

			if !policy.allows_retry(retries) {
				log::error!(
					"error while trying to scrape {} via {} for [{}]: {}. giving up after {} attempt(s)",
					context.url,
					service,
					inner.provider,
					err,
					attempt
				);
				return FetchOutcome::empty(
					context.clone(),
					DispatchPath::Provider,
					OutcomeKind::ProviderExhausted,
					attempt,
					started.elapsed(),
				);
			}

			retries += 1;
			let delay = policy.delay_for(retries);
			log::warn!(
				"error while trying to scrape {} via {} for [{}]: {}. retrying {}/{} ...",
				context.url,
				service,
				inner.provider,
				err,
				retries,
				policy.max_retries
			);
			self.emit(DispatchEvent::Retry(RetryEvent {
				provider: inner.provider.clone(),
				url: context.url.clone(),
				retry: retries,
				max_retries: policy.max_retries,
				scheduled_after: delay,
				timestamp: Utc::now(),
			}));

			if !delay.is_zero() {
				sleep(delay).await;
			}
		}
	}

	fn emit(&self, event: DispatchEvent) {
		self.inner.events.dispatch(event);
	}
}
