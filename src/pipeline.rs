//! Request pipeline that composes the limiter, the crumb cache, the response cache, and the
//! transport/decoder collaborators.
//!
//! Every call runs the same stages in order:
//!
//! 1. **Cache check**: a live entry for the request's [`CacheKey`] is returned immediately and
//!    consumes no rate budget; an in-flight fetch for the same key is joined.
//! 2. **Admission**: one token is taken from the shared [`RateLimiterHandle`].
//! 3. **Authenticate**: the live crumb is read from (or refreshed into) the [`CredentialCache`].
//! 4. **Dispatch**: the [`Transport`] performs the call. A crumb rejection invalidates the
//!    rejected crumb and repeats steps 3 and 4 exactly once more without a second admission.
//! 5. **Translate**: statuses map to typed errors and 2xx bodies go through the
//!    [`ResponseDecoder`]. Only successes are stored.

mod metrics;
pub use metrics::PipelineMetrics;

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialCache, CredentialFetcher},
	cache::{CacheKey, ResponseCache, TtlPolicy},
	config::PipelineConfig,
	decode::ResponseDecoder,
	error::ConfigError,
	obs::{self, Stage, StageOutcome, StageSpan},
	rate_limit::RateLimiterHandle,
	transport::{self, RawResponse, RequestSpec, Transport, TransportOutcome},
};

/// Cloneable handle to one configured pipeline; clones share every cache and the limiter.
pub struct RequestPipeline<V> {
	limiter: RateLimiterHandle,
	credentials: CredentialCache,
	responses: ResponseCache<V>,
	transport: Arc<dyn Transport>,
	decoder: Arc<dyn ResponseDecoder<V>>,
	ttl: TtlPolicy,
	metrics: Arc<PipelineMetrics>,
}
impl<V> RequestPipeline<V>
where
	V: 'static + Clone + Send + Sync,
{
	/// Starts a builder seeded with [`PipelineConfig::default`].
	pub fn builder() -> PipelineBuilder<V> {
		PipelineBuilder::new(PipelineConfig::default())
	}

	/// Runs `spec` through every stage, caching the decoded value under its derived key with
	/// the TTL configured for its endpoint.
	pub async fn execute(&self, spec: RequestSpec) -> Result<V> {
		self.execute_with_key(spec.cache_key(), spec).await
	}

	/// Runs `spec` cached under a caller-chosen `key`, e.g. `AAPL:price`.
	///
	/// The TTL is looked up from the key's endpoint.
	pub async fn execute_with_key(&self, key: CacheKey, spec: RequestSpec) -> Result<V> {
		let ttl = self.ttl.ttl_for(&key);

		self.execute_with_ttl(key, ttl, spec).await
	}

	/// Runs `spec` under an explicit key and TTL.
	///
	/// A zero `ttl` still deduplicates concurrent callers but stores nothing.
	pub async fn execute_with_ttl(
		&self,
		key: CacheKey,
		ttl: Duration,
		spec: RequestSpec,
	) -> Result<V> {
		let span = StageSpan::new(Stage::CacheCheck, &key.to_string());
		let this = self.clone();
		let fetch_key = key.clone();
		let result = span
			.instrument(self.responses.get_or_fetch(key, ttl, move || async move {
				this.fetch(&fetch_key, &spec).await
			}))
			.await;

		if result.is_err() {
			self.metrics.record_failure();
		}

		result
	}

	/// Runs admission, authentication, dispatch, and translation, bypassing the response
	/// cache entirely.
	pub async fn execute_uncached(&self, spec: RequestSpec) -> Result<V> {
		let key = spec.cache_key();
		let result = self.fetch(&key, &spec).await;

		if result.is_err() {
			self.metrics.record_failure();
		}

		result
	}

	/// Tokens currently available in the shared limiter (`f64::INFINITY` when disabled).
	pub fn available_tokens(&self) -> f64 {
		self.limiter.available_tokens()
	}

	/// Counters shared by every stage of this pipeline.
	pub fn metrics(&self) -> &Arc<PipelineMetrics> {
		&self.metrics
	}

	/// Shared rate limiter.
	pub fn limiter(&self) -> &RateLimiterHandle {
		&self.limiter
	}

	/// Crumb cache.
	pub fn credentials(&self) -> &CredentialCache {
		&self.credentials
	}

	/// Response cache.
	pub fn responses(&self) -> &ResponseCache<V> {
		&self.responses
	}

	async fn fetch(&self, key: &CacheKey, spec: &RequestSpec) -> Result<V> {
		let label = key.to_string();

		StageSpan::new(Stage::Admission, &label).instrument(self.admit()).await;

		let dispatch_span = StageSpan::new(Stage::Dispatch, &label);
		let raw = dispatch_span.instrument(self.dispatch(spec)).await?;
		let translate_span = StageSpan::new(Stage::Translate, &label);

		translate_span.instrument(async { self.translate(key, raw) }).await
	}

	async fn admit(&self) {
		obs::record_stage_outcome(Stage::Admission, StageOutcome::Attempt);

		self.limiter.acquire(1).await;

		obs::record_stage_outcome(Stage::Admission, StageOutcome::Success);
	}

	async fn dispatch(&self, spec: &RequestSpec) -> Result<RawResponse> {
		let mut retried = false;

		loop {
			let credential = self.authenticate().await?;

			self.metrics.record_dispatch();
			obs::record_stage_outcome(Stage::Dispatch, StageOutcome::Attempt);

			match self.transport.call(spec, &credential).await {
				Ok(TransportOutcome::Response(raw)) => {
					obs::record_stage_outcome(Stage::Dispatch, StageOutcome::Success);

					return Ok(raw);
				},
				Ok(TransportOutcome::CredentialRejected { status, message }) => {
					if retried {
						obs::record_stage_outcome(Stage::Dispatch, StageOutcome::Failure);
						obs::debug(
							Stage::Dispatch,
							format_args!("refreshed crumb rejected again: {message}"),
						);

						return Err(Error::CredentialRejected { status, message });
					}

					retried = true;

					self.credentials.invalidate_if(&credential);
					self.metrics.record_credential_retry();
					obs::record_stage_outcome(Stage::Dispatch, StageOutcome::Retry);
					obs::debug(
						Stage::Dispatch,
						format_args!("crumb rejected, refreshing and retrying once: {message}"),
					);
				},
				Err(err) => {
					obs::record_stage_outcome(Stage::Dispatch, StageOutcome::Failure);
					obs::debug(Stage::Dispatch, format_args!("transport failed: {err}"));

					return Err(err.into());
				},
			}
		}
	}

	async fn authenticate(&self) -> Result<Credential> {
		let span = StageSpan::new(Stage::Authenticate, "crumb");

		span.instrument(self.credentials.get()).await
	}

	fn translate(&self, key: &CacheKey, raw: RawResponse) -> Result<V> {
		let result = transport::translate_status(key, raw)
			.and_then(|raw| self.decoder.decode(key, &raw));

		obs::record_stage_outcome(Stage::Translate, match result {
			Ok(_) => StageOutcome::Success,
			Err(_) => StageOutcome::Failure,
		});

		result
	}
}
impl<V> Clone for RequestPipeline<V> {
	fn clone(&self) -> Self {
		Self {
			limiter: self.limiter.clone(),
			credentials: self.credentials.clone(),
			responses: self.responses.clone(),
			transport: self.transport.clone(),
			decoder: self.decoder.clone(),
			ttl: self.ttl.clone(),
			metrics: self.metrics.clone(),
		}
	}
}
impl<V> Debug for RequestPipeline<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("limiter", &self.limiter)
			.field("credentials", &self.credentials)
			.field("ttl", &self.ttl)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

/// Assembles a [`RequestPipeline`] from configuration plus collaborators.
pub struct PipelineBuilder<V> {
	config: PipelineConfig,
	limiter: Option<RateLimiterHandle>,
	transport: Option<Arc<dyn Transport>>,
	fetcher: Option<Arc<dyn CredentialFetcher>>,
	decoder: Option<Arc<dyn ResponseDecoder<V>>>,
}
impl<V> PipelineBuilder<V>
where
	V: 'static + Clone + Send + Sync,
{
	/// Creates a builder for `config`.
	pub fn new(config: PipelineConfig) -> Self {
		Self { config, limiter: None, transport: None, fetcher: None, decoder: None }
	}

	/// Replaces the configuration.
	pub fn with_config(mut self, config: PipelineConfig) -> Self {
		self.config = config;

		self
	}

	/// Shares an existing limiter instead of building one from the configuration.
	///
	/// Pipelines built with the same handle draw from one token budget.
	pub fn with_rate_limiter(mut self, limiter: RateLimiterHandle) -> Self {
		self.limiter = Some(limiter);

		self
	}

	/// Sets the transport collaborator.
	pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Sets the authentication collaborator.
	pub fn with_credential_fetcher(mut self, fetcher: Arc<dyn CredentialFetcher>) -> Self {
		self.fetcher = Some(fetcher);

		self
	}

	/// Sets the decoder collaborator.
	pub fn with_decoder(mut self, decoder: Arc<dyn ResponseDecoder<V>>) -> Self {
		self.decoder = Some(decoder);

		self
	}

	/// Validates the configuration and builds the pipeline.
	pub fn build(self) -> Result<RequestPipeline<V>, ConfigError> {
		self.config.validate()?;

		let transport =
			self.transport.ok_or(ConfigError::MissingComponent { component: "transport" })?;
		let fetcher = self
			.fetcher
			.ok_or(ConfigError::MissingComponent { component: "credential fetcher" })?;
		let decoder = self.decoder.ok_or(ConfigError::MissingComponent { component: "decoder" })?;
		let limiter = match self.limiter {
			Some(limiter) => limiter,
			None => RateLimiterHandle::from_config(&self.config.rate_limit)?,
		};
		let metrics = Arc::new(PipelineMetrics::default());
		let credentials = CredentialCache::from_config(fetcher, &self.config.credential)?
			.with_metrics(metrics.clone());
		let responses =
			ResponseCache::from_config(&self.config.cache)?.with_metrics(metrics.clone());

		Ok(RequestPipeline {
			limiter,
			credentials,
			responses,
			transport,
			decoder,
			ttl: TtlPolicy::from_config(&self.config.cache),
			metrics,
		})
	}
}
impl<V> Debug for PipelineBuilder<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PipelineBuilder")
			.field("config", &self.config)
			.field("limiter", &self.limiter)
			.field("transport", &self.transport.is_some())
			.field("fetcher", &self.fetcher.is_some())
			.field("decoder", &self.decoder.is_some())
			.finish()
	}
}
