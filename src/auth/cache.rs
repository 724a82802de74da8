//! Single-flight, time-bounded crumb cache.
//!
//! [`CredentialCache::get`] serves the live crumb while it is inside its validity window.
//! Once it is missing or stale, the first caller spawns exactly one authentication fetch and
//! every caller arriving before it completes awaits that same fetch, success or failure. The
//! fetch runs as its own task, so cancelling any caller never affects the others, and a fetch
//! that panics frees the slot for the next refresh.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialFetcher},
	config::CredentialConfig,
	error::ConfigError,
	obs::{self, Stage, StageOutcome},
	pipeline::PipelineMetrics,
	singleflight::{self, ClearOnExit, InFlight},
};

/// Holds the one live crumb for a pipeline and coordinates refreshes.
#[derive(Clone)]
pub struct CredentialCache {
	fetcher: Arc<dyn CredentialFetcher>,
	validity: Duration,
	slot: Arc<Mutex<CredentialSlot>>,
	metrics: Arc<PipelineMetrics>,
}
impl CredentialCache {
	/// Creates an empty cache whose crumbs stay valid for `validity`.
	pub fn new(fetcher: Arc<dyn CredentialFetcher>, validity: Duration) -> Self {
		Self {
			fetcher,
			validity,
			slot: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Creates an empty cache from configuration.
	pub fn from_config(
		fetcher: Arc<dyn CredentialFetcher>,
		config: &CredentialConfig,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		Ok(Self::new(fetcher, config.validity()))
	}

	/// Shares the provided counters instead of private ones.
	pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
		self.metrics = metrics;

		self
	}

	/// Validity window applied to every crumb.
	pub fn validity(&self) -> Duration {
		self.validity
	}

	/// Counters updated by this cache.
	pub fn metrics(&self) -> &Arc<PipelineMetrics> {
		&self.metrics
	}

	/// Returns the live crumb, refreshing it (once, for all concurrent callers) when needed.
	///
	/// Authentication failures are delivered to every caller that awaited the failed refresh
	/// and are not retried here.
	pub async fn get(&self) -> Result<Credential> {
		let in_flight = {
			let mut slot = self.slot.lock();

			if let Some(current) = slot.live(Instant::now(), self.validity) {
				return Ok(current.clone());
			}

			match &slot.in_flight {
				Some(in_flight) => in_flight.clone(),
				None => {
					let in_flight = self.spawn_refresh();

					slot.in_flight = Some(in_flight.clone());

					in_flight
				},
			}
		};

		in_flight.await
	}

	/// Returns the cached crumb if it is still valid, without refreshing.
	pub fn peek(&self) -> Option<Credential> {
		self.slot.lock().live(Instant::now(), self.validity).cloned()
	}

	/// Drops the cached crumb unconditionally so the next [`get`](Self::get) refreshes.
	pub fn invalidate(&self) {
		self.slot.lock().current = None;
	}

	/// Drops the cached crumb only if it is still `rejected`.
	///
	/// Returns `false` when another caller already replaced it, in which case the newer crumb
	/// is kept.
	pub fn invalidate_if(&self, rejected: &Credential) -> bool {
		let mut slot = self.slot.lock();

		if slot.current.as_ref() == Some(rejected) {
			slot.current = None;

			true
		} else {
			false
		}
	}

	fn spawn_refresh(&self) -> InFlight<Credential> {
		let fetcher = self.fetcher.clone();
		let slot = self.slot.clone();
		let metrics = self.metrics.clone();

		metrics.record_credential_refresh();
		obs::record_stage_outcome(Stage::Authenticate, StageOutcome::Miss);
		obs::debug(Stage::Authenticate, format_args!("refreshing crumb"));

		singleflight::spawn(async move {
			let guard = ClearOnExit::new({
				let slot = slot.clone();

				move || slot.lock().in_flight = None
			});
			let result = fetcher.fetch_credential().await.map_err(into_authentication_error);
			let mut slot = slot.lock();

			guard.disarm();
			slot.in_flight = None;

			match &result {
				Ok(credential) => {
					slot.current = Some(credential.clone());

					obs::record_stage_outcome(Stage::Authenticate, StageOutcome::Success);
					obs::debug(
						Stage::Authenticate,
						format_args!("crumb refreshed via {}", credential.source),
					);
				},
				Err(err) => {
					obs::record_stage_outcome(Stage::Authenticate, StageOutcome::Failure);
					obs::debug(Stage::Authenticate, format_args!("crumb refresh failed: {err}"));
				},
			}

			result
		})
	}
}
impl Debug for CredentialCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let slot = self.slot.lock();

		f.debug_struct("CredentialCache")
			.field("validity", &self.validity)
			.field("cached", &slot.current.is_some())
			.field("refreshing", &slot.in_flight.is_some())
			.finish()
	}
}

#[derive(Default)]
struct CredentialSlot {
	current: Option<Credential>,
	in_flight: Option<InFlight<Credential>>,
}
impl CredentialSlot {
	fn live(&self, now: Instant, validity: Duration) -> Option<&Credential> {
		self.current.as_ref().filter(|credential| credential.is_valid_at(now, validity))
	}
}

fn into_authentication_error(err: Error) -> Error {
	match err {
		Error::Authentication { .. } => err,
		other => Error::Authentication {
			reason: "authentication collaborator failed".into(),
			source: Some(Arc::new(other)),
		},
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::CountingFetcher,
		auth::{CredentialFuture, CredentialSource},
		error::TransportError,
	};

	const HOUR: Duration = Duration::from_secs(3_600);

	/// Panics on its first fetch, then issues crumbs normally.
	#[derive(Default)]
	struct PanicsOnceFetcher {
		calls: AtomicUsize,
	}
	impl CredentialFetcher for PanicsOnceFetcher {
		fn fetch_credential(&self) -> CredentialFuture<'_> {
			Box::pin(async move {
				let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

				tokio::time::sleep(Duration::from_millis(10)).await;

				if call == 1 {
					panic!("crumb parser exploded");
				}

				Ok(Credential::issue(format!("crumb-{call}"), CredentialSource::Primary))
			})
		}
	}

	fn cache_with(fetcher: &Arc<CountingFetcher>, validity: Duration) -> CredentialCache {
		CredentialCache::new(fetcher.clone(), validity)
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_gets_share_one_fetch() {
		let fetcher =
			Arc::new(CountingFetcher::default().with_delay(Duration::from_millis(200)));
		let cache = cache_with(&fetcher, HOUR);
		let results =
			futures::future::join_all((0..16).map(|_| cache.get())).await.into_iter();
		let tokens = results
			.map(|result| result.expect("Every caller should receive the crumb."))
			.map(|credential| credential.token.expose().to_owned())
			.collect::<Vec<_>>();

		assert_eq!(fetcher.calls(), 1);
		assert!(tokens.iter().all(|token| token == "crumb-1"));
		assert_eq!(cache.metrics().credential_refreshes(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn crumb_is_reused_inside_window_and_refreshed_after() {
		let fetcher = Arc::new(CountingFetcher::default());
		let cache = cache_with(&fetcher, HOUR);
		let first = cache.get().await.expect("Initial fetch should succeed.");

		tokio::time::advance(Duration::from_secs(59 * 60 + 59)).await;

		let reused = cache.get().await.expect("Cached crumb should be served.");

		assert_eq!(reused, first);
		assert_eq!(fetcher.calls(), 1);

		tokio::time::advance(Duration::from_secs(62)).await;

		let refreshed = cache.get().await.expect("Expired crumb should be refreshed.");

		assert_eq!(fetcher.calls(), 2);
		assert_eq!(refreshed.token.expose(), "crumb-2");
	}

	#[tokio::test(start_paused = true)]
	async fn failure_reaches_every_waiter_and_is_not_cached() {
		let fetcher =
			Arc::new(CountingFetcher::default().with_delay(Duration::from_millis(50)));

		fetcher.fail_next(Error::Transport(TransportError::Timeout));

		let cache = cache_with(&fetcher, HOUR);
		let (a, b, c) = tokio::join!(cache.get(), cache.get(), cache.get());

		for result in [a, b, c] {
			let err = result.expect_err("Every waiter should observe the failure.");

			assert!(matches!(err, Error::Authentication { source: Some(_), .. }));
		}

		assert_eq!(fetcher.calls(), 1);
		assert!(cache.peek().is_none());

		let recovered = cache.get().await.expect("Next get should start a new refresh.");

		assert_eq!(recovered.token.expose(), "crumb-2");
		assert_eq!(fetcher.calls(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn invalidate_forces_refresh() {
		let fetcher = Arc::new(CountingFetcher::default());
		let cache = cache_with(&fetcher, HOUR);

		cache.get().await.expect("Initial fetch should succeed.");
		cache.invalidate();

		let refreshed = cache.get().await.expect("Refresh after invalidate should succeed.");

		assert_eq!(refreshed.token.expose(), "crumb-2");
		assert_eq!(fetcher.calls(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn stale_rejection_keeps_newer_crumb() {
		let fetcher = Arc::new(CountingFetcher::default());
		let cache = cache_with(&fetcher, HOUR);
		let old = cache.get().await.expect("Initial fetch should succeed.");

		assert!(cache.invalidate_if(&old));

		let fresh = cache.get().await.expect("Refresh should succeed.");

		assert!(!cache.invalidate_if(&old));
		assert_eq!(cache.peek(), Some(fresh));
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_caller_does_not_abort_refresh() {
		let fetcher =
			Arc::new(CountingFetcher::default().with_delay(Duration::from_millis(500)));
		let cache = cache_with(&fetcher, HOUR);
		let cancelled = tokio::time::timeout(Duration::from_millis(100), cache.get()).await;

		assert!(cancelled.is_err());

		let credential = cache.get().await.expect("Surviving caller should get the crumb.");

		assert_eq!(credential.token.expose(), "crumb-1");
		assert_eq!(fetcher.calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn panicking_refresh_frees_the_slot() {
		let fetcher = Arc::new(PanicsOnceFetcher::default());
		let cache = CredentialCache::new(fetcher.clone(), HOUR);
		let (a, b) = tokio::join!(cache.get(), cache.get());

		assert!(matches!(a, Err(Error::Cancelled)));
		assert!(matches!(b, Err(Error::Cancelled)));
		assert!(format!("{cache:?}").contains("refreshing: false"));

		let recovered = cache.get().await.expect("Next get should start a new refresh.");

		assert_eq!(recovered.token.expose(), "crumb-2");
		assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
		assert_eq!(cache.peek(), Some(recovered));
	}

	#[test]
	fn zero_window_is_rejected() {
		let fetcher: Arc<dyn CredentialFetcher> = Arc::new(CountingFetcher::default());
		let err = CredentialCache::from_config(fetcher, &CredentialConfig { validity_secs: 0 })
			.expect_err("Zero validity should be rejected.");

		assert_eq!(err, ConfigError::ZeroValidityWindow);
	}
}
