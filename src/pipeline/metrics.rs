// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters shared by the caches and the pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	cache_joins: AtomicU64,
	credential_refreshes: AtomicU64,
	credential_retries: AtomicU64,
	dispatches: AtomicU64,
	failures: AtomicU64,
}
impl PipelineMetrics {
	/// Lookups served from a live cache entry.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Lookups that started a new upstream fetch.
	pub fn cache_misses(&self) -> u64 {
		self.cache_misses.load(Ordering::Relaxed)
	}

	/// Lookups that joined a fetch already in flight.
	pub fn cache_joins(&self) -> u64 {
		self.cache_joins.load(Ordering::Relaxed)
	}

	/// Authentication round trips started.
	pub fn credential_refreshes(&self) -> u64 {
		self.credential_refreshes.load(Ordering::Relaxed)
	}

	/// Dispatches repeated after a credential rejection.
	pub fn credential_retries(&self) -> u64 {
		self.credential_retries.load(Ordering::Relaxed)
	}

	/// Calls handed to the transport.
	pub fn dispatches(&self) -> u64 {
		self.dispatches.load(Ordering::Relaxed)
	}

	/// Requests that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_miss(&self) {
		self.cache_misses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_join(&self) {
		self.cache_joins.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_credential_refresh(&self) {
		self.credential_refreshes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_credential_retry(&self) {
		self.credential_retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_dispatch(&self) {
		self.dispatches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
