//! Single-flight, TTL-bounded store of parsed responses.
//!
//! Lookups go through three steps under one short lock: a live entry is returned as is; a
//! fetch already running for the key is joined; otherwise a new fetch is spawned and
//! registered. The spawned task stores a successful value and clears the in-flight marker in
//! one critical section, so failures never leave an entry behind. A fetch that panics clears
//! its marker on the way out, so the next caller starts over.

// self
use crate::{
	_prelude::*,
	cache::CacheKey,
	config::CacheConfig,
	error::ConfigError,
	obs::{self, Stage, StageOutcome},
	pipeline::PipelineMetrics,
	singleflight::{self, ClearOnExit, InFlight},
};

/// Keyed cache of successful results with lazy TTL expiry and an LRU size bound.
pub struct ResponseCache<V> {
	state: Arc<Mutex<CacheState<V>>>,
	metrics: Arc<PipelineMetrics>,
}
impl<V> ResponseCache<V>
where
	V: 'static + Clone + Send + Sync,
{
	/// Creates an empty cache holding at most `max_entries` values.
	pub fn new(max_entries: usize) -> Result<Self, ConfigError> {
		if max_entries == 0 {
			return Err(ConfigError::ZeroCacheCapacity);
		}

		Ok(Self {
			state: Arc::new(Mutex::new(CacheState::new(max_entries))),
			metrics: Default::default(),
		})
	}

	/// Creates an empty cache sized by `config`.
	pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
		Self::new(config.max_entries)
	}

	/// Shares the provided counters instead of private ones.
	pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
		self.metrics = metrics;

		self
	}

	/// Counters updated by this cache.
	pub fn metrics(&self) -> &Arc<PipelineMetrics> {
		&self.metrics
	}

	/// Returns the cached value for `key`, joining or starting a single upstream fetch on a
	/// miss.
	///
	/// `fetch` is invoked at most once, under the cache lock, and must only build the future;
	/// the future itself runs on its own task. A zero `ttl` still collapses concurrent callers
	/// but stores nothing.
	pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, ttl: Duration, fetch: F) -> Result<V>
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = Result<V>>,
	{
		let in_flight = {
			let mut state = self.state.lock();

			if let Some(value) = state.lookup(&key, Instant::now()) {
				self.metrics.record_cache_hit();
				obs::record_stage_outcome(Stage::CacheCheck, StageOutcome::Hit);
				obs::debug(Stage::CacheCheck, format_args!("cache hit for {key}"));

				return Ok(value);
			}

			match state.in_flight.get(&key) {
				Some(in_flight) => {
					self.metrics.record_cache_join();
					obs::debug(Stage::CacheCheck, format_args!("joining in-flight fetch for {key}"));

					in_flight.clone()
				},
				None => {
					self.metrics.record_cache_miss();
					obs::record_stage_outcome(Stage::CacheCheck, StageOutcome::Miss);
					obs::debug(Stage::CacheCheck, format_args!("cache miss for {key}"));

					let in_flight = self.spawn_fetch(key.clone(), ttl, fetch());

					state.in_flight.insert(key, in_flight.clone());

					in_flight
				},
			}
		};

		in_flight.await
	}

	/// Returns the live value for `key` without fetching.
	pub fn get(&self, key: &CacheKey) -> Option<V> {
		self.state.lock().lookup(key, Instant::now())
	}

	/// Removes any entry for `key`; a fetch already in flight still stores its result.
	pub fn invalidate(&self, key: &CacheKey) -> bool {
		self.state.lock().entries.remove(key).is_some()
	}

	/// Drops every expired entry.
	pub fn purge_expired(&self) {
		self.state.lock().purge_expired(Instant::now());
	}

	/// Drops every entry; in-flight fetches are left running.
	pub fn clear(&self) {
		self.state.lock().entries.clear();
	}

	/// Number of stored entries, including expired ones not yet evicted.
	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of keys with a fetch currently running.
	pub fn in_flight(&self) -> usize {
		self.state.lock().in_flight.len()
	}

	fn spawn_fetch<Fut>(&self, key: CacheKey, ttl: Duration, fetch: Fut) -> InFlight<V>
	where
		Fut: 'static + Send + Future<Output = Result<V>>,
	{
		let state = self.state.clone();

		singleflight::spawn(async move {
			let guard = ClearOnExit::new({
				let state = state.clone();
				let key = key.clone();

				move || {
					state.lock().in_flight.remove(&key);
				}
			});
			let result = fetch.await;
			let mut state = state.lock();

			guard.disarm();
			state.in_flight.remove(&key);

			if let Some(value) = result.as_ref().ok().filter(|_| !ttl.is_zero()) {
				state.store(key, value.clone(), ttl, Instant::now());
			}

			result
		})
	}
}
impl<V> Clone for ResponseCache<V> {
	fn clone(&self) -> Self {
		Self { state: self.state.clone(), metrics: self.metrics.clone() }
	}
}
impl<V> Debug for ResponseCache<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("ResponseCache")
			.field("entries", &state.entries.len())
			.field("in_flight", &state.in_flight.len())
			.field("max_entries", &state.max_entries)
			.finish()
	}
}

struct CacheEntry<V> {
	value: V,
	stored_at: Instant,
	ttl: Duration,
	last_used: u64,
}
impl<V> CacheEntry<V> {
	fn is_live(&self, now: Instant) -> bool {
		now.saturating_duration_since(self.stored_at) < self.ttl
	}
}

struct CacheState<V> {
	entries: HashMap<CacheKey, CacheEntry<V>>,
	in_flight: HashMap<CacheKey, InFlight<V>>,
	max_entries: usize,
	clock: u64,
}
impl<V> CacheState<V>
where
	V: Clone,
{
	fn new(max_entries: usize) -> Self {
		Self { entries: HashMap::new(), in_flight: HashMap::new(), max_entries, clock: 0 }
	}

	fn lookup(&mut self, key: &CacheKey, now: Instant) -> Option<V> {
		let tick = self.tick();
		let entry = self.entries.get_mut(key)?;

		if entry.is_live(now) {
			entry.last_used = tick;

			return Some(entry.value.clone());
		}

		self.entries.remove(key);

		None
	}

	fn store(&mut self, key: CacheKey, value: V, ttl: Duration, now: Instant) {
		let last_used = self.tick();

		self.entries.insert(key, CacheEntry { value, stored_at: now, ttl, last_used });

		if self.entries.len() > self.max_entries {
			self.purge_expired(now);
		}
		while self.entries.len() > self.max_entries {
			let Some(oldest) = self
				.entries
				.iter()
				.min_by_key(|(_, entry)| entry.last_used)
				.map(|(key, _)| key.clone())
			else {
				break;
			};

			self.entries.remove(&oldest);
		}
	}

	fn purge_expired(&mut self, now: Instant) {
		self.entries.retain(|_, entry| entry.is_live(now));
	}

	fn tick(&mut self) -> u64 {
		self.clock += 1;

		self.clock
	}
}
