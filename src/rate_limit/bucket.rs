//! Continuous-refill token bucket with FIFO admission.

// crates.io
use tokio::sync::Mutex as FairMutex;
// self
use crate::{_prelude::*, config::RateLimitConfig, error::ConfigError, obs};

// Float drift tolerated when comparing the balance against a request.
const TOKEN_EPSILON: f64 = 1e-9;

/// Fixed-capacity token pool refilled continuously at `refill_per_second`.
///
/// Waiters queue on a fair (FIFO) gate: only the head of the queue inspects the balance, and
/// it sleeps until the deficit has been refilled instead of polling. Dropping an
/// [`acquire`](Self::acquire) future at any point leaves the bucket untouched and hands the
/// gate to the next waiter.
#[derive(Debug)]
pub struct TokenBucket {
	enabled: bool,
	capacity: u32,
	refill_per_second: f64,
	state: Mutex<BucketState>,
	gate: FairMutex<()>,
}
impl TokenBucket {
	/// Creates a full bucket after validating the parameters.
	pub fn new(capacity: u32, refill_per_second: f64) -> Result<Self, ConfigError> {
		Self::from_config(&RateLimitConfig::new(capacity, refill_per_second))
	}

	/// Creates a bucket from configuration; disabled configurations skip validation.
	pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigError> {
		if config.enabled {
			config.validate()?;
		}

		Ok(Self {
			enabled: config.enabled,
			capacity: config.capacity,
			refill_per_second: config.refill_per_second,
			state: Mutex::new(BucketState {
				tokens: f64::from(config.capacity),
				last_refill: Instant::now(),
			}),
			gate: FairMutex::new(()),
		})
	}

	/// Creates a limiter whose [`acquire`](Self::acquire) returns immediately.
	pub fn disabled() -> Self {
		Self {
			enabled: false,
			capacity: 0,
			refill_per_second: 0.,
			state: Mutex::new(BucketState { tokens: 0., last_refill: Instant::now() }),
			gate: FairMutex::new(()),
		}
	}

	/// Returns `false` when the limiter was configured off.
	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Maximum number of tokens held.
	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// Tokens added per second.
	pub fn refill_per_second(&self) -> f64 {
		self.refill_per_second
	}

	/// Suspends the caller until `n` tokens are available, then debits them.
	///
	/// Requests larger than the capacity are clamped to it so they are eventually admitted.
	/// `n == 0` and disabled limiters return immediately.
	pub async fn acquire(&self, n: u32) {
		if !self.enabled || n == 0 {
			return;
		}

		let wanted = f64::from(n.min(self.capacity));
		let _turn = self.gate.lock().await;

		loop {
			let wait = {
				let mut state = self.state.lock();

				state.refill(Instant::now(), self.capacity, self.refill_per_second);

				if state.tokens + TOKEN_EPSILON >= wanted {
					state.tokens = (state.tokens - wanted).max(0.);

					obs::record_available_tokens(state.tokens);

					return;
				}

				self.wait_for(wanted - state.tokens)
			};

			obs::debug(obs::Stage::Admission, format_args!("waiting {wait:?} for {n} token(s)"));
			tokio::time::sleep(wait).await;
		}
	}

	/// Debits `n` tokens only if they are available right now and nobody is queued ahead.
	///
	/// Requests larger than the capacity are clamped the same way [`acquire`](Self::acquire)
	/// clamps them.
	pub fn try_acquire(&self, n: u32) -> bool {
		if !self.enabled || n == 0 {
			return true;
		}

		let Ok(_turn) = self.gate.try_lock() else {
			return false;
		};
		let wanted = f64::from(n.min(self.capacity));
		let mut state = self.state.lock();

		state.refill(Instant::now(), self.capacity, self.refill_per_second);

		if state.tokens + TOKEN_EPSILON >= wanted {
			state.tokens = (state.tokens - wanted).max(0.);

			true
		} else {
			false
		}
	}

	/// Snapshot of the current balance; stale as soon as it is returned.
	pub fn available_tokens(&self) -> f64 {
		if !self.enabled {
			return f64::INFINITY;
		}

		let mut state = self.state.lock();

		state.refill(Instant::now(), self.capacity, self.refill_per_second);

		state.tokens
	}

	/// Advisory wait, in milliseconds, before `n` tokens would be available.
	pub fn estimated_wait_millis(&self, n: u32) -> u64 {
		if !self.enabled {
			return 0;
		}

		let deficit = f64::from(n) - self.available_tokens();

		if deficit <= 0. {
			return 0;
		}

		(deficit / self.refill_per_second * 1_000.).ceil() as u64
	}

	// Rounded up to whole milliseconds so a paused or coarse clock always makes progress.
	fn wait_for(&self, deficit: f64) -> Duration {
		let millis = (deficit / self.refill_per_second * 1_000.).ceil().max(1.);

		Duration::from_millis(millis as u64)
	}
}

#[derive(Debug)]
struct BucketState {
	tokens: f64,
	last_refill: Instant,
}
impl BucketState {
	fn refill(&mut self, now: Instant, capacity: u32, rate: f64) {
		if now <= self.last_refill {
			return;
		}

		let elapsed = now.duration_since(self.last_refill).as_secs_f64();

		self.tokens = (self.tokens + elapsed * rate).min(f64::from(capacity));
		self.last_refill = now;
	}
}
