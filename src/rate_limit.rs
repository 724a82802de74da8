//! Outbound admission control.
//!
//! A [`RateLimiterHandle`] is the shared-ownership face of a [`TokenBucket`]: clone it into
//! every pipeline that must draw from the same upstream budget instead of relying on a
//! process-wide registry.

mod bucket;

pub use bucket::TokenBucket;

// std
use std::ops::Deref;
// self
use crate::{_prelude::*, config::RateLimitConfig, error::ConfigError};

/// Cheaply cloneable handle to a shared [`TokenBucket`].
#[derive(Clone, Debug)]
pub struct RateLimiterHandle(Arc<TokenBucket>);
impl RateLimiterHandle {
	/// Builds a handle around a new bucket created from `config`.
	pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigError> {
		TokenBucket::from_config(config).map(Self::from)
	}

	/// Builds a handle that never throttles.
	pub fn disabled() -> Self {
		Self::from(TokenBucket::disabled())
	}

	/// Returns `true` when both handles draw from the same bucket.
	pub fn shares_budget_with(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}
impl From<TokenBucket> for RateLimiterHandle {
	fn from(bucket: TokenBucket) -> Self {
		Self(Arc::new(bucket))
	}
}
impl Deref for RateLimiterHandle {
	type Target = TokenBucket;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn clones_share_one_budget() {
		let first = RateLimiterHandle::from_config(&RateLimitConfig::new(2, 1.))
			.expect("Limiter fixture should be valid.");
		let second = first.clone();

		assert!(first.shares_budget_with(&second));
		assert!(first.try_acquire(1));
		assert!(second.try_acquire(1));
		assert!(!first.try_acquire(1));
		assert!(!second.try_acquire(1));
	}

	#[test]
	fn disabled_config_skips_validation() {
		let handle = RateLimiterHandle::from_config(&RateLimitConfig {
			enabled: false,
			capacity: 0,
			refill_per_second: 0.,
		})
		.expect("Disabled limiter should not validate its parameters.");

		assert!(!handle.is_enabled());
		assert!(RateLimiterHandle::from_config(&RateLimitConfig::new(0, 1.)).is_err());
	}
}
