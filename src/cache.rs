//! Response caching: normalized keys, per-endpoint TTLs, and the single-flight store.

pub mod key;
pub mod response;

pub use key::*;
pub use response::*;

// self
use crate::{_prelude::*, config::CacheConfig};

/// Resolves the TTL for a request from its endpoint name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
	default: Duration,
	per_endpoint: HashMap<String, Duration>,
}
impl TtlPolicy {
	/// Applies `default` to every endpoint.
	pub fn new(default: Duration) -> Self {
		Self { default, per_endpoint: HashMap::new() }
	}

	/// Builds the policy described by `config`.
	pub fn from_config(config: &CacheConfig) -> Self {
		Self {
			default: Duration::from_secs(config.default_ttl_secs),
			per_endpoint: config
				.endpoint_ttl_secs
				.iter()
				.map(|(endpoint, secs)| (endpoint.clone(), Duration::from_secs(*secs)))
				.collect(),
		}
	}

	/// Overrides the TTL for one endpoint.
	pub fn with_endpoint(mut self, endpoint: impl Into<String>, ttl: Duration) -> Self {
		self.per_endpoint.insert(endpoint.into(), ttl);

		self
	}

	/// TTL for `key`; a zero TTL disables storage for that endpoint.
	pub fn ttl_for(&self, key: &CacheKey) -> Duration {
		self.per_endpoint.get(key.endpoint()).copied().unwrap_or(self.default)
	}
}
impl Default for TtlPolicy {
	fn default() -> Self {
		Self::from_config(&CacheConfig::default())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn endpoint_overrides_win_over_default() {
		let config = CacheConfig::default()
			.with_endpoint_ttl("quote", Duration::from_secs(5))
			.with_endpoint_ttl("profile", Duration::from_secs(86_400));
		let policy = TtlPolicy::from_config(&config);

		assert_eq!(policy.ttl_for(&CacheKey::new("quote")), Duration::from_secs(5));
		assert_eq!(policy.ttl_for(&CacheKey::new("profile")), Duration::from_secs(86_400));
		assert_eq!(policy.ttl_for(&CacheKey::new("chart")), Duration::from_secs(60));
	}
}
