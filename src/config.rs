//! Tunables consumed by the pipeline; loading them (files, env, flags) happens elsewhere.
//!
//! Durations are expressed in whole seconds so the structs round-trip cleanly through JSON or
//! TOML documents.

// self
use crate::{_prelude::*, error::ConfigError};

/// Top-level configuration for a [`RequestPipeline`](crate::pipeline::RequestPipeline).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
	/// Outbound admission budget.
	pub rate_limit: RateLimitConfig,
	/// Crumb lifetime.
	pub credential: CredentialConfig,
	/// Response cache sizing and TTLs.
	pub cache: CacheConfig,
}
impl PipelineConfig {
	/// Overrides the rate limiter section.
	pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.rate_limit = rate_limit;

		self
	}

	/// Overrides the credential section.
	pub fn with_credential(mut self, credential: CredentialConfig) -> Self {
		self.credential = credential;

		self
	}

	/// Overrides the cache section.
	pub fn with_cache(mut self, cache: CacheConfig) -> Self {
		self.cache = cache;

		self
	}

	/// Checks every section, returning the first violation.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.rate_limit.validate()?;
		self.credential.validate()?;
		self.cache.validate()
	}
}

/// Token bucket parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
	/// Disables throttling entirely when `false`.
	pub enabled: bool,
	/// Maximum burst size.
	pub capacity: u32,
	/// Tokens added per second.
	pub refill_per_second: f64,
}
impl RateLimitConfig {
	/// Creates an enabled limiter configuration.
	pub fn new(capacity: u32, refill_per_second: f64) -> Self {
		Self { enabled: true, capacity, refill_per_second }
	}

	/// Returns a configuration that admits every call immediately.
	pub fn disabled() -> Self {
		Self { enabled: false, ..Self::default() }
	}

	/// Validates capacity and refill rate.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.capacity == 0 {
			return Err(ConfigError::ZeroCapacity);
		}
		if !self.refill_per_second.is_finite() || self.refill_per_second <= 0. {
			return Err(ConfigError::InvalidRefillRate { rate: self.refill_per_second });
		}

		Ok(())
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { enabled: true, capacity: 5, refill_per_second: 1. }
	}
}

/// Crumb lifetime parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
	/// Seconds a freshly issued crumb stays valid.
	pub validity_secs: u64,
}
impl CredentialConfig {
	/// Validity window as a [`Duration`].
	pub fn validity(&self) -> Duration {
		Duration::from_secs(self.validity_secs)
	}

	/// Validates the window.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.validity_secs == 0 { Err(ConfigError::ZeroValidityWindow) } else { Ok(()) }
	}
}
impl Default for CredentialConfig {
	fn default() -> Self {
		Self { validity_secs: 3_600 }
	}
}

/// Response cache parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// TTL applied to endpoints without an override.
	pub default_ttl_secs: u64,
	/// Upper bound on stored entries; least recently used entries are evicted past it.
	pub max_entries: usize,
	/// Per-endpoint TTL overrides, keyed by endpoint name.
	pub endpoint_ttl_secs: BTreeMap<String, u64>,
}
impl CacheConfig {
	/// Adds or replaces the TTL override for `endpoint`.
	pub fn with_endpoint_ttl(mut self, endpoint: impl Into<String>, ttl: Duration) -> Self {
		self.endpoint_ttl_secs.insert(endpoint.into(), ttl.as_secs());

		self
	}

	/// Validates the capacity bound.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_entries == 0 { Err(ConfigError::ZeroCacheCapacity) } else { Ok(()) }
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self { default_ttl_secs: 60, max_entries: 1_024, endpoint_ttl_secs: BTreeMap::new() }
	}
}
