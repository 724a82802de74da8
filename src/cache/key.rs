//! Normalized request identifiers.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Identifies a cacheable request by endpoint name, optional URL path, and normalized
/// parameters.
///
/// The path matters for endpoints that carry the symbol in the URL (`/chart/{symbol}`).
/// Parameters are kept sorted by name. Comma-separated values (module sets, symbol lists) are
/// trimmed, deduplicated, and sorted so `modules=price,assetProfile` and
/// `modules=assetProfile,price` address the same entry.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	endpoint: String,
	path: Option<String>,
	params: BTreeMap<String, String>,
}
impl CacheKey {
	/// Creates a key for `endpoint` with no parameters.
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self { endpoint: endpoint.into(), path: None, params: BTreeMap::new() }
	}

	/// Scopes the key to a URL path; the path is kept verbatim.
	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());

		self
	}

	/// Adds or replaces a parameter, normalizing list values.
	pub fn with_param(mut self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
		self.params.insert(name.into(), normalize_value(value.as_ref()));

		self
	}

	/// Endpoint name used for TTL lookups.
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// URL path the key is scoped to, if any.
	pub fn path(&self) -> Option<&str> {
		self.path.as_deref()
	}

	/// Normalized parameters.
	pub fn params(&self) -> &BTreeMap<String, String> {
		&self.params
	}

	/// Canonical string form, e.g. `quoteSummary?modules=assetProfile,price&symbol=AAPL` or
	/// `chart@/v8/finance/chart/AAPL?interval=1d` for a path-scoped key.
	pub fn normalized(&self) -> String {
		let mut buf = self.endpoint.clone();

		if let Some(path) = &self.path {
			buf.push('@');
			buf.push_str(path);
		}

		for (idx, (name, value)) in self.params.iter().enumerate() {
			buf.push(if idx == 0 { '?' } else { '&' });
			buf.push_str(name);
			buf.push('=');
			buf.push_str(value);
		}

		buf
	}

	/// Stable base64 (no padding) SHA-256 digest of [`normalized`](Self::normalized).
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.normalized().as_bytes());

		STANDARD_NO_PAD.encode(hasher.finalize())
	}
}
impl From<&str> for CacheKey {
	fn from(endpoint: &str) -> Self {
		Self::new(endpoint)
	}
}
impl Debug for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CacheKey({})", self.normalized())
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}

fn normalize_value(value: &str) -> String {
	if !value.contains(',') {
		return value.trim().to_owned();
	}

	let mut parts = value
		.split(',')
		.map(str::trim)
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>();

	parts.sort_unstable();
	parts.dedup();

	parts.join(",")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn module_sets_normalize_regardless_of_order() {
		let a = CacheKey::new("quoteSummary")
			.with_param("symbol", "AAPL")
			.with_param("modules", "price, assetProfile,price");
		let b = CacheKey::new("quoteSummary")
			.with_param("modules", "assetProfile,price")
			.with_param("symbol", "AAPL");

		assert_eq!(a, b);
		assert_eq!(a.fingerprint(), b.fingerprint());
		assert_eq!(a.normalized(), "quoteSummary?modules=assetProfile,price&symbol=AAPL");
	}

	#[test]
	fn distinct_params_produce_distinct_keys() {
		let daily = CacheKey::new("chart").with_param("symbol", "MSFT").with_param("interval", "1d");
		let weekly =
			CacheKey::new("chart").with_param("symbol", "MSFT").with_param("interval", "1wk");

		assert_ne!(daily, weekly);
		assert_ne!(daily.fingerprint(), weekly.fingerprint());
	}

	#[test]
	fn paths_scope_otherwise_equal_keys() {
		let aapl = CacheKey::new("chart")
			.with_path("/v8/finance/chart/AAPL")
			.with_param("interval", "1d");
		let msft = CacheKey::new("chart")
			.with_path("/v8/finance/chart/MSFT")
			.with_param("interval", "1d");

		assert_ne!(aapl, msft);
		assert_ne!(aapl.fingerprint(), msft.fingerprint());
		assert_eq!(aapl.path(), Some("/v8/finance/chart/AAPL"));
		assert_eq!(aapl.normalized(), "chart@/v8/finance/chart/AAPL?interval=1d");
	}

	#[test]
	fn bare_keys_display_endpoint_only() {
		let key = CacheKey::from("AAPL:price");

		assert_eq!(key.to_string(), "AAPL:price");
		assert_eq!(format!("{key:?}"), "CacheKey(AAPL:price)");
	}
}
