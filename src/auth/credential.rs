//! Immutable crumb credential and its redacting secret wrapper.

// self
use crate::_prelude::*;

/// Redacted crumb wrapper keeping the credential out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrumbSecret(String);
impl CrumbSecret {
	/// Wraps a new crumb string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner crumb. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for CrumbSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for CrumbSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("CrumbSecret").field(&"<redacted>").finish()
	}
}
impl Display for CrumbSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Strategy that produced a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
	/// Primary crumb endpoint.
	Primary,
	/// Secondary crumb endpoint used after the primary one failed.
	Fallback,
	/// Crumb injected by the caller.
	Static,
}
impl CredentialSource {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialSource::Primary => "primary",
			CredentialSource::Fallback => "fallback",
			CredentialSource::Static => "static",
		}
	}
}
impl Display for CredentialSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Short-lived crumb attached to every upstream call.
///
/// Credentials are replaced wholesale on refresh and never mutated in place.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	/// Crumb value; callers must avoid logging it.
	pub token: CrumbSecret,
	/// Strategy that produced the crumb.
	pub source: CredentialSource,
	/// Monotonic issue instant used for validity checks.
	pub issued_at: Instant,
	/// Wall-clock issue instant for diagnostics.
	pub issued_at_utc: OffsetDateTime,
}
impl Credential {
	/// Stamps a freshly obtained crumb with the current instant.
	pub fn issue(token: impl Into<String>, source: CredentialSource) -> Self {
		Self {
			token: CrumbSecret::new(token),
			source,
			issued_at: Instant::now(),
			issued_at_utc: OffsetDateTime::now_utc(),
		}
	}

	/// Time elapsed since issue, measured at `now`.
	pub fn age_at(&self, now: Instant) -> Duration {
		now.saturating_duration_since(self.issued_at)
	}

	/// Returns `true` while `now - issued_at < window`.
	pub fn is_valid_at(&self, now: Instant, window: Duration) -> bool {
		self.age_at(now) < window
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &self.token)
			.field("source", &self.source)
			.field("issued_at_utc", &self.issued_at_utc)
			.finish()
	}
}
