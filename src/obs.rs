//! Optional observability helpers for pipeline stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `crumb_broker.stage` with the `stage` and
//!   `key` fields, plus `debug!` events for refreshes, retries, cache hits, and limiter waits.
//! - Enable `metrics` to increment the `crumb_broker_stage_total` counter for every
//!   attempt/success/failure/hit/miss/retry, labeled by `stage` + `outcome`, and to publish the
//!   `crumb_broker_available_tokens` gauge.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Response cache lookup and single-flight join.
	CacheCheck,
	/// Token bucket admission.
	Admission,
	/// Crumb lookup or refresh.
	Authenticate,
	/// Upstream call through the transport.
	Dispatch,
	/// Mapping of upstream outcomes into values or typed errors.
	Translate,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::CacheCheck => "cache_check",
			Stage::Admission => "admission",
			Stage::Authenticate => "authenticate",
			Stage::Dispatch => "dispatch",
			Stage::Translate => "translate",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Served from cache.
	Hit,
	/// Not served from cache.
	Miss,
	/// Stage repeated after a credential rejection.
	Retry,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
			StageOutcome::Hit => "hit",
			StageOutcome::Miss => "miss",
			StageOutcome::Retry => "retry",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
