// std
use std::fmt::Arguments;
// self
use crate::{_prelude::*, obs::Stage};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedStage<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedStage<F> = F;

/// A span builder used by pipeline stages.
#[derive(Clone, Debug)]
pub struct StageSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl StageSpan {
	/// Creates a new span tagged with the provided stage + request key.
	pub fn new(stage: Stage, key: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("crumb_broker.stage", stage = stage.as_str(), key);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, key);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedStage<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `debug!` event tagged with `stage` (when enabled).
pub fn debug(stage: Stage, message: Arguments<'_>) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(stage = stage.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, message);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn debug_noop_without_tracing() {
		debug(Stage::Authenticate, format_args!("refreshing crumb"));
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = StageSpan::new(Stage::Dispatch, "quote:AAPL");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
