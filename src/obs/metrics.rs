// self
use crate::obs::{Stage, StageOutcome};

/// Records a stage outcome via the global metrics recorder (when enabled).
pub fn record_stage_outcome(stage: Stage, outcome: StageOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"crumb_broker_stage_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Publishes the token balance left after an admission (when enabled).
pub fn record_available_tokens(tokens: f64) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("crumb_broker_available_tokens").set(tokens);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = tokens;
	}
}
