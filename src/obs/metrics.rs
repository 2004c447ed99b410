// self
use crate::obs::{AuthStage, AuthVerdict};

/// Bumps the authenticate counter on the global metrics recorder.
///
/// Without the `metrics` feature this compiles down to nothing.
pub fn record_auth_verdict(provider: &str, stage: Option<AuthStage>, verdict: AuthVerdict) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_gate_authenticate_total",
			"provider" => provider.to_owned(),
			"stage" => stage.map(AuthStage::as_str).unwrap_or("none"),
			"verdict" => verdict.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (provider, stage, verdict);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn counter_calls_compile_with_and_without_a_stage() {
		record_auth_verdict("github", Some(AuthStage::Callback), AuthVerdict::Success);
		record_auth_verdict("github", None, AuthVerdict::Skipped);
	}
}
