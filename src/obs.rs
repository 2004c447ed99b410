//! Optional observability helpers for authentication passes.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_gate.authenticate` with the
//!   `provider` and `stage` fields.
//! - Enable `metrics` to increment the `oauth2_gate_authenticate_total` counter for every
//!   attempt and verdict, labeled by `provider` + `stage` + `verdict`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Phases of the authentication state machine, derived from the request and the
/// stored state alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthStage {
	/// Explicit login attempt naming this provider.
	Initiate,
	/// Provider callback answering this strategy's pending redirect.
	Callback,
	/// Silent continuation on a previously stored token.
	Resume,
}
impl AuthStage {
	/// Stable lowercase label for spans and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthStage::Initiate => "initiate",
			AuthStage::Callback => "callback",
			AuthStage::Resume => "resume",
		}
	}
}
impl Display for AuthStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Verdict labels recorded for each authentication pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthVerdict {
	/// Entry into an applicable strategy.
	Attempt,
	/// The strategy was not applicable and passed the request on.
	Skipped,
	/// The pass ended in a redirect to the provider.
	Redirect,
	/// A user was resolved.
	Success,
	/// The pass failed, by provider rejection or by resolution miss.
	Failure,
}
impl AuthVerdict {
	/// Label recorded on the counter alongside `provider` and `stage`.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthVerdict::Attempt => "attempt",
			AuthVerdict::Skipped => "skipped",
			AuthVerdict::Redirect => "redirect",
			AuthVerdict::Success => "success",
			AuthVerdict::Failure => "failure",
		}
	}
}
impl Display for AuthVerdict {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
