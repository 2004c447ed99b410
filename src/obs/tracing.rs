// self
use crate::{_prelude::*, obs::AuthStage};

/// Future wrapper produced by [`AuthSpan::instrument`].
#[cfg(feature = "tracing")]
pub type InstrumentedAuth<F> = tracing::instrument::Instrumented<F>;
/// Plain passthrough; the `tracing` feature is off.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedAuth<F> = F;

/// Span covering one strategy's authentication pass, from dispatch to verdict.
///
/// Compiles to a no-op shell when the `tracing` feature is disabled, so call
/// sites never need their own feature gates.
#[derive(Clone, Debug)]
pub struct AuthSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl AuthSpan {
	/// Opens a span carrying the provider key and the stage the request matched.
	pub fn new(provider: &str, stage: Option<AuthStage>) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_gate.authenticate",
				provider,
				stage = stage.map(AuthStage::as_str).unwrap_or("none")
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (provider, stage);

			Self {}
		}
	}

	/// Consumes the span and enters it, for code with no `.await` in scope.
	pub fn entered(self) -> AuthSpanGuard {
		#[cfg(feature = "tracing")]
		{
			AuthSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			AuthSpanGuard {}
		}
	}

	/// Attaches the span to `fut`; the guard-free form that is safe across
	/// `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedAuth<Fut>
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

/// Keeps the span entered until dropped.
pub struct AuthSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for AuthSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("AuthSpanGuard(..)")
	}
}
