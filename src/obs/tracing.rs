// self
use crate::{_prelude::*, auth::CredentialKind, obs::CallKind, store::StoreError};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used around client calls.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided call kind + stage.
	pub fn new(kind: CallKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("bearer_dispatch.call", call = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
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

pub(crate) fn storage_read_failed(kind: CredentialKind, error: &StoreError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			credential = kind.as_str(),
			%error,
			"Credential read failed; treating it as absent."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, error);
	}
}

pub(crate) fn cleanup_failed(error: &StoreError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(%error, "Clearing stored credentials failed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

pub(crate) fn refresh_settled(outcome: &'static str, waiters: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(outcome, waiters, "Refresh cycle settled.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (outcome, waiters);
	}
}

pub(crate) fn auth_retry(path: &str, attempt: u32) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(path, attempt, "Resending request with a refreshed credential.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (path, attempt);
	}
}
