// self
use crate::obs::{CallKind, CallOutcome};

/// Counter incremented once per recorded call outcome, labeled by `call` and `outcome`.
pub const CALL_COUNTER: &str = "bearer_dispatch_call_total";

/// Records a call outcome on the active metrics recorder; a no-op unless the `metrics` feature
/// is enabled.
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		let counter = metrics::counter!(
			CALL_COUNTER,
			"call" => kind.as_str(),
			"outcome" => outcome.as_str()
		);

		counter.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}
