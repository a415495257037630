// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_gate_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how many queued callers one refresh cycle released.
pub fn record_refresh_batch(queued: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("session_gate_refresh_batch_size").record(queued as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = queued;
	}
}
