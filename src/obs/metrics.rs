// self
use crate::obs::{CredentialOutcome, DispatchOutcome};

/// Records a dispatch outcome via the global metrics recorder (when enabled).
pub fn record_dispatch_outcome(outcome: DispatchOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("paced_relay_dispatch_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records a credential fetch outcome via the global metrics recorder (when enabled).
pub fn record_credential_fetch(outcome: CredentialOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("paced_relay_credential_fetch_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Publishes the current queue depth via the global metrics recorder (when enabled).
pub fn record_queue_depth(depth: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("paced_relay_queue_depth").set(depth as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = depth;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_dispatch_outcome(DispatchOutcome::Failure);
		record_credential_fetch(CredentialOutcome::Success);
		record_queue_depth(3);
	}
}
