//! Processed and failed counters for the dispatcher.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Thread-safe counters for dispatched items.
#[derive(Debug, Default)]
pub struct DispatchStats {
	processed: AtomicU64,
	failed: AtomicU64,
}
impl DispatchStats {
	/// Returns the number of items the API accepted.
	pub fn processed(&self) -> u64 {
		self.processed.load(Ordering::Relaxed)
	}

	/// Returns the number of items that failed and were dropped after logging.
	pub fn failed(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	/// Returns both counters at once.
	pub fn snapshot(&self) -> DispatchCounts {
		DispatchCounts { processed: self.processed(), failed: self.failed() }
	}

	pub(crate) fn record_success(&self) {
		self.processed.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounts {
	/// Items the API accepted.
	pub processed: u64,
	/// Items that failed.
	pub failed: u64,
}
impl DispatchCounts {
	/// Counts accumulated since `earlier`.
	pub fn since(&self, earlier: DispatchCounts) -> DispatchCounts {
		DispatchCounts {
			processed: self.processed.saturating_sub(earlier.processed),
			failed: self.failed.saturating_sub(earlier.failed),
		}
	}

	/// Failures as a percentage of all attempts; zero when nothing was attempted.
	pub fn error_rate(&self) -> f64 {
		let attempts = self.processed + self.failed;

		if attempts == 0 { 0.0 } else { self.failed as f64 / attempts as f64 * 100.0 }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn window_deltas_and_error_rate() {
		let stats = DispatchStats::default();

		stats.record_success();

		let before = stats.snapshot();

		stats.record_success();
		stats.record_success();
		stats.record_failure();

		let window = stats.snapshot().since(before);

		assert_eq!(window, DispatchCounts { processed: 2, failed: 1 });
		assert!((window.error_rate() - 100.0 / 3.0).abs() < 1e-9);
		assert_eq!(DispatchCounts::default().error_rate(), 0.0);
	}
}
