//! Validated, atomically updated pacing rate.

// std
use std::sync::atomic::{AtomicU32, Ordering};
// self
use crate::error::InvalidRate;

/// Global requests-per-second ceiling shared by the relay and its worker.
///
/// Writes are validated and applied atomically; the worker reads the value once per cycle, so
/// an update never shortens a pacing sleep that is already in progress.
#[derive(Debug)]
pub struct RateLimit(AtomicU32);
impl RateLimit {
	/// Smallest accepted rate.
	pub const MIN: u32 = 1;
	/// Largest accepted rate.
	pub const MAX: u32 = 100;

	/// Creates a limit after validating `rate`.
	pub fn new(rate: u32) -> Result<Self, InvalidRate> {
		let requested = i64::from(rate);

		if !Self::accepts(requested) {
			return Err(Self::rejection(requested));
		}

		Ok(Self(AtomicU32::new(rate)))
	}

	/// Returns `true` when `rate` lies within `MIN..=MAX`.
	pub fn accepts(rate: i64) -> bool {
		(i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&rate)
	}

	/// Current rate in requests per second.
	pub fn get(&self) -> u32 {
		self.0.load(Ordering::Acquire)
	}

	/// Replaces the rate; out-of-range values are rejected without any state change.
	pub fn set(&self, rate: i64) -> Result<(), InvalidRate> {
		let accepted = u32::try_from(rate)
			.ok()
			.filter(|_| Self::accepts(rate))
			.ok_or_else(|| Self::rejection(rate))?;

		self.0.store(accepted, Ordering::Release);

		Ok(())
	}

	/// Pause the worker takes after each call at the current rate.
	pub fn interval(&self) -> std::time::Duration {
		Self::interval_for(self.get())
	}

	/// `floor(1000 / rate)` milliseconds; zero for a zero rate.
	pub fn interval_for(rate: u32) -> std::time::Duration {
		match rate {
			0 => std::time::Duration::ZERO,
			rate => std::time::Duration::from_millis(u64::from(1_000 / rate)),
		}
	}

	fn rejection(requested: i64) -> InvalidRate {
		InvalidRate { requested, min: Self::MIN, max: Self::MAX }
	}
}
