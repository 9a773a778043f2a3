//! Observability helpers shared by the dispatcher and the credential cache.
//!
//! # Feature Flags
//!
//! - Spans named `paced_relay.dispatch` and `paced_relay.credential` are always emitted through
//!   `tracing`, carrying the `stage` plus item `id`/`kind` where applicable.
//! - Enable `metrics` to increment `paced_relay_dispatch_total` (labeled by `outcome`) and
//!   `paced_relay_credential_fetch_total` (labeled by `outcome`), and to publish the
//!   `paced_relay_queue_depth` gauge.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for each dispatched item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
	/// The API accepted the item.
	Success,
	/// The item failed and was dropped after logging.
	Failure,
}
impl DispatchOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			DispatchOutcome::Success => "success",
			DispatchOutcome::Failure => "failure",
		}
	}
}
impl Display for DispatchOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each credential fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialOutcome {
	/// A fresh credential was cached.
	Success,
	/// The fetch failed and the cache was left empty.
	Failure,
}
impl CredentialOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialOutcome::Success => "success",
			CredentialOutcome::Failure => "failure",
		}
	}
}
impl Display for CredentialOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
