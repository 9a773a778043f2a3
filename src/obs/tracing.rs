// self
use crate::_prelude::*;

/// Span builder used around dispatches and credential fetches.
#[derive(Clone, Debug)]
pub struct RelaySpan {
	span: tracing::Span,
}
impl RelaySpan {
	/// Creates a span for one queued item passing through the dispatcher.
	pub fn dispatch(id: &str, kind: &str) -> Self {
		Self { span: tracing::info_span!("paced_relay.dispatch", stage = "dispatch", id, kind) }
	}

	/// Creates a span for a credential operation tagged with `stage`.
	pub fn credential(stage: &'static str) -> Self {
		Self { span: tracing::info_span!("paced_relay.credential", stage) }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> tracing::instrument::Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}
