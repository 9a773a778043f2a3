//! Facade wiring the credential cache, API client, queue, and dispatcher together.

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentialsSource, CredentialSource, CredentialStatus, TokenCache},
	client::ApiClient,
	config::RelayConfig,
	dispatch::{
		DispatchCounts, DispatchQueue, QueueStatus, QueuedRequest, RateLimit,
		RateLimitedDispatcher, ShutdownReport,
	},
	error::{InvalidRate, QueueError},
	http::HttpTransport,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Combined snapshot returned by [`Relay::status`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayStatus {
	/// Queue depth, capacity, rate, and worker liveness.
	pub queue: QueueStatus,
	/// Cached credential state.
	pub credential: CredentialStatus,
	/// Cumulative dispatch counters.
	pub counts: DispatchCounts,
}

/// Running relay: accepts items, paces them out, and keeps the credential fresh.
///
/// Construction spawns the dispatcher worker, so it must happen inside a tokio runtime.
///
/// Outbound API calls are only issued by the dispatcher worker; the relay hands out no client.
pub struct Relay {
	enqueue_timeout: std::time::Duration,
	queue: Arc<DispatchQueue>,
	tokens: Arc<TokenCache>,
	dispatcher: RateLimitedDispatcher,
}
impl Relay {
	/// Builds a relay backed by a reqwest transport that never follows redirects.
	#[cfg(feature = "reqwest")]
	pub fn start(config: RelayConfig) -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.user_agent(config.api.user_agent.clone())
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Self::with_transport(config, Arc::new(ReqwestTransport::with_client(client)))
	}

	/// Builds a relay that uses `transport` for both the token endpoint and the API.
	pub fn with_transport(config: RelayConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
		let source = Arc::new(ClientCredentialsSource::new(
			config.credentials.clone(),
			transport.clone(),
		));

		Self::with_parts(config, transport, source)
	}

	/// Builds a relay from a custom credential source.
	pub fn with_parts(
		config: RelayConfig,
		transport: Arc<dyn HttpTransport>,
		source: Arc<dyn CredentialSource>,
	) -> Result<Self> {
		config.validate()?;

		let RelayConfig { dispatch, api, .. } = config;
		let tokens = Arc::new(TokenCache::new(source));
		let client = Arc::new(ApiClient::new(api, transport, tokens.clone()));
		let queue = Arc::new(DispatchQueue::new(dispatch.queue_capacity)?);
		let rate = Arc::new(RateLimit::new(dispatch.rate_per_second)?);
		let dispatcher = RateLimitedDispatcher::spawn(queue.clone(), client, rate);

		tracing::info!(
			rate = dispatch.rate_per_second,
			capacity = dispatch.queue_capacity,
			enqueue_timeout_ms = dispatch.enqueue_timeout_ms,
			"Relay started."
		);

		Ok(Self { enqueue_timeout: dispatch.enqueue_timeout(), queue, tokens, dispatcher })
	}

	/// Enqueues `item`, waiting up to the configured enqueue timeout for capacity.
	pub async fn submit(&self, item: QueuedRequest) -> Result<(), QueueError> {
		self.submit_with_timeout(item, self.enqueue_timeout).await
	}

	/// Enqueues `item`, waiting up to `timeout` for capacity.
	pub async fn submit_with_timeout(
		&self,
		item: QueuedRequest,
		timeout: std::time::Duration,
	) -> Result<(), QueueError> {
		let id = item.id.clone();

		match self.queue.submit(item, timeout).await {
			Ok(()) => {
				tracing::debug!(id, queue_size = self.queue.len(), "Queued message.");

				Ok(())
			},
			Err(err) => {
				tracing::error!(id, error = %err, "Failed to queue message.");

				Err(err)
			},
		}
	}

	/// Changes the dispatch rate; applies from the next pacing cycle.
	pub fn set_rate(&self, rate: i64) -> Result<(), InvalidRate> {
		self.dispatcher.set_rate(rate)
	}

	/// Queue, credential, and counter snapshot.
	pub fn status(&self) -> RelayStatus {
		RelayStatus {
			queue: self.dispatcher.status(),
			credential: self.tokens.status(),
			counts: self.dispatcher.counts(),
		}
	}

	/// Queue snapshot only.
	pub fn queue_status(&self) -> QueueStatus {
		self.dispatcher.status()
	}

	/// Credential cache shared with the dispatcher.
	pub fn tokens(&self) -> &Arc<TokenCache> {
		&self.tokens
	}

	/// Stops accepting items and winds the dispatcher down within `grace`.
	pub async fn shutdown(&self, grace: std::time::Duration) -> ShutdownReport {
		let report = self.dispatcher.shutdown(grace).await;

		tracing::info!(graceful = report.graceful, lost = report.lost, "Relay stopped.");

		report
	}
}
impl Debug for Relay {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Relay")
			.field("enqueue_timeout", &self.enqueue_timeout)
			.field("rate_per_second", &self.dispatcher.rate())
			.field("queue", &self.queue)
			.field("dispatcher", &self.dispatcher)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;
	use crate::{
		_preludet::{CountingSource, ScriptedTransport, test_relay_config},
		auth::CredentialState,
	};

	fn relay(rate: u32, capacity: usize) -> (Relay, Arc<ScriptedTransport>, Arc<CountingSource>) {
		let transport = Arc::new(ScriptedTransport::default());
		let source = Arc::new(CountingSource::new(3600));
		let relay = Relay::with_parts(
			test_relay_config("https://instance.example.com", rate, capacity),
			transport.clone(),
			source.clone(),
		)
		.expect("Relay should start.");

		(relay, transport, source)
	}

	#[tokio::test(start_paused = true)]
	async fn invalid_config_is_rejected() {
		let transport = Arc::new(ScriptedTransport::default());
		let source = Arc::new(CountingSource::new(3600));
		let err = Relay::with_parts(
			test_relay_config("https://instance.example.com", 0, 10),
			transport,
			source,
		)
		.expect_err("Rate zero should be rejected.");

		assert!(matches!(err, Error::Config(_)));
	}

	#[tokio::test(start_paused = true)]
	async fn status_combines_queue_credential_and_counts() {
		let (relay, transport, source) = relay(2, 10);

		assert!(!relay.status().credential.present);

		relay.submit(QueuedRequest::new("m-1", "Incident", "incident", "{}")).await.unwrap();
		tokio::time::sleep(StdDuration::from_millis(100)).await;

		let status = relay.status();

		assert_eq!(transport.calls().len(), 1);
		assert_eq!(source.fetches(), 1);
		assert_eq!(status.counts, DispatchCounts { processed: 1, failed: 0 });
		assert_eq!(status.queue.capacity, 10);
		assert_eq!(status.queue.rate_per_second, 2);
		assert!(status.queue.worker_alive);
		assert!(status.credential.present);
		assert_eq!(status.credential.state, Some(CredentialState::Valid));
	}

	#[tokio::test(start_paused = true)]
	async fn slow_calls_never_overlap() {
		let transport =
			Arc::new(ScriptedTransport::default().with_latency(StdDuration::from_millis(300)));
		let relay = Relay::with_parts(
			test_relay_config("https://instance.example.com", 10, 10),
			transport.clone(),
			Arc::new(CountingSource::new(3600)),
		)
		.expect("Relay should start.");

		for id in ["m-1", "m-2", "m-3"] {
			relay.submit(QueuedRequest::new(id, "Incident", "incident", "{}")).await.unwrap();
		}

		tokio::time::sleep(StdDuration::from_secs(2)).await;

		let calls = transport.calls();

		assert_eq!(calls.len(), 3);

		for pair in calls.windows(2) {
			// Previous call's latency plus the 100 ms pause at 10 req/s.
			assert!(pair[1].started_at - pair[0].started_at >= StdDuration::from_millis(400));
		}
	}

	#[tokio::test(start_paused = true)]
	async fn debug_shows_the_live_rate() {
		let (relay, _, _) = relay(2, 10);

		relay.set_rate(7).expect("Rate 7 should be accepted.");

		let rendered = format!("{relay:?}");

		assert!(rendered.contains("rate_per_second: 7"));
		assert!(!rendered.contains("rate_per_second: 2"));
	}

	#[tokio::test(start_paused = true)]
	async fn submit_after_shutdown_is_closed() {
		let (relay, _, _) = relay(2, 10);
		let report = relay.shutdown(StdDuration::from_secs(1)).await;

		assert!(report.graceful);
		assert_eq!(report.lost, 0);
		assert_eq!(
			relay.submit(QueuedRequest::new("late", "Incident", "incident", "{}")).await,
			Err(QueueError::Closed)
		);
		assert!(!relay.status().queue.worker_alive);
	}
}
