//! Paced relay for rate-constrained HTTP APIs: a bounded FIFO queue drained by one pacing worker,
//! fronted by a single-flight OAuth credential cache that retries exactly once on `401`.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod relay;
pub mod report;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{collections::VecDeque, sync::atomic::AtomicUsize};
	// self
	use crate::{
		auth::{CredentialFuture, CredentialSource, TokenGrant},
		config::{ApiConfig, CredentialConfig, DispatchConfig, RelayConfig},
		error::{AuthError, TransportError},
		http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	};

	/// One observed outbound call recorded by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct RecordedCall {
		/// Request as handed to the transport.
		pub request: ApiRequest,
		/// Tokio clock reading when the call started.
		pub started_at: tokio::time::Instant,
	}

	/// In-memory transport that replays scripted statuses and records every request.
	///
	/// When the script runs dry the transport answers `200` with an empty JSON object.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		script: Mutex<VecDeque<u16>>,
		calls: Mutex<Vec<RecordedCall>>,
		latency: Option<std::time::Duration>,
	}
	impl ScriptedTransport {
		/// Creates a transport that replays `statuses` in order.
		pub fn with_statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
			Self { script: Mutex::new(statuses.into_iter().collect()), ..Default::default() }
		}

		/// Adds a simulated per-call latency.
		pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
			self.latency = Some(latency);

			self
		}

		/// Returns every call observed so far.
		pub fn calls(&self) -> Vec<RecordedCall> {
			self.calls.lock().clone()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				self.calls
					.lock()
					.push(RecordedCall { request, started_at: tokio::time::Instant::now() });

				if let Some(latency) = self.latency {
					tokio::time::sleep(latency).await;
				}

				let status = self.script.lock().pop_front().unwrap_or(200);

				Ok::<_, TransportError>(ApiResponse { status, body: "{}".into() })
			})
		}
	}

	/// Credential source that mints `token-1`, `token-2`, ... and counts fetches.
	#[derive(Debug)]
	pub struct CountingSource {
		fetches: AtomicUsize,
		expires_in: i64,
		fail: bool,
	}
	impl CountingSource {
		/// Creates a source whose grants live for `expires_in` seconds.
		pub fn new(expires_in: i64) -> Self {
			Self { fetches: AtomicUsize::new(0), expires_in, fail: false }
		}

		/// Creates a source that always fails with [`AuthError::Rejected`].
		pub fn failing() -> Self {
			Self { fetches: AtomicUsize::new(0), expires_in: 0, fail: true }
		}

		/// Returns the number of fetches performed so far.
		pub fn fetches(&self) -> usize {
			self.fetches.load(std::sync::atomic::Ordering::SeqCst)
		}
	}
	impl CredentialSource for CountingSource {
		fn fetch(&self) -> CredentialFuture<'_> {
			Box::pin(async move {
				let n = self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;

				if self.fail {
					return Err(AuthError::Rejected { status: 401, body: "invalid_client".into() });
				}

				Ok(TokenGrant {
					access_token: format!("token-{n}"),
					token_type: "Bearer".into(),
					expires_in: self.expires_in,
					scope: None,
				})
			})
		}
	}

	/// Builds a reqwest transport that accepts the self-signed certificates produced by `httpmock`.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_transport() -> crate::http::ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestTransport::with_client(client)
	}

	/// Builds a relay configuration pointing at `base` with the given dispatch settings.
	pub fn test_relay_config(base: &str, rate: u32, capacity: usize) -> RelayConfig {
		let base_url = Url::parse(base).expect("Test base URL should parse.");
		let token_url = base_url.join("/oauth_token.do").expect("Test token URL should join.");

		RelayConfig {
			dispatch: DispatchConfig {
				rate_per_second: rate,
				queue_capacity: capacity,
				enqueue_timeout_ms: 5_000,
			},
			credentials: CredentialConfig::new(token_url, "relay-client", "relay-secret"),
			api: ApiConfig::new(base_url),
			reporter: Default::default(),
		}
	}
}

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
