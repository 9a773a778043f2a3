//! Authenticated API client with a one-shot retry on `401`.
//!
//! Every call carries the cache's current bearer token. When the API answers `401` the client
//! invalidates the cache and retries exactly once with a freshly fetched token; a second `401`
//! or any other non-success status is terminal, so a revoked or misconfigured credential costs at
//! most two calls per item.

// self
use crate::{
	_prelude::*,
	auth::TokenCache,
	config::ApiConfig,
	error::{DownstreamError, body_preview},
	http::{ApiRequest, ApiResponse, HttpTransport, Method},
};

/// Which attempt of a call is being made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Attempt {
	Initial,
	AfterRefresh,
}

/// Sends authenticated calls to the downstream API.
#[derive(Clone)]
pub struct ApiClient {
	config: ApiConfig,
	transport: Arc<dyn HttpTransport>,
	tokens: Arc<TokenCache>,
}
impl ApiClient {
	/// Creates a client that resolves destinations against `config`.
	pub fn new(
		config: ApiConfig,
		transport: Arc<dyn HttpTransport>,
		tokens: Arc<TokenCache>,
	) -> Self {
		Self { config, transport, tokens }
	}

	/// Token cache consulted by this client.
	pub fn tokens(&self) -> &Arc<TokenCache> {
		&self.tokens
	}

	/// Performs `method` against `destination`, retrying once after a `401`.
	pub async fn call(
		&self,
		method: Method,
		destination: &str,
		body: Option<String>,
	) -> Result<ApiResponse, DownstreamError> {
		let url = self.url_for(destination)?;

		self.send_with_retry(method, url, body).await
	}

	/// Performs a `GET` against `destination` with `params` appended as query pairs.
	pub async fn query<'a>(
		&self,
		destination: &str,
		params: impl IntoIterator<Item = (&'a str, &'a str)>,
	) -> Result<ApiResponse, DownstreamError> {
		let mut url = self.url_for(destination)?;

		url.query_pairs_mut().extend_pairs(params);

		self.send_with_retry(Method::Get, url, None).await
	}

	/// Resolves `destination` to `base_url + api_path + "/" + destination`.
	pub fn url_for(&self, destination: &str) -> Result<Url, DownstreamError> {
		let base = self.config.base_url.as_str().trim_end_matches('/');
		let path = self.config.api_path.trim_matches('/');
		let destination_path = destination.trim_start_matches('/');
		let raw = if path.is_empty() {
			format!("{base}/{destination_path}")
		} else {
			format!("{base}/{path}/{destination_path}")
		};

		Url::parse(&raw).map_err(|source| DownstreamError::InvalidDestination {
			destination: destination.to_owned(),
			source,
		})
	}

	async fn send_with_retry(
		&self,
		method: Method,
		url: Url,
		body: Option<String>,
	) -> Result<ApiResponse, DownstreamError> {
		let first = self.send_once(method, &url, body.clone(), Attempt::Initial).await?;

		if !first.is_unauthorized() {
			return check_status(first);
		}

		tracing::warn!(
			%method,
			url = %url,
			"Received 401 Unauthorized; invalidating token and retrying."
		);
		self.tokens.invalidate();

		let retried = self.send_once(method, &url, body, Attempt::AfterRefresh).await?;

		if retried.is_unauthorized() {
			tracing::error!(%method, url = %url, "Retry after token refresh was also unauthorized.");

			return Err(DownstreamError::Unauthorized { body: body_preview(&retried.body) });
		}

		let response = check_status(retried)?;

		tracing::info!(%method, url = %url, "Retry successful after token refresh.");

		Ok(response)
	}

	async fn send_once(
		&self,
		method: Method,
		url: &Url,
		body: Option<String>,
		attempt: Attempt,
	) -> Result<ApiResponse, DownstreamError> {
		let token = self.tokens.get().await?;
		let mut request = ApiRequest::new(method, url.clone())
			.with_header("Content-Type", "application/json")
			.with_header("Accept", "application/json")
			.with_header("Authorization", format!("Bearer {}", token.expose()))
			.with_header("User-Agent", self.config.user_agent.as_str());

		request.body = body;

		tracing::debug!(%method, url = %url, ?attempt, "Calling API.");

		self.transport.execute(request).await.map_err(DownstreamError::from)
	}
}
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient").field("config", &self.config).finish()
	}
}

fn check_status(response: ApiResponse) -> Result<ApiResponse, DownstreamError> {
	if response.is_success() {
		return Ok(response);
	}

	tracing::error!(
		status = response.status,
		body = %body_preview(&response.body),
		"API call failed."
	);

	Err(DownstreamError::Status { status: response.status, body: body_preview(&response.body) })
}
