//! Credential sources consulted by the token cache on its slow path.
//!
//! [`CredentialSource`] is the cache's only dependency on an authorization server. The default
//! [`ClientCredentialsSource`] performs an OAuth 2.0 token request with the client id and secret
//! posted in the form body (`client_secret_post`), which is what table-style REST APIs such as
//! ServiceNow expect.

// crates.io
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	config::CredentialConfig,
	error::{AuthError, body_preview},
	http::{ApiRequest, HttpTransport, Method},
};

/// Boxed future returned by [`CredentialSource::fetch`].
pub type CredentialFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenGrant, AuthError>> + 'a + Send>>;

/// Strategy that mints a fresh credential on demand.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Performs one network fetch for a fresh credential.
	fn fetch(&self) -> CredentialFuture<'_>;
}

/// Credential as issued by the authorization server, before the cache stamps it.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
	/// Access token value.
	pub access_token: String,
	/// Token type (usually `Bearer`).
	pub token_type: String,
	/// Lifetime in seconds relative to receipt.
	pub expires_in: i64,
	/// Scope granted, if reported.
	pub scope: Option<String>,
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: Option<String>,
	token_type: Option<String>,
	#[serde(default)]
	expires_in: i64,
	scope: Option<String>,
}

/// Client-credentials grant against a token endpoint reached through an [`HttpTransport`].
#[derive(Clone)]
pub struct ClientCredentialsSource {
	config: CredentialConfig,
	transport: Arc<dyn HttpTransport>,
}
impl ClientCredentialsSource {
	/// Creates a source that posts to `config.token_url` through `transport`.
	pub fn new(config: CredentialConfig, transport: Arc<dyn HttpTransport>) -> Self {
		Self { config, transport }
	}

	fn token_request(&self) -> ApiRequest {
		let mut form = Serializer::new(String::new());

		form.append_pair("grant_type", &self.config.grant_type);
		form.append_pair("client_id", &self.config.client_id);
		form.append_pair("client_secret", self.config.client_secret.expose());

		if let Some(scope) = self.config.scope.as_deref().filter(|scope| !scope.is_empty()) {
			form.append_pair("scope", scope);
		}

		ApiRequest::new(Method::Post, self.config.token_url.clone())
			.with_header("Content-Type", "application/x-www-form-urlencoded")
			.with_header("Accept", "application/json")
			.with_body(form.finish())
	}
}
impl CredentialSource for ClientCredentialsSource {
	fn fetch(&self) -> CredentialFuture<'_> {
		Box::pin(async move {
			tracing::info!(token_url = %self.config.token_url, "Fetching new OAuth token.");

			let response = self.transport.execute(self.token_request()).await?;

			if !response.is_success() {
				tracing::error!(
					status = response.status,
					body = %body_preview(&response.body),
					"Token endpoint rejected the request."
				);

				return Err(AuthError::Rejected {
					status: response.status,
					body: body_preview(&response.body),
				});
			}

			let deserializer = &mut serde_json::Deserializer::from_str(&response.body);
			let parsed: TokenResponse = serde_path_to_error::deserialize(deserializer)
				.map_err(|source| AuthError::Parse { source })?;
			let access_token = parsed
				.access_token
				.filter(|token| !token.is_empty())
				.ok_or(AuthError::MissingAccessToken)?;

			tracing::info!(expires_in = parsed.expires_in, "Fetched OAuth token.");

			Ok(TokenGrant {
				access_token,
				token_type: parsed.token_type.unwrap_or_else(|| "Bearer".into()),
				expires_in: parsed.expires_in,
				scope: parsed.scope,
			})
		})
	}
}
impl Debug for ClientCredentialsSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsSource").field("config", &self.config).finish()
	}
}
