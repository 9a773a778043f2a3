//! Typed relay configuration with defaults and validation.
//!
//! Every section deserializes with `#[serde(default)]` where a sensible default exists, so a
//! minimal document only needs the credential endpoint, client id/secret, and API base URL:
//!
//! ```json
//! {
//!   "credentials": {
//!     "token_url": "https://instance.service-now.com/oauth_token.do",
//!     "client_id": "relay",
//!     "client_secret": "secret"
//!   },
//!   "api": { "base_url": "https://instance.service-now.com" }
//! }
//! ```

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	dispatch::RateLimit,
	error::{ConfigError, InvalidRate},
};

/// Complete relay configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
	/// Queue and pacing settings.
	#[serde(default)]
	pub dispatch: DispatchConfig,
	/// Credential endpoint settings.
	pub credentials: CredentialConfig,
	/// Downstream API settings.
	pub api: ApiConfig,
	/// Periodic status logging settings.
	#[serde(default)]
	pub reporter: ReporterConfig,
}
impl RelayConfig {
	/// Parses a JSON document, reporting the path of the first offending field.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(deserializer)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Checks every section for values the relay cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.dispatch.validate()?;
		self.credentials.validate()?;
		self.api.validate()
	}
}

/// Queue capacity, enqueue timeout, and the initial pacing rate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
	/// Outbound calls per second, `1..=100`.
	pub rate_per_second: u32,
	/// Maximum number of queued items.
	pub queue_capacity: usize,
	/// How long `submit` waits for capacity before reporting a full queue.
	pub enqueue_timeout_ms: u64,
}
impl DispatchConfig {
	/// Default pacing rate in requests per second.
	pub const DEFAULT_RATE: u32 = 2;
	/// Default queue capacity.
	pub const DEFAULT_CAPACITY: usize = 1_000;
	/// Default enqueue timeout in milliseconds.
	pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 30_000;

	/// Enqueue timeout as a std duration.
	pub fn enqueue_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_millis(self.enqueue_timeout_ms)
	}

	/// Validates capacity and rate bounds.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.queue_capacity == 0 {
			return Err(ConfigError::ZeroCapacity);
		}
		if !RateLimit::accepts(i64::from(self.rate_per_second)) {
			return Err(InvalidRate {
				requested: i64::from(self.rate_per_second),
				min: RateLimit::MIN,
				max: RateLimit::MAX,
			}
			.into());
		}

		Ok(())
	}
}
impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			rate_per_second: Self::DEFAULT_RATE,
			queue_capacity: Self::DEFAULT_CAPACITY,
			enqueue_timeout_ms: Self::DEFAULT_ENQUEUE_TIMEOUT_MS,
		}
	}
}

/// OAuth client-credentials settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialConfig {
	/// Token endpoint URL.
	pub token_url: Url,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Optional scope requested with every grant.
	#[serde(default)]
	pub scope: Option<String>,
	/// Grant type sent as `grant_type`.
	#[serde(default = "default_grant_type")]
	pub grant_type: String,
}
impl CredentialConfig {
	/// Creates a client-credentials configuration without a scope.
	pub fn new(
		token_url: Url,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		Self {
			token_url,
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			scope: None,
			grant_type: default_grant_type(),
		}
	}

	/// Sets the requested scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	fn validate(&self) -> Result<(), ConfigError> {
		ensure_http("credentials.token_url", &self.token_url)?;

		if self.client_id.is_empty() {
			return Err(ConfigError::EmptyField { field: "credentials.client_id" });
		}
		if self.client_secret.is_empty() {
			return Err(ConfigError::EmptyField { field: "credentials.client_secret" });
		}
		if self.grant_type.is_empty() {
			return Err(ConfigError::EmptyField { field: "credentials.grant_type" });
		}

		Ok(())
	}
}

/// Downstream API location and request decoration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
	/// Scheme and authority of the API, e.g. `https://instance.service-now.com`.
	pub base_url: Url,
	/// Path prefix inserted between the base URL and each destination.
	#[serde(default = "default_api_path")]
	pub api_path: String,
	/// `User-Agent` header sent with every call.
	#[serde(default = "default_user_agent")]
	pub user_agent: String,
}
impl ApiConfig {
	/// Default path prefix (ServiceNow table API).
	pub const DEFAULT_API_PATH: &str = "/api/now/table";

	/// Creates a configuration with the default path prefix and user agent.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			api_path: default_api_path(),
			user_agent: default_user_agent(),
		}
	}

	/// Overrides the path prefix.
	pub fn with_api_path(mut self, api_path: impl Into<String>) -> Self {
		self.api_path = api_path.into();

		self
	}

	fn validate(&self) -> Result<(), ConfigError> {
		ensure_http("api.base_url", &self.base_url)?;

		if self.user_agent.is_empty() {
			return Err(ConfigError::EmptyField { field: "api.user_agent" });
		}

		Ok(())
	}
}

/// Intervals and thresholds for the periodic status reporter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
	/// Seconds between queue snapshots.
	pub queue_interval_secs: u64,
	/// Seconds between credential snapshots.
	pub credential_interval_secs: u64,
	/// Seconds between processing statistics.
	pub stats_interval_secs: u64,
	/// Utilization percentage above which the queue snapshot is logged as a warning.
	pub utilization_warn_percent: f64,
	/// Remaining credential lifetime below which a warning is logged.
	pub expiry_warn_secs: i64,
}
impl ReporterConfig {
	/// Queue snapshot interval.
	pub fn queue_interval(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.queue_interval_secs.max(1))
	}

	/// Credential snapshot interval.
	pub fn credential_interval(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.credential_interval_secs.max(1))
	}

	/// Processing statistics interval.
	pub fn stats_interval(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.stats_interval_secs.max(1))
	}

	/// Expiry warning window.
	pub fn expiry_warn_window(&self) -> Duration {
		Duration::seconds(self.expiry_warn_secs)
	}
}
impl Default for ReporterConfig {
	fn default() -> Self {
		Self {
			queue_interval_secs: 60,
			credential_interval_secs: 300,
			stats_interval_secs: 900,
			utilization_warn_percent: 80.0,
			expiry_warn_secs: 600,
		}
	}
}

fn default_grant_type() -> String {
	"client_credentials".into()
}

fn default_api_path() -> String {
	ApiConfig::DEFAULT_API_PATH.into()
}

fn default_user_agent() -> String {
	concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into()
}

fn ensure_http(field: &'static str, url: &Url) -> Result<(), ConfigError> {
	if matches!(url.scheme(), "http" | "https") && url.has_host() {
		Ok(())
	} else {
		Err(ConfigError::InvalidUrl { field })
	}
}
