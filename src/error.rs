//! Relay-level error types shared across the queue, dispatcher, credential cache, and API client.

// self
use crate::_prelude::*;

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical relay error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Queue rejected an item.
	#[error(transparent)]
	Queue(#[from] QueueError),
	/// Rate update outside the accepted range.
	#[error(transparent)]
	InvalidRate(#[from] InvalidRate),
	/// Credential fetch failed.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Downstream API call failed after the retry policy ran.
	#[error(transparent)]
	Downstream(#[from] DownstreamError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Configuration and validation failures raised while assembling a relay.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is malformed.")]
	Parse {
		/// Structured parsing failure including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Queue capacity must be positive.
	#[error("Queue capacity must be greater than zero.")]
	ZeroCapacity,
	/// Configured rate is outside the accepted range.
	#[error(transparent)]
	Rate(#[from] InvalidRate),
	/// A required field is empty.
	#[error("Configuration field `{field}` must not be empty.")]
	EmptyField {
		/// Dotted path of the empty field.
		field: &'static str,
	},
	/// A URL cannot be used as an HTTP base.
	#[error("Configuration field `{field}` must be an http(s) URL.")]
	InvalidUrl {
		/// Dotted path of the rejected URL.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures reported by [`crate::dispatch::DispatchQueue::submit`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum QueueError {
	/// No capacity opened up before the enqueue timeout elapsed.
	#[error("Dispatch queue is full ({capacity} items); enqueue timed out after {waited_ms} ms.")]
	Full {
		/// Configured queue capacity.
		capacity: usize,
		/// Milliseconds the producer waited.
		waited_ms: u64,
	},
	/// The relay is shutting down and no longer accepts items.
	#[error("Dispatch queue is closed.")]
	Closed,
}

/// Rejected rate update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("Rate {requested} req/s is outside the accepted range {min}..={max}.")]
pub struct InvalidRate {
	/// Rate the caller asked for.
	pub requested: i64,
	/// Smallest accepted rate.
	pub min: u32,
	/// Largest accepted rate.
	pub max: u32,
}

/// Credential fetch failures; the cache stays empty after any of these.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Token endpoint could not be reached.
	#[error("Network error occurred while calling the token endpoint.")]
	Transport(#[from] TransportError),
	/// Token endpoint answered with a non-success status.
	#[error("Token endpoint rejected the request with HTTP {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Response body preview.
		body: String,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Token endpoint omitted the access token.
	#[error("Token endpoint response is missing access_token.")]
	MissingAccessToken,
}

/// Terminal failures of an authenticated API call.
#[derive(Debug, ThisError)]
pub enum DownstreamError {
	/// No credential could be obtained for the call or its retry.
	#[error("API call aborted because no credential was available.")]
	Credential(#[from] AuthError),
	/// Transport failed before a status was received.
	#[error("API call failed at the transport layer.")]
	Transport(#[from] TransportError),
	/// API still answered `401` after the credential was refreshed once.
	#[error("API rejected the refreshed credential.")]
	Unauthorized {
		/// Response body preview.
		body: String,
	},
	/// API answered with a non-success status other than the retried `401`.
	#[error("API call failed with HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body preview.
		body: String,
	},
	/// Destination could not be turned into a URL.
	#[error("Destination `{destination}` does not form a valid URL.")]
	InvalidDestination {
		/// Destination as supplied by the caller.
		destination: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl DownstreamError {
	/// Returns the HTTP status behind the failure, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Unauthorized { .. } => Some(401),
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Transport-level failures raised before any status was received.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Truncates a response body so it can be carried in errors and logs.
pub(crate) fn body_preview(body: &str) -> String {
	const LIMIT: usize = 256;

	match body.char_indices().nth(LIMIT) {
		Some((idx, _)) => format!("{}...", &body[..idx]),
		None => body.to_owned(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn body_preview_truncates_on_char_boundary() {
		let long = "é".repeat(300);
		let preview = body_preview(&long);

		assert!(preview.ends_with("..."));
		assert_eq!(preview.chars().count(), 259);
		assert_eq!(body_preview("short"), "short");
	}

	#[test]
	fn network_errors_keep_their_source() {
		let err = DownstreamError::from(AuthError::from(TransportError::network(
			std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
		)));
		let auth = std::error::Error::source(&err).expect("Auth error should be the source.");
		let transport =
			std::error::Error::source(auth).expect("Transport error should be the source.");

		assert!(matches!(err, DownstreamError::Credential(AuthError::Transport(_))));
		assert!(std::error::Error::source(transport).is_some());
		assert_eq!(err.status(), None);
	}

	#[test]
	fn downstream_status_reports_http_codes() {
		assert_eq!(DownstreamError::Unauthorized { body: String::new() }.status(), Some(401));
		assert_eq!(DownstreamError::Status { status: 503, body: String::new() }.status(), Some(503));
		assert_eq!(DownstreamError::Credential(AuthError::MissingAccessToken).status(), None);
	}
}
