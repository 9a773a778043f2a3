//! Immutable cached credential and its validity rules.

// self
use crate::{
	_prelude::*,
	auth::{TokenGrant, TokenSecret},
};

/// Lifecycle state of a credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialState {
	/// Usable; more than the safety margin remains before expiry.
	Valid,
	/// Still accepted by the server but inside the safety margin, so the cache refetches.
	Expiring,
	/// Past its literal expiry.
	Expired,
}

/// Credential held by [`crate::auth::TokenCache`].
///
/// Replaced wholesale on every refresh and never mutated in place.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedCredential {
	/// Bearer token; callers must avoid logging it.
	pub token: TokenSecret,
	/// Token type reported by the provider (usually `Bearer`).
	pub token_type: String,
	/// `expires_in` as issued by the provider.
	pub issued_lifetime_seconds: i64,
	/// Instant the credential was fetched.
	pub issued_at: OffsetDateTime,
	/// Literal expiry instant (`issued_at + issued_lifetime_seconds`).
	pub expires_at: OffsetDateTime,
	/// Scope granted by the provider, if reported.
	pub scope: Option<String>,
}
impl CachedCredential {
	/// Margin subtracted from the literal expiry when deciding validity.
	pub const SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Stamps a provider grant with the instant it was received.
	pub fn from_grant(grant: TokenGrant, issued_at: OffsetDateTime) -> Self {
		let lifetime = grant.expires_in.max(0);

		Self {
			token: TokenSecret::new(grant.access_token),
			token_type: grant.token_type,
			issued_lifetime_seconds: lifetime,
			issued_at,
			expires_at: issued_at + Duration::seconds(lifetime),
			scope: grant.scope,
		}
	}

	/// Computes the lifecycle state at `instant`.
	pub fn state_at(&self, instant: OffsetDateTime) -> CredentialState {
		if instant >= self.expires_at {
			CredentialState::Expired
		} else if instant >= self.expires_at - Self::SAFETY_MARGIN {
			CredentialState::Expiring
		} else {
			CredentialState::Valid
		}
	}

	/// Returns `true` when the credential may be served from cache at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		!self.token.is_empty() && matches!(self.state_at(instant), CredentialState::Valid)
	}

	/// Returns `true` when the credential is past its literal expiry at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.state_at(instant), CredentialState::Expired)
	}

	/// Remaining time until literal expiry, floored at zero.
	pub fn time_to_expiry_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for CachedCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedCredential")
			.field("token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("issued_lifetime_seconds", &self.issued_lifetime_seconds)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Read-only snapshot of the cache for monitoring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
	/// Whether a credential is cached at all.
	pub present: bool,
	/// Token type of the cached credential.
	pub token_type: Option<String>,
	/// Literal expiry of the cached credential.
	pub expires_at: Option<OffsetDateTime>,
	/// Remaining lifetime; zero when absent.
	pub time_to_expiry: Duration,
	/// State at the time the snapshot was taken.
	pub state: Option<CredentialState>,
}
impl CredentialStatus {
	/// Snapshot describing an empty cache.
	pub fn absent() -> Self {
		Self {
			present: false,
			token_type: None,
			expires_at: None,
			time_to_expiry: Duration::ZERO,
			state: None,
		}
	}

	/// Builds a snapshot for `credential` at `instant`.
	pub fn of(credential: &CachedCredential, instant: OffsetDateTime) -> Self {
		Self {
			present: true,
			token_type: Some(credential.token_type.clone()),
			expires_at: Some(credential.expires_at),
			time_to_expiry: credential.time_to_expiry_at(instant),
			state: Some(credential.state_at(instant)),
		}
	}

	/// Returns `true` when the credential is absent or expires within `window`.
	pub fn will_expire_within(&self, window: Duration) -> bool {
		!self.present || self.time_to_expiry < window
	}
}
