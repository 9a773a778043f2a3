//! Single-flight credential cache.
//!
//! [`TokenCache::get`] serves the cached credential under a shared read lock while it is valid
//! (see [`CachedCredential::SAFETY_MARGIN`]). Once it is missing or inside the margin, callers
//! queue on one async guard; the first caller through re-checks the slot and performs exactly
//! one fetch, and everyone queued behind it observes the fresh credential instead of fetching
//! again. A failed fetch leaves the slot empty so the next caller retries cleanly.

// self
use crate::{
	_prelude::*,
	auth::{CachedCredential, CredentialSource, CredentialStatus, TokenSecret},
	error::AuthError,
	obs::{self, CredentialOutcome, RelaySpan},
};

/// Owns the single cached credential for the relay.
pub struct TokenCache {
	source: Arc<dyn CredentialSource>,
	slot: RwLock<Option<Arc<CachedCredential>>>,
	refresh_guard: AsyncMutex<()>,
}
impl TokenCache {
	/// Creates an empty cache backed by `source`.
	pub fn new(source: Arc<dyn CredentialSource>) -> Self {
		Self { source, slot: RwLock::new(None), refresh_guard: AsyncMutex::new(()) }
	}

	/// Returns a valid bearer token, fetching one when the cache is empty or expiring.
	pub async fn get(&self) -> Result<TokenSecret, AuthError> {
		if let Some(token) = self.cached_token(OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		let _singleflight = self.refresh_guard.lock().await;

		// Another caller may have refreshed while this one waited on the guard.
		if let Some(token) = self.cached_token(OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		self.fetch_locked().await
	}

	/// Clears the cached credential so the next [`get`](Self::get) fetches a new one.
	///
	/// Used after the API reports `401`, since a credential that is unexpired by the clock may
	/// still have been revoked server-side.
	pub fn invalidate(&self) {
		if self.slot.write().take().is_some() {
			tracing::debug!("Invalidated cached OAuth token.");
		}
	}

	/// Discards the cached credential and force-fetches a new one.
	pub async fn refresh(&self) -> Result<TokenSecret, AuthError> {
		let _singleflight = self.refresh_guard.lock().await;

		self.invalidate();
		self.fetch_locked().await
	}

	/// Returns the cached credential, if any, regardless of validity.
	pub fn current(&self) -> Option<Arc<CachedCredential>> {
		self.slot.read().clone()
	}

	/// Returns a monitoring snapshot taken at the current instant.
	pub fn status(&self) -> CredentialStatus {
		let now = OffsetDateTime::now_utc();

		match self.current() {
			Some(credential) => CredentialStatus::of(&credential, now),
			None => CredentialStatus::absent(),
		}
	}

	/// Returns `true` when no credential is cached or it expires within `window`.
	pub fn will_expire_soon(&self, window: Duration) -> bool {
		self.status().will_expire_within(window)
	}

	fn cached_token(&self, now: OffsetDateTime) -> Option<TokenSecret> {
		self.slot
			.read()
			.as_ref()
			.filter(|credential| credential.is_valid_at(now))
			.map(|credential| credential.token.clone())
	}

	// Caller must hold `refresh_guard`.
	async fn fetch_locked(&self) -> Result<TokenSecret, AuthError> {
		let span = RelaySpan::credential("fetch");

		match span.instrument(self.source.fetch()).await {
			Ok(grant) => {
				let credential =
					Arc::new(CachedCredential::from_grant(grant, OffsetDateTime::now_utc()));
				let token = credential.token.clone();

				*self.slot.write() = Some(credential);
				obs::record_credential_fetch(CredentialOutcome::Success);

				Ok(token)
			},
			Err(err) => {
				*self.slot.write() = None;
				obs::record_credential_fetch(CredentialOutcome::Failure);
				tracing::error!(error = %err, "OAuth token fetch failed.");

				Err(err)
			},
		}
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache").field("credential", &self.current()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::CountingSource;

	#[tokio::test]
	async fn caches_until_invalidated() {
		let source = Arc::new(CountingSource::new(3600));
		let cache = TokenCache::new(source.clone());

		assert_eq!(cache.get().await.expect("First get should fetch.").expose(), "token-1");
		assert_eq!(cache.get().await.expect("Second get should hit cache.").expose(), "token-1");
		assert_eq!(source.fetches(), 1);

		cache.invalidate();

		assert!(cache.current().is_none());
		assert_eq!(cache.get().await.expect("Get after invalidate should fetch.").expose(), "token-2");
		assert_eq!(source.fetches(), 2);
	}

	#[tokio::test]
	async fn refresh_forces_fetch_even_when_valid() {
		let source = Arc::new(CountingSource::new(3600));
		let cache = TokenCache::new(source.clone());

		cache.get().await.expect("Initial get should succeed.");

		assert_eq!(cache.refresh().await.expect("Refresh should succeed.").expose(), "token-2");
		assert_eq!(cache.get().await.expect("Get should reuse refreshed token.").expose(), "token-2");
		assert_eq!(source.fetches(), 2);
	}

	#[tokio::test]
	async fn credentials_inside_safety_margin_are_refetched() {
		let source = Arc::new(CountingSource::new(45));
		let cache = TokenCache::new(source.clone());

		cache.get().await.expect("First get should succeed.");
		cache.get().await.expect("Second get should succeed.");

		assert_eq!(source.fetches(), 2);
	}

	#[tokio::test]
	async fn failed_fetch_leaves_cache_empty() {
		let source = Arc::new(CountingSource::failing());
		let cache = TokenCache::new(source.clone());

		assert!(matches!(cache.get().await, Err(AuthError::Rejected { status: 401, .. })));
		assert!(cache.current().is_none());
		assert!(!cache.status().present);
		assert!(cache.get().await.is_err());
		assert_eq!(source.fetches(), 2);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_gets_share_one_fetch() {
		let source = Arc::new(CountingSource::new(3600));
		let cache = Arc::new(TokenCache::new(source.clone()));
		let handles = (0..16)
			.map(|_| {
				let cache = cache.clone();

				tokio::spawn(async move { cache.get().await })
			})
			.collect::<Vec<_>>();

		for handle in handles {
			let token = handle
				.await
				.expect("Task should not panic.")
				.expect("Concurrent get should succeed.");

			assert_eq!(token.expose(), "token-1");
		}

		assert_eq!(source.fetches(), 1);
	}
}
