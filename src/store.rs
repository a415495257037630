//! Storage contract and built-in stores for the session token pair.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key/value holder for the access and refresh token slots.
///
/// The pipeline reads the store on every dispatch and never caches the pair for the
/// lifetime of a request, because a refresh may rotate it between dispatch and replay.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the current pair, if a session exists.
	fn get(&self) -> StoreFuture<'_, Option<TokenPair>>;

	/// Persists or replaces the pair.
	fn set(&self, pair: TokenPair) -> StoreFuture<'_, ()>;

	/// Removes both slots.
	fn clear(&self) -> StoreFuture<'_, ()>;
}
impl dyn TokenStore {
	/// Returns the refresh token, skipping empty values.
	pub async fn refresh_token(&self) -> Result<Option<TokenSecret>, StoreError> {
		let pair = self.get().await?;

		Ok(pair.and_then(|pair| pair.refresh_token).filter(|secret| !secret.is_empty()))
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_session_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let session_error: Error = store_error.clone().into();

		assert!(matches!(session_error, Error::Storage(_)));
		assert!(session_error.to_string().contains("disk unavailable"));

		let source = StdError::source(&session_error)
			.expect("Session error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[tokio::test]
	async fn refresh_token_helper_skips_empty_values() {
		let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());

		assert_eq!(store.refresh_token().await.expect("Empty store should read."), None);

		store.set(TokenPair::new("access", "")).await.expect("Saving the pair should succeed.");

		assert_eq!(store.refresh_token().await.expect("Store should read."), None);

		store
			.set(TokenPair::new("access", "refresh"))
			.await
			.expect("Saving the pair should succeed.");

		assert_eq!(
			store.refresh_token().await.expect("Store should read.").as_ref().map(|s| s.expose()),
			Some("refresh")
		);
	}
}
