//! Thread-safe in-memory [`TokenStore`] implementation for tests and single-process consoles.

// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	store::{StoreFuture, TokenStore},
};

type Slot = Arc<RwLock<Option<TokenPair>>>;

/// Storage backend that keeps the pair in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Creates a store already holding `pair`.
	pub fn with_pair(pair: TokenPair) -> Self {
		Self(Arc::new(RwLock::new(Some(pair))))
	}

	/// Returns the current pair without going through the async contract.
	pub fn snapshot(&self) -> Option<TokenPair> {
		self.0.read().clone()
	}
}
impl TokenStore for MemoryStore {
	fn get(&self) -> StoreFuture<'_, Option<TokenPair>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn set(&self, pair: TokenPair) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(pair);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.write().take();

			Ok(())
		})
	}
}
