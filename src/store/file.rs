//! File-backed [`TokenStore`] that persists both slots as a flat JSON object.
//!
//! The document uses the configured [`StorageKeys`] as field names, so a console that
//! stores `admin_token`/`admin_refresh_token` and one that stores `token`/`refreshToken`
//! share the same implementation.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	config::StorageKeys,
	store::{StoreError, StoreFuture, TokenStore},
};

/// Persists the session pair to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	keys: StorageKeys,
	inner: Arc<RwLock<Option<TokenPair>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>, keys: StorageKeys) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path, &keys)?;

		Ok(Self { path, keys, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Path of the backing document.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path, keys: &StorageKeys) -> Result<Option<TokenPair>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(None);
		}

		let slots: BTreeMap<String, String> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;
		let Some(access) = slots.get(&keys.access).filter(|value| !value.is_empty()) else {
			return Ok(None);
		};

		Ok(Some(TokenPair {
			access_token: TokenSecret::new(access.as_str()),
			refresh_token: slots.get(&keys.refresh).map(|value| TokenSecret::new(value.as_str())),
		}))
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: Option<&TokenPair>) -> Result<(), StoreError> {
		let Some(pair) = contents else {
			return match fs::remove_file(&self.path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
			};
		};

		Self::ensure_parent_exists(&self.path)?;

		let mut slots = BTreeMap::new();

		slots.insert(self.keys.access.as_str(), pair.access_token.expose());

		if let Some(refresh) = pair.refresh_token.as_ref() {
			slots.insert(self.keys.refresh.as_str(), refresh.expose());
		}

		let serialized =
			serde_json::to_vec_pretty(&slots).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn get(&self) -> StoreFuture<'_, Option<TokenPair>> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn set(&self, pair: TokenPair) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			self.persist_locked(Some(&pair))?;
			*guard = Some(pair);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.take();
			self.persist_locked(None)
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"session_gate_file_store_{label}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn save_and_reload_round_trip() {
		let path = temp_path("reload");
		let store =
			FileStore::open(&path, StorageKeys::admin()).expect("Failed to open file store.");

		store
			.set(TokenPair::new("access-token", "refresh-token"))
			.await
			.expect("Failed to save pair to file store.");
		drop(store);

		let raw = fs::read_to_string(&path).expect("Store document should exist after save.");

		assert!(raw.contains("\"admin_token\""));
		assert!(raw.contains("\"admin_refresh_token\""));

		let reopened =
			FileStore::open(&path, StorageKeys::admin()).expect("Failed to reopen file store.");
		let fetched = reopened
			.get()
			.await
			.expect("Failed to read pair from file store.")
			.expect("File store lost the pair after reopen.");

		assert_eq!(fetched, TokenPair::new("access-token", "refresh-token"));

		reopened.clear().await.expect("Clearing the file store should succeed.");

		assert!(!path.exists(), "Clearing should remove the backing document.");
	}

	#[tokio::test]
	async fn foreign_key_names_load_as_empty_session() {
		let path = temp_path("foreign");

		fs::write(&path, "{\"token\":\"a\",\"refreshToken\":\"r\"}")
			.expect("Failed to seed store document.");

		let admin =
			FileStore::open(&path, StorageKeys::admin()).expect("Failed to open file store.");

		assert_eq!(admin.get().await.expect("Read should succeed."), None);

		let canonical =
			FileStore::open(&path, StorageKeys::default()).expect("Failed to open file store.");

		assert_eq!(
			canonical.get().await.expect("Read should succeed."),
			Some(TokenPair::new("a", "r"))
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary store document {}: {e}", path.display())
		});
	}

	#[test]
	fn corrupt_document_surfaces_serialization_error() {
		let path = temp_path("corrupt");

		fs::write(&path, "not json").expect("Failed to seed corrupt document.");

		let err = FileStore::open(&path, StorageKeys::default())
			.expect_err("Corrupt documents should fail to load.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary store document {}: {e}", path.display())
		});
	}
}
