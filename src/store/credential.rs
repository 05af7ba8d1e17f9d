//! Credential store: the access/refresh pair persisted through a [`KeyValueStorage`].

// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, CredentialPair, TokenSecret},
	obs,
	store::{CompareAndSwapOutcome, KeyValueStorage, StoreError},
};

/// Storage keys used for the two credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageKeys {
	/// Key holding the access credential.
	pub access: String,
	/// Key holding the refresh credential.
	pub refresh: String,
}
impl StorageKeys {
	/// Returns the key for the requested credential kind.
	pub fn get(&self, kind: CredentialKind) -> &str {
		match kind {
			CredentialKind::Access => &self.access,
			CredentialKind::Refresh => &self.refresh,
		}
	}
}
impl Default for StorageKeys {
	fn default() -> Self {
		Self { access: "token".into(), refresh: "refreshToken".into() }
	}
}

/// Durable home of the current credential pair.
///
/// Every operation runs under one async guard, so a reader never sees the refresh half of a
/// pair being written next to the access half it replaces. Read failures are logged and treated
/// as absent; write failures propagate as [`StoreError`].
pub struct CredentialStore {
	storage: Arc<dyn KeyValueStorage>,
	keys: StorageKeys,
	guard: AsyncMutex<()>,
}
impl CredentialStore {
	/// Creates a store over `storage` using the default keys (`token`, `refreshToken`).
	pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
		Self::with_keys(storage, StorageKeys::default())
	}

	/// Creates a store over `storage` using custom keys.
	pub fn with_keys(storage: Arc<dyn KeyValueStorage>, keys: StorageKeys) -> Self {
		Self { storage, keys, guard: AsyncMutex::new(()) }
	}

	/// Keys this store reads and writes.
	pub fn keys(&self) -> &StorageKeys {
		&self.keys
	}

	/// Reads one credential; absent, blank, and unreadable values all yield `None`.
	pub async fn get(&self, kind: CredentialKind) -> Option<TokenSecret> {
		let _guard = self.guard.lock().await;

		self.read_now(kind).await
	}

	/// Reads both credentials together, returning `None` unless both are present.
	pub async fn snapshot(&self) -> Option<CredentialPair> {
		let _guard = self.guard.lock().await;
		let access = self.read_now(CredentialKind::Access).await?;
		let refresh = self.read_now(CredentialKind::Refresh).await?;

		Some(CredentialPair { access, refresh })
	}

	/// Persists a full pair.
	///
	/// The refresh credential is written first. If the access write then fails, both keys are
	/// removed before the error is returned, so no new refresh credential is left next to a
	/// stale access credential.
	pub async fn set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
		let _guard = self.guard.lock().await;

		self.storage.set_item(&self.keys.refresh, pair.refresh.expose().to_owned()).await?;

		let written = self.storage.set_item(&self.keys.access, pair.access.expose().to_owned()).await;

		if let Err(e) = written {
			if let Err(cleanup) = self.remove_all_now().await {
				obs::cleanup_failed(&cleanup);
			}

			return Err(e);
		}

		Ok(())
	}

	/// Replaces only the access credential.
	///
	/// The refresh coordinator persists rotated credentials through
	/// [`compare_and_swap_access`](Self::compare_and_swap_access) instead, so a sign-out that
	/// races a refresh is not undone.
	pub async fn set_access_only(&self, access: &TokenSecret) -> Result<(), StoreError> {
		let _guard = self.guard.lock().await;

		self.storage.set_item(&self.keys.access, access.expose().to_owned()).await
	}

	/// Stores `access` only if the stored refresh credential still equals `expected_refresh`.
	///
	/// A logout or a new login that happened while a refresh was on the wire changes the
	/// refresh credential, and the late access credential is then dropped.
	pub async fn compare_and_swap_access(
		&self,
		expected_refresh: &TokenSecret,
		access: &TokenSecret,
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let _guard = self.guard.lock().await;
		let current = self.storage.get_item(&self.keys.refresh).await?;

		match current {
			Some(current) if current == expected_refresh.expose() => {
				self.storage.set_item(&self.keys.access, access.expose().to_owned()).await?;

				Ok(CompareAndSwapOutcome::Updated)
			},
			Some(_) => Ok(CompareAndSwapOutcome::RefreshMismatch),
			None => Ok(CompareAndSwapOutcome::Missing),
		}
	}

	/// Removes both credentials in one backend call. Clearing an empty store succeeds.
	pub async fn clear(&self) -> Result<(), StoreError> {
		let _guard = self.guard.lock().await;

		self.remove_all_now().await
	}

	async fn read_now(&self, kind: CredentialKind) -> Option<TokenSecret> {
		match self.storage.get_item(self.keys.get(kind)).await {
			Ok(value) => value.and_then(|raw| TokenSecret::try_from(raw).ok()),
			Err(e) => {
				obs::storage_read_failed(kind, &e);

				None
			},
		}
	}

	async fn remove_all_now(&self) -> Result<(), StoreError> {
		let keys = [self.keys.access.as_str(), self.keys.refresh.as_str()];

		self.storage.multi_remove(&keys).await
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore").field("keys", &self.keys).finish_non_exhaustive()
	}
}
