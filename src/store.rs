//! Storage contracts and the credential store layered on top of them.

pub mod credential;
pub mod file;
pub mod memory;

pub use credential::{CredentialStore, StorageKeys};
pub use file::FileStorage;
pub use memory::MemoryStorage;

// self
use crate::_prelude::*;

/// Boxed future returned by storage backends.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable string key/value backend the credential store persists into.
///
/// Mirrors the async storage APIs found on app platforms: values are plain strings, a missing
/// key reads as `None`, and removing an absent key succeeds.
pub trait KeyValueStorage
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if any.
	fn get_item<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Writes `value` under `key`, replacing any previous value.
	fn set_item<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes the value stored under `key`.
	fn remove_item<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Removes every listed key in one backend operation.
	fn multi_remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()>;
}

/// Result of an access-credential compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh credential matched the expected value and the access credential was updated.
	Updated,
	/// A refresh credential is stored but it is not the expected one.
	RefreshMismatch,
	/// No refresh credential is stored.
	Missing,
}

/// Error type produced by [`KeyValueStorage`] implementations.
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
