//! Thread-safe in-memory [`KeyValueStorage`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStorage, StoreFuture},
};

type StorageMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps values in-process for tests and demos.
///
/// Clones share the same map, so a test can keep one handle to inspect raw keys while the
/// credential store writes through another.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(StorageMap);
impl MemoryStorage {
	/// Returns a copy of the value under `key` without going through the async contract.
	pub fn peek(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	/// Number of stored keys.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn set_now(map: StorageMap, key: String, value: String) {
		map.write().insert(key, value);
	}

	fn multi_remove_now(map: StorageMap, keys: &[&str]) {
		let mut guard = map.write();

		for key in keys {
			guard.remove(*key);
		}
	}
}
impl KeyValueStorage for MemoryStorage {
	fn get_item<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn set_item<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::set_now(map, key, value);

			Ok(())
		})
	}

	fn remove_item<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}

	fn multi_remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			Self::multi_remove_now(map, keys);

			Ok(())
		})
	}
}
