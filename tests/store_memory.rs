// std
use std::sync::Arc;
// self
use bearer_dispatch::{
	auth::{CredentialKind, CredentialPair, TokenSecret},
	store::{CredentialStore, KeyValueStorage, MemoryStorage},
};

fn store() -> (CredentialStore, Arc<MemoryStorage>) {
	let storage = Arc::new(MemoryStorage::default());
	let backend: Arc<dyn KeyValueStorage> = storage.clone();

	(CredentialStore::new(backend), storage)
}

#[tokio::test]
async fn pair_round_trips_under_default_keys() {
	let (store, storage) = store();

	store
		.set(&CredentialPair::new("access-1", "refresh-1"))
		.await
		.expect("Saving a credential pair should succeed.");

	assert_eq!(storage.peek("token").as_deref(), Some("access-1"));
	assert_eq!(storage.peek("refreshToken").as_deref(), Some("refresh-1"));

	let snapshot = store.snapshot().await.expect("Both credentials should be present.");

	assert_eq!(snapshot, CredentialPair::new("access-1", "refresh-1"));
}

#[tokio::test]
async fn access_only_rotation_keeps_the_refresh_credential() {
	let (store, _storage) = store();

	store
		.set(&CredentialPair::new("access-1", "refresh-1"))
		.await
		.expect("Saving a credential pair should succeed.");
	store
		.set_access_only(&TokenSecret::new("access-2"))
		.await
		.expect("Rotating the access credential should succeed.");

	let access = store.get(CredentialKind::Access).await.expect("Access should be present.");
	let refresh = store.get(CredentialKind::Refresh).await.expect("Refresh should be present.");

	assert_eq!(access.expose(), "access-2");
	assert_eq!(refresh.expose(), "refresh-1");
}

#[tokio::test]
async fn clear_is_idempotent() {
	let (store, storage) = store();

	store
		.set(&CredentialPair::new("access-1", "refresh-1"))
		.await
		.expect("Saving a credential pair should succeed.");
	store.clear().await.expect("First clear should succeed.");
	store.clear().await.expect("Second clear should succeed.");

	assert!(storage.is_empty());
	assert!(store.get(CredentialKind::Access).await.is_none());
	assert!(store.get(CredentialKind::Refresh).await.is_none());
	assert!(store.snapshot().await.is_none());
}

#[tokio::test]
async fn blank_values_read_as_absent() {
	let (store, storage) = store();

	storage.set_item("token", "   ".into()).await.expect("Raw write should succeed.");
	storage.set_item("refreshToken", "refresh-1".into()).await.expect("Raw write should succeed.");

	assert!(store.get(CredentialKind::Access).await.is_none());
	assert!(store.get(CredentialKind::Refresh).await.is_some());
	assert!(store.snapshot().await.is_none());
}
