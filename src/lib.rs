//! Authenticated API dispatch for app clients: bearer credentials on every call, one coalesced
//! token refresh per client no matter how many requests fail at once, bounded retries, and
//! cache-keyed query/mutation helpers for the data-fetching layer on top.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod obs;
pub mod query;
pub mod refresh;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		api::ApiDescriptor,
		auth::CredentialPair,
		client::ReqwestApiClient,
		http::ReqwestHttpClient,
		store::{CredentialStore, KeyValueStorage, MemoryStorage},
	};

	/// Builds a descriptor rooted at `base_url` that accepts the plain-HTTP URLs handed out by
	/// `httpmock`.
	pub fn test_api_descriptor(base_url: &str) -> ApiDescriptor {
		let base_url = Url::parse(base_url).expect("Test base URL should parse.");

		ApiDescriptor::builder(base_url)
			.allow_insecure_http(true)
			.build()
			.expect("Test API descriptor should build.")
	}

	/// Constructs an [`ReqwestApiClient`] backed by an in-memory storage map, returning the
	/// storage handle so tests can inspect raw keys.
	pub fn build_reqwest_test_client(base_url: &str) -> (ReqwestApiClient, Arc<MemoryStorage>) {
		let storage = Arc::new(MemoryStorage::default());
		let backend: Arc<dyn KeyValueStorage> = storage.clone();
		let store = Arc::new(CredentialStore::new(backend));
		let client = ReqwestApiClient::new(
			store,
			test_api_descriptor(base_url),
			ReqwestHttpClient::default(),
		);

		(client, storage)
	}

	/// Seeds the credential store with an access/refresh pair.
	pub async fn seed_credentials(store: &CredentialStore, access: &str, refresh: &str) {
		store
			.set(&CredentialPair::new(access, refresh))
			.await
			.expect("Seeding credentials into the store should succeed.");
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		marker::PhantomData,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
