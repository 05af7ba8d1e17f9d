//! Authenticated request dispatcher.
//!
//! [`ApiClient::send`] attaches the stored access credential, performs the call, and on a
//! `401` asks the refresh coordinator for a new credential before resending the same
//! request. The number of refresh-and-resend rounds is bounded by
//! [`ApiDescriptor::max_auth_retries`].

pub mod session;

pub use session::*;

// crates.io
use oauth2::{AsyncHttpClient, HttpResponse, http::HeaderMap};
// self
use crate::{
	_prelude::*,
	api::{ApiDescriptor, RequestDescriptor, build_request},
	auth::{CredentialKind, TokenSecret},
	error::ErrorBody,
	http::{ApiHttpClient, TransportErrorMapper, parse_retry_after},
	obs::{self, CallKind, CallOutcome, CallSpan},
	refresh::{RefreshCoordinator, RefreshMetrics},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport stack.
pub type ReqwestApiClient = ApiClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Dispatches API calls on behalf of the signed-in user.
///
/// Clones share the transport, the credential store, and the refresh coordinator, so every
/// clone takes part in the same refresh coalescing. Build one client per session backend and
/// clone it into whatever tasks need it.
pub struct ApiClient<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) http_client: Arc<C>,
	pub(crate) transport_mapper: Arc<M>,
	pub(crate) store: Arc<CredentialStore>,
	pub(crate) descriptor: ApiDescriptor,
	pub(crate) coordinator: Arc<RefreshCoordinator>,
}
impl<C, M> ApiClient<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<CredentialStore>,
		descriptor: ApiDescriptor,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			coordinator: Default::default(),
		}
	}

	/// Credential store the client reads and rotates.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.store
	}

	/// API descriptor the client was built with.
	pub fn descriptor(&self) -> &ApiDescriptor {
		&self.descriptor
	}

	/// Refresh coordinator shared by all clones of this client.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	/// Counters for refresh cycles driven by this client.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}

	/// Sends `descriptor`, refreshing the access credential on `401` up to the configured bound.
	///
	/// Non-success responses other than an authenticated `401` are returned as
	/// [`Error::RequestFailed`] without retrying. A refresh failure surfaces as
	/// [`Error::NoRefreshCredential`] or [`Error::RefreshFailed`]; a request that is still
	/// rejected after the last permitted refresh surfaces as [`Error::Unauthorized`].
	pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse> {
		const KIND: CallKind = CallKind::Dispatch;

		let span = CallSpan::new(KIND, "send");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.send_with_refresh(descriptor)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Sends `descriptor` and decodes the success body as JSON.
	pub async fn send_json<T>(&self, descriptor: &RequestDescriptor) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(descriptor).await?.json()
	}

	async fn send_with_refresh(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse> {
		let mut credential = if descriptor.is_authenticated() {
			self.store.get(CredentialKind::Access).await
		} else {
			None
		};
		let mut retries = 0;

		loop {
			let response = self.execute(descriptor, credential.as_ref()).await?;

			if response.is_success() {
				return Ok(response);
			}
			if response.status != 401 || !descriptor.is_authenticated() {
				return Err(response.into_error());
			}
			if retries >= self.descriptor.max_auth_retries {
				return Err(Error::Unauthorized { attempts: retries });
			}

			credential = Some(self.request_refresh(credential.as_ref()).await?);
			retries += 1;

			obs::auth_retry(descriptor.path(), retries);
		}
	}

	/// Performs exactly one HTTP exchange for `descriptor`.
	pub(crate) async fn execute(
		&self,
		descriptor: &RequestDescriptor,
		credential: Option<&TokenSecret>,
	) -> Result<ApiResponse> {
		let request = build_request(&self.descriptor, descriptor, credential)?;
		let handle = self.http_client.handle();
		let response = handle
			.call(request)
			.await
			.map_err(|e| self.transport_mapper.map_transport_error(e))?;

		Ok(ApiResponse::from(response))
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client over the provided reqwest transport.
	pub fn new(
		store: Arc<CredentialStore>,
		descriptor: ApiDescriptor,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self::with_http_client(store, descriptor, http_client, ReqwestTransportErrorMapper)
	}
}
impl<C, M> Clone for ApiClient<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			descriptor: self.descriptor.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<C, M> Debug for ApiClient<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("descriptor", &self.descriptor)
			.field("store", &self.store)
			.field("refreshing", &self.coordinator.is_refreshing())
			.finish()
	}
}

/// Raw success response returned by [`ApiClient::send`].
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Whether the status is in `200..300`.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body as JSON. `204 No Content` and empty bodies decode as `null`, so
	/// `Option<T>`, `()`, and `serde_json::Value` targets accept them.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		decode_json(self.status, &self.body)
			.map_err(|source| Error::Decode { status: self.status, source })
	}

	/// Body as text, replacing invalid UTF-8 sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// `Retry-After` hint, when the server sent one.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(&self.headers)
	}

	pub(crate) fn into_error(self) -> Error {
		Error::RequestFailed {
			status: self.status,
			body: ErrorBody::parse(&self.body),
			retry_after: self.retry_after(),
		}
	}
}
impl From<HttpResponse> for ApiResponse {
	fn from(response: HttpResponse) -> Self {
		let status = response.status().as_u16();
		let (parts, body) = response.into_parts();

		Self { status, headers: parts.headers, body }
	}
}

pub(crate) fn decode_json<T>(
	status: u16,
	body: &[u8],
) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
where
	T: DeserializeOwned,
{
	let body = if status == 204 || body.iter().all(u8::is_ascii_whitespace) {
		b"null".as_slice()
	} else {
		body
	};
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
}
