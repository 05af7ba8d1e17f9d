//! Credential refresh with singleflight coalescing.
//!
//! [`ApiClient::request_refresh`] is called by the dispatcher whenever an authenticated call
//! comes back `401`. All callers that arrive while a refresh is on the wire share its outcome
//! through the client's [`RefreshCoordinator`], so the refresh endpoint sees one call no
//! matter how many requests failed at once. A failed refresh clears the credential store
//! before any caller is told about it; a successful one rotates only the access credential,
//! and only if the refresh credential it was obtained with is still the stored one.

mod coordinator;
mod metrics;

pub use coordinator::RefreshCoordinator;
pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	api::RequestDescriptor,
	auth::{CredentialKind, TokenSecret},
	client::{ApiClient, decode_json},
	error::ErrorBody,
	http::{ApiHttpClient, TransportErrorMapper},
	obs::{self, CallKind, CallOutcome, CallSpan},
	store::{CompareAndSwapOutcome, StoreError},
};

/// Outcome broadcast to every caller of one refresh cycle.
pub type RefreshOutcome = Result<TokenSecret, RefreshError>;

/// Reason the refresh endpoint did not yield a new access credential.
#[derive(Clone, Debug, ThisError)]
pub enum RefreshFailure {
	/// The endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the credential with HTTP {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// `detail` message from the error body, when present.
		detail: Option<String>,
	},
	/// The refresh request could not be built or sent.
	#[error("Refresh request could not be completed: {0}")]
	Request(#[source] Arc<Error>),
	/// The endpoint answered 2xx with a body lacking a usable `access` field.
	#[error("Refresh response (HTTP {status}) does not carry an access credential.")]
	MalformedBody {
		/// HTTP status code.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
}
impl RefreshFailure {
	/// HTTP status of the refresh response, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::MalformedBody { status, .. } => Some(*status),
			Self::Request(_) => None,
		}
	}

	/// `detail` message returned by the endpoint, when present.
	pub fn detail(&self) -> Option<&str> {
		match self {
			Self::Rejected { detail, .. } => detail.as_deref(),
			_ => None,
		}
	}
}

/// Error settled on every caller of a refresh cycle.
#[derive(Clone, Debug, ThisError)]
pub enum RefreshError {
	/// No refresh credential is stored; the store has been cleared.
	#[error("No refresh credential is stored.")]
	NoRefreshCredential,
	/// The refresh call failed; the store has been cleared.
	#[error("{0}")]
	Failed(#[source] RefreshFailure),
	/// The new access credential could not be persisted; stored credentials are untouched.
	#[error("{0}")]
	Storage(#[source] StoreError),
}
impl From<RefreshError> for Error {
	fn from(e: RefreshError) -> Self {
		match e {
			RefreshError::NoRefreshCredential => Error::NoRefreshCredential,
			RefreshError::Failed(failure) => Error::RefreshFailed(failure),
			RefreshError::Storage(e) => Error::Storage(e),
		}
	}
}

#[derive(Deserialize)]
struct RefreshResponse {
	access: TokenSecret,
}

impl<C, M> ApiClient<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Obtains a new access credential, joining the refresh already in flight if there is one.
	///
	/// `stale` is the credential the caller's request was rejected with. When the stored access
	/// credential already differs from it, an earlier cycle has rotated it and that credential is
	/// returned without calling the refresh endpoint. A `None` stale credential always goes to the
	/// endpoint.
	///
	/// A refresh credential that cannot be read is treated as absent: the store is cleared and
	/// the session ends with [`RefreshError::NoRefreshCredential`], even when the read failure
	/// was transient.
	pub async fn request_refresh(&self, stale: Option<&TokenSecret>) -> RefreshOutcome {
		let stale = stale.cloned();

		self.coordinator.coalesce(|| self.refresh_cycle(stale)).await
	}

	async fn refresh_cycle(&self, stale: Option<TokenSecret>) -> RefreshOutcome {
		const KIND: CallKind = CallKind::Refresh;

		let span = CallSpan::new(KIND, "refresh_cycle");

		span.instrument(async move {
			let Some(refresh) = self.store.get(CredentialKind::Refresh).await else {
				self.clear_credentials().await;

				return Err(RefreshError::NoRefreshCredential);
			};

			// Without a rejected credential to compare against, only the endpoint can vouch for
			// the stored access credential.
			if let Some(stale) = stale.as_ref() {
				if let Some(current) = self.store.get(CredentialKind::Access).await {
					if &current != stale {
						return Ok(current);
					}
				}
			}

			obs::record_call_outcome(KIND, CallOutcome::Attempt);
			self.coordinator.metrics().record_attempt();

			let access = match self.call_refresh_endpoint(&refresh).await {
				Ok(access) => access,
				Err(failure) => {
					obs::record_call_outcome(KIND, CallOutcome::Failure);
					self.clear_credentials().await;

					return Err(RefreshError::Failed(failure));
				},
			};

			obs::record_call_outcome(KIND, CallOutcome::Success);

			match self.store.compare_and_swap_access(&refresh, &access).await {
				Ok(CompareAndSwapOutcome::Updated) => Ok(access),
				// A new session was stored while the refresh was on the wire; hand out its
				// credential instead.
				Ok(CompareAndSwapOutcome::RefreshMismatch) => self
					.store
					.get(CredentialKind::Access)
					.await
					.ok_or(RefreshError::NoRefreshCredential),
				Ok(CompareAndSwapOutcome::Missing) => Err(RefreshError::NoRefreshCredential),
				Err(e) => Err(RefreshError::Storage(e)),
			}
		})
		.await
	}

	async fn call_refresh_endpoint(
		&self,
		refresh: &TokenSecret,
	) -> Result<TokenSecret, RefreshFailure> {
		let descriptor = RequestDescriptor::post(self.descriptor.endpoints.refresh.as_str())
			.with_json_value(serde_json::json!({ "refresh": refresh.expose() }))
			.anonymous();
		let response = self
			.execute(&descriptor, None)
			.await
			.map_err(|e| RefreshFailure::Request(Arc::new(e)))?;
		let status = response.status;

		if !response.is_success() {
			let detail = ErrorBody::parse(&response.body)
				.and_then(|body| body.detail().map(str::to_owned));

			return Err(RefreshFailure::Rejected { status, detail });
		}

		let decoded = decode_json::<RefreshResponse>(status, &response.body)
			.map_err(|source| RefreshFailure::MalformedBody { status, source: Arc::new(source) })?;

		Ok(decoded.access)
	}

	async fn clear_credentials(&self) {
		if let Err(e) = self.store.clear().await {
			obs::cleanup_failed(&e);
		}
	}
}
