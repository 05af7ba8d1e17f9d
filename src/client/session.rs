//! Session helpers: password login, sign-out, and the signed-in user's profile.

// self
use crate::{
	_prelude::*,
	api::RequestDescriptor,
	auth::{CredentialKind, CredentialPair},
	client::ApiClient,
	http::{ApiHttpClient, TransportErrorMapper},
	obs::{self, CallKind, CallOutcome, CallSpan},
	query::Query,
};

/// Cache-key prefix shared by session-scoped queries.
pub const AUTH_QUERY_PREFIX: &str = "auth";

/// Profile of the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// Server-side identifier.
	pub id: u64,
	/// Account email.
	pub email: String,
	/// Login name.
	pub username: String,
	/// Given name.
	#[serde(default)]
	pub first_name: String,
	/// Family name.
	#[serde(default)]
	pub last_name: String,
	/// Whether the account has staff privileges.
	#[serde(default)]
	pub is_staff: bool,
}

impl<C, M> ApiClient<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges an email/password pair for credentials and stores them.
	///
	/// The login endpoint is called anonymously with a URL-encoded form. A non-success answer
	/// surfaces as [`Error::RequestFailed`] and leaves the store untouched.
	pub async fn login(&self, email: &str, password: &str) -> Result<CredentialPair> {
		const KIND: CallKind = CallKind::Login;

		let span = CallSpan::new(KIND, "login");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let descriptor = RequestDescriptor::post(self.descriptor.endpoints.login.as_str())
					.with_form([("email", email), ("password", password)])
					.anonymous();
				let response = self.execute(&descriptor, None).await?;

				if !response.is_success() {
					return Err(response.into_error());
				}

				let pair = response.json::<CredentialPair>()?;

				self.store.set(&pair).await?;

				Ok(pair)
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Stores a credential pair obtained elsewhere (for example a social sign-in exchange).
	pub async fn sign_in_with(&self, pair: &CredentialPair) -> Result<()> {
		self.store.set(pair).await?;

		Ok(())
	}

	/// Forgets both stored credentials.
	pub async fn logout(&self) -> Result<()> {
		self.store.clear().await?;

		Ok(())
	}

	/// Whether a refresh credential is stored, meaning authenticated calls can recover from an
	/// expired access credential.
	pub async fn is_signed_in(&self) -> bool {
		self.store.get(CredentialKind::Refresh).await.is_some()
	}

	/// Query for the signed-in user's profile, keyed under [`AUTH_QUERY_PREFIX`].
	pub fn current_user_query(&self) -> Query<UserProfile> {
		Query::new(RequestDescriptor::get(self.descriptor.endpoints.current_user.as_str()))
			.with_key_prefix([AUTH_QUERY_PREFIX])
	}

	/// Fetches the signed-in user's profile.
	pub async fn current_user(&self) -> Result<UserProfile> {
		self.current_user_query().fetch(self).await
	}
}
