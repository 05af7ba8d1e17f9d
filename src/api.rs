//! API descriptor data structures and the request builder shared by every call.
//!
//! The descriptor holds the validated base URL, the auth endpoint paths, and the dispatch
//! policy (authorization scheme and retry bound). Request descriptors describe a single call
//! and are turned into wire requests by [`build_request`].

/// Builder API for assembling API descriptors.
pub mod builder;
/// Request descriptors and wire-request construction.
pub mod request;

pub use builder::*;
pub use request::*;

// self
use crate::{_prelude::*, error::ConfigError};

/// Endpoint paths used by the session helpers and the refresh coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoints {
	/// Refresh endpoint, called with `{"refresh": ..}`.
	pub refresh: String,
	/// Password login endpoint, called with a URL-encoded form.
	pub login: String,
	/// Profile endpoint of the signed-in user.
	pub current_user: String,
}
impl Default for ApiEndpoints {
	fn default() -> Self {
		Self {
			refresh: "/auth/jwt/refresh".into(),
			login: "/auth/jwt/login".into(),
			current_user: "/auth/users/me/".into(),
		}
	}
}

/// Immutable API descriptor consumed by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
	/// Base URL every request path is appended to. Any path prefix is kept.
	pub base_url: Url,
	/// Auth endpoint paths.
	pub endpoints: ApiEndpoints,
	/// Scheme placed before the access credential in `Authorization` headers.
	pub auth_scheme: String,
	/// Refresh-and-resend attempts allowed per request before giving up.
	pub max_auth_retries: u32,
	/// Whether a plain `http` base URL passed validation.
	pub allow_insecure_http: bool,
}
impl ApiDescriptor {
	/// Default authorization scheme.
	pub const DEFAULT_AUTH_SCHEME: &'static str = "Bearer";
	/// Default bound on refresh-and-resend attempts per request.
	pub const DEFAULT_MAX_AUTH_RETRIES: u32 = 3;

	/// Creates a new builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> ApiDescriptorBuilder {
		ApiDescriptorBuilder::new(base_url)
	}

	/// Joins a request path onto the base URL.
	///
	/// Joining is textual so `https://host/api/v1` + `/jobs` yields `https://host/api/v1/jobs`
	/// rather than dropping the `v1` segment the way RFC 3986 resolution would.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		let base = self.base_url.as_str().trim_end_matches('/');
		let joined = if path.starts_with('/') {
			format!("{base}{path}")
		} else {
			format!("{base}/{path}")
		};

		Url::parse(&joined)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}
}
