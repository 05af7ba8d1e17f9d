// self
use crate::{
	_prelude::*,
	api::{ApiDescriptor, ApiEndpoints},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ApiDescriptorError {
	/// Base URL must use HTTPS unless plain HTTP was explicitly allowed.
	#[error("The base URL must use HTTPS: {url}.")]
	InsecureBaseUrl {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL uses a scheme the client cannot speak.
	#[error("Unsupported base URL scheme `{scheme}`.")]
	UnsupportedScheme {
		/// Offending scheme.
		scheme: String,
	},
	/// Base URL cannot carry request paths (for example `mailto:`).
	#[error("The base URL cannot carry request paths: {url}.")]
	InvalidBaseUrl {
		/// Base URL that failed validation.
		url: String,
	},
	/// Endpoint paths must be absolute (start with `/`).
	#[error("The {endpoint} endpoint path must start with `/`: {path}.")]
	InvalidPath {
		/// Which endpoint failed validation.
		endpoint: String,
		/// Path that failed validation.
		path: String,
	},
	/// Authorization scheme must be a single non-empty token.
	#[error("Authorization scheme `{scheme}` must be a single non-empty token.")]
	InvalidAuthScheme {
		/// Scheme that was supplied.
		scheme: String,
	},
}

/// Builder for [`ApiDescriptor`] values.
#[derive(Debug)]
pub struct ApiDescriptorBuilder {
	/// Base URL every request path is appended to.
	pub base_url: Url,
	/// Auth endpoint paths.
	pub endpoints: ApiEndpoints,
	/// Authorization scheme (`Bearer` by default).
	pub auth_scheme: String,
	/// Refresh-and-resend attempts allowed per request.
	pub max_auth_retries: u32,
	/// Accept a plain `http` base URL (local development and test servers).
	pub allow_insecure_http: bool,
}
impl ApiDescriptorBuilder {
	/// Creates a new builder seeded with the provided base URL and default policy.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			endpoints: ApiEndpoints::default(),
			auth_scheme: ApiDescriptor::DEFAULT_AUTH_SCHEME.into(),
			max_auth_retries: ApiDescriptor::DEFAULT_MAX_AUTH_RETRIES,
			allow_insecure_http: false,
		}
	}

	/// Sets the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.endpoints.refresh = path.into();

		self
	}

	/// Sets the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.endpoints.login = path.into();

		self
	}

	/// Sets the current-user endpoint path.
	pub fn current_user_path(mut self, path: impl Into<String>) -> Self {
		self.endpoints.current_user = path.into();

		self
	}

	/// Overrides the authorization scheme (for example `JWT`).
	pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.auth_scheme = scheme.into();

		self
	}

	/// Overrides the retry bound. Zero disables refresh-and-resend entirely.
	pub fn max_auth_retries(mut self, retries: u32) -> Self {
		self.max_auth_retries = retries;

		self
	}

	/// Allows or forbids a plain `http` base URL.
	pub fn allow_insecure_http(mut self, allow: bool) -> Self {
		self.allow_insecure_http = allow;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ApiDescriptor, ApiDescriptorError> {
		let descriptor = ApiDescriptor {
			base_url: self.base_url,
			endpoints: self.endpoints,
			auth_scheme: self.auth_scheme,
			max_auth_retries: self.max_auth_retries,
			allow_insecure_http: self.allow_insecure_http,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ApiDescriptor {
	fn validate(&self) -> Result<(), ApiDescriptorError> {
		validate_base_url(&self.base_url, self.allow_insecure_http)?;
		validate_path("refresh", &self.endpoints.refresh)?;
		validate_path("login", &self.endpoints.login)?;
		validate_path("current_user", &self.endpoints.current_user)?;

		if self.auth_scheme.is_empty() || self.auth_scheme.contains(char::is_whitespace) {
			return Err(ApiDescriptorError::InvalidAuthScheme { scheme: self.auth_scheme.clone() });
		}

		Ok(())
	}
}

fn validate_base_url(url: &Url, allow_insecure_http: bool) -> Result<(), ApiDescriptorError> {
	if url.cannot_be_a_base() {
		return Err(ApiDescriptorError::InvalidBaseUrl { url: url.to_string() });
	}

	match url.scheme() {
		"https" => Ok(()),
		"http" if allow_insecure_http => Ok(()),
		"http" => Err(ApiDescriptorError::InsecureBaseUrl { url: url.to_string() }),
		scheme => Err(ApiDescriptorError::UnsupportedScheme { scheme: scheme.to_owned() }),
	}
}

fn validate_path(endpoint: &str, path: &str) -> Result<(), ApiDescriptorError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(ApiDescriptorError::InvalidPath { endpoint: endpoint.to_owned(), path: path.to_owned() })
	}
}
