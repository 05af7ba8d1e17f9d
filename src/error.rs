//! Client-level error types shared across the dispatcher, refresh coordinator, and stores.

// self
use crate::{_prelude::*, api::ApiDescriptorError, refresh::RefreshFailure, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure while persisting credentials.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration or request-construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Network-level failure (DNS, TCP, TLS, timeout); not retried by the dispatcher.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// A refresh was required but no refresh credential is stored.
	#[error("No refresh credential is stored; the session must sign in again.")]
	NoRefreshCredential,
	/// The refresh endpoint rejected the credential or could not be reached.
	#[error("Credential refresh failed: {0}")]
	RefreshFailed(#[source] RefreshFailure),
	/// The request stayed unauthorized after the configured number of refresh retries.
	#[error("Request is still unauthorized after {attempts} credential refreshes.")]
	Unauthorized {
		/// Refresh-and-resend attempts performed before giving up.
		attempts: u32,
	},
	/// The API answered with a non-success status other than 401.
	#[error("Request failed with HTTP {status}.")]
	RequestFailed {
		/// HTTP status code.
		status: u16,
		/// Decoded error payload, when the response carried one.
		body: Option<ErrorBody>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// A success response did not decode into the expected type.
	#[error("Response body (HTTP {status}) does not match the expected shape.")]
	Decode {
		/// HTTP status code of the response.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns `true` when the error means the session is no longer authorized.
	///
	/// Covers a missing or rejected refresh credential as well as an exhausted retry bound, so
	/// callers can route every variant to the same sign-in prompt.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::NoRefreshCredential | Self::RefreshFailed(_) | Self::Unauthorized { .. })
	}

	/// Returns `true` when repeating the same request later may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::RequestFailed { status, .. } =>
				matches!(status, 408 | 429) || (500..600).contains(status),
			_ => false,
		}
	}

	/// HTTP status carried by the error, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::RequestFailed { status, .. } | Self::Decode { status, .. } => Some(*status),
			Self::Unauthorized { .. } => Some(401),
			Self::RefreshFailed(failure) => failure.status(),
			_ => None,
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed (invalid header name or value, bad URI).
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Request path could not be joined onto the base URL.
	#[error("Request path `{path}` does not form a valid URL.")]
	InvalidPath {
		/// Offending request path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	BodyEncode(#[source] serde_json::Error),
	/// API descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] ApiDescriptorError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete within the transport's deadline.
	#[error("Request timed out while calling the API.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
	/// Transport failure reported only as a message.
	#[error("HTTP client error occurred while calling the API: {message}.")]
	Other {
		/// Transport-supplied description.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

/// Error payload returned alongside a non-success response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ErrorBody {
	/// Body parsed as JSON (for example `{"detail": "..."}`).
	Json(serde_json::Value),
	/// Body that is not JSON, truncated to a short preview.
	Text(String),
}
impl ErrorBody {
	const TEXT_PREVIEW_LIMIT: usize = 256;

	/// Parses a raw response body; empty or whitespace-only bodies yield `None`.
	pub fn parse(bytes: &[u8]) -> Option<Self> {
		if bytes.iter().all(u8::is_ascii_whitespace) {
			return None;
		}
		if let Ok(value) = serde_json::from_slice(bytes) {
			return Some(Self::Json(value));
		}

		let text = String::from_utf8_lossy(bytes);
		let preview = text.chars().take(Self::TEXT_PREVIEW_LIMIT).collect();

		Some(Self::Text(preview))
	}

	/// Returns the `detail` message when the body is a JSON object carrying one.
	pub fn detail(&self) -> Option<&str> {
		match self {
			Self::Json(value) => value.get("detail").and_then(serde_json::Value::as_str),
			Self::Text(_) => None,
		}
	}
}
