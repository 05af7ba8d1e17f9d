//! Token secret wrapper that keeps credentials out of logs.

// self
use crate::_prelude::*;

/// Error returned when a token secret would be empty.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Token secret cannot be empty.")]
pub struct EmptySecretError;

/// Redacted bearer or refresh credential.
///
/// Deserialization rejects empty strings, so a `{"access": ""}` response surfaces as a decode
/// failure instead of an unusable credential.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Formats the `Authorization` header value for the given scheme (`Bearer`, `JWT`, ...).
	pub fn authorization(&self, scheme: &str) -> String {
		format!("{scheme} {}", self.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl From<TokenSecret> for String {
	fn from(value: TokenSecret) -> Self {
		value.0
	}
}
impl TryFrom<String> for TokenSecret {
	type Error = EmptySecretError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		if value.trim().is_empty() {
			return Err(EmptySecretError);
		}

		Ok(Self(value))
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
