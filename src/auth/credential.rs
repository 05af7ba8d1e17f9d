//! Access/refresh credential pair and the selector used by store lookups.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Which half of a [`CredentialPair`] a lookup refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
	/// Short-lived bearer credential attached to API calls.
	Access,
	/// Longer-lived credential exchanged for a new access credential.
	Refresh,
}
impl CredentialKind {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKind::Access => "access",
			CredentialKind::Refresh => "refresh",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Access and refresh credentials written and cleared as a unit.
///
/// The field names match the `{ "access": .., "refresh": .. }` body returned by the login
/// endpoint, so the pair deserializes straight from that response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
	/// Bearer credential.
	pub access: TokenSecret,
	/// Refresh credential.
	pub refresh: TokenSecret,
}
impl CredentialPair {
	/// Creates a pair from raw token strings.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self { access: TokenSecret::new(access), refresh: TokenSecret::new(refresh) }
	}

	/// Returns the credential of the requested kind.
	pub fn get(&self, kind: CredentialKind) -> &TokenSecret {
		match kind {
			CredentialKind::Access => &self.access,
			CredentialKind::Refresh => &self.refresh,
		}
	}
}
