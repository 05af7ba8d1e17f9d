//! Credential models: redacted token secrets and the access/refresh pair persisted per session.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
