//! Access/refresh token pair held by the session store.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Opaque access token plus the refresh token used to renew it.
///
/// Neither value is parsed locally; expiry is only discovered when the backend answers
/// with HTTP 401.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Bearer credential attached to outbound requests.
	pub access_token: TokenSecret,
	/// Longer-lived credential exchanged for a new pair, if one was issued.
	pub refresh_token: Option<TokenSecret>,
}
impl TokenPair {
	/// Creates a pair carrying both secrets.
	pub fn new(access_token: impl Into<TokenSecret>, refresh_token: impl Into<TokenSecret>) -> Self {
		Self { access_token: access_token.into(), refresh_token: Some(refresh_token.into()) }
	}

	/// Creates a pair without a refresh token; the session ends at the first 401.
	pub fn access_only(access_token: impl Into<TokenSecret>) -> Self {
		Self { access_token: access_token.into(), refresh_token: None }
	}

	/// Returns `true` when a refresh token is present and non-empty.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.as_ref().is_some_and(|secret| !secret.is_empty())
	}
}
