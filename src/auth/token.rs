//! Token material handled by the engine: secrets, grants, and the stored form.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
///
/// Wraps access tokens, refresh tokens, and client secrets alike; both
/// formatters print `<redacted>` so the value never reaches logs by accident.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Short stable fingerprint safe to log alongside the redacted secret.
	///
	/// Base64 (no padding) encoding of the SHA-256 digest, truncated to twelve
	/// characters so two log lines about the same token can be correlated
	/// without revealing it.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());
		let mut encoded = STANDARD_NO_PAD.encode(digest);

		encoded.truncate(12);

		encoded
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
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

/// Token pair returned by a provider exchange or refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Access token granted by the provider.
	pub access_token: TokenSecret,
	/// Refresh token, when the provider issued one.
	pub refresh_token: Option<TokenSecret>,
}
impl TokenGrant {
	/// Creates a grant holding only an access token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), refresh_token: None }
	}

	/// Attaches a refresh token to this grant.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(refresh_token));

		self
	}
}

/// Token pair as persisted across requests by the [`TokenStore`](crate::store::TokenStore).
///
/// Created when a provider grants access, read on every subsequent request to
/// decide applicability, cleared once the provider rejects it beyond refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
	/// Access token presented on authenticated calls.
	pub access_token: TokenSecret,
	/// Refresh token used to mint a replacement access token, if any.
	pub refresh_token: Option<TokenSecret>,
}
impl StoredToken {
	/// Wraps a bare access token without refresh capability.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), refresh_token: None }
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(refresh_token));

		self
	}
}
impl From<TokenGrant> for StoredToken {
	fn from(grant: TokenGrant) -> Self {
		Self { access_token: grant.access_token, refresh_token: grant.refresh_token }
	}
}
