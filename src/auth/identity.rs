//! External identity handed to application resolvers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Identity a provider vouched for, in the shape the provider variant yields.
///
/// Which variant a strategy produces is governed by
/// [`IdentitySource`](crate::provider::IdentitySource): either the access
/// token itself stands in for the identity, or a subject id is extracted from
/// the provider's whoami payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExternalIdentity {
	/// The raw access token acts as the identity.
	AccessToken(TokenSecret),
	/// Subject identifier extracted from the provider's whoami response.
	Subject(String),
}
impl ExternalIdentity {
	/// Returns the identity as a plain string.
	///
	/// For the token variant this exposes the secret; resolvers need the raw
	/// value to look the user up, so the leak is deliberate at this seam.
	pub fn as_str(&self) -> &str {
		match self {
			Self::AccessToken(token) => token.expose(),
			Self::Subject(subject) => subject,
		}
	}
}
impl Display for ExternalIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::AccessToken(token) => Display::fmt(token, f),
			Self::Subject(subject) => f.write_str(subject),
		}
	}
}
