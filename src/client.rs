//! Wire-client collaborator contract and its default HTTP implementation.

#[cfg(feature = "reqwest")] pub mod http;
#[cfg(feature = "reqwest")] pub use http::{HttpClientFactory, HttpTokenClient};

// self
use crate::{_prelude::*, auth::TokenGrant, error::ConfigError, provider::ProviderConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by [`TokenClient`] operations.
pub type ClientFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TokenClientError>> + 'a + Send>>;

/// Capability contract for the OAuth wire protocol.
///
/// The engine treats every network-facing step of the dance as a call on this
/// trait, so providers with unusual wire dialects plug in a custom
/// implementation instead of patching the state machine. URL construction is
/// local; the other three operations hit the provider.
pub trait TokenClient
where
	Self: Send + Sync,
{
	/// Builds the authorization URL the user-agent is redirected to.
	///
	/// `state` is the opaque value the strategy recorded alongside its
	/// pending-flow marker; clients for protocols without a state parameter
	/// may ignore it.
	fn build_authorize_url(&self, state: Option<&str>) -> Url;

	/// Exchanges the callback's code (or raw token) for an access token.
	fn exchange<'a>(&'a self, code: &'a str) -> ClientFuture<'a, TokenGrant>;

	/// Performs an authenticated GET, returning the response body.
	///
	/// Rejection of the token must surface as
	/// [`TokenClientError::AccessDenied`]; the strategy's refresh and clear
	/// logic keys off that variant alone.
	fn authenticated_get<'a>(
		&'a self,
		access_token: &'a str,
		path: &'a str,
	) -> ClientFuture<'a, String>;

	/// Mints a replacement access token from a refresh token.
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> ClientFuture<'a, TokenGrant>;
}

/// Builds one [`TokenClient`] per registered provider.
///
/// Injected into the strategy factory; tests and custom transports swap the
/// whole client here rather than inside the engine.
pub trait TokenClientFactory
where
	Self: Send + Sync,
{
	/// Constructs the client for `config`, validating every option it needs.
	///
	/// Runs during registration, so option problems (missing site, bad
	/// endpoint paths) abort startup instead of the first login.
	fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn TokenClient>, ConfigError>;
}

/// Error type produced by [`TokenClient`] implementations.
#[derive(Debug, ThisError)]
pub enum TokenClientError {
	/// The provider rejected the credential (denied exchange, invalid or
	/// expired token, rejected refresh token).
	#[error("Provider denied access: {reason}.")]
	AccessDenied {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The provider responded with JSON that could not be parsed.
	#[error("Provider returned a malformed response.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
	/// The provider responded outside its protocol (unexpected status or
	/// shape) without rejecting the credential outright.
	#[error("Provider returned an unexpected response: {message}.")]
	Unexpected {
		/// Human-readable summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Transport failure (DNS, TCP, TLS) before any provider verdict.
	#[error("Network error occurred while calling the provider.")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TokenClientError {
	/// Wraps an access denial reason.
	pub fn access_denied(reason: impl Into<String>) -> Self {
		Self::AccessDenied { reason: reason.into() }
	}

	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Box::new(src) }
	}

	/// Returns true when the provider actively rejected the credential.
	pub fn is_access_denied(&self) -> bool {
		matches!(self, Self::AccessDenied { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TokenClientError {
	fn from(e: ReqwestError) -> Self {
		Self::transport(e)
	}
}
