//! Engine-level error types shared across strategies, registries, and clients.

// self
use crate::_prelude::*;

/// Crate-local result alias; the error side defaults to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
///
/// Only deployment-level problems surface here; provider rejections and
/// lookup misses are folded into the `Fail` authentication outcome instead.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Resolver wiring failure.
	#[error("{0}")]
	Resolver(
		#[from]
		#[source]
		crate::resolver::ResolverError,
	),
	/// Host storage backend failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}

/// Configuration and validation failures raised at registration time.
///
/// Every variant indicates a broken deployment and must abort startup before
/// the affected provider handles traffic.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Provider key failed identifier validation.
	#[error(transparent)]
	InvalidProviderKey(#[from] crate::provider::ProviderKeyError),
	/// Provider configuration is missing the client id.
	#[error("Provider configuration is missing the client id.")]
	MissingClientId,
	/// Provider configuration is missing the client secret.
	#[error("Provider configuration is missing the client secret.")]
	MissingClientSecret,

	/// Transport for the token client could not be built.
	#[error("Transport for the token client could not be built.")]
	HttpClientBuild {
		/// Builder error from the underlying HTTP stack.
		#[source]
		source: BoxError,
	},
	/// Provider configuration carries no client options.
	#[error("Provider `{provider}` has no client options; the HTTP token client requires a site.")]
	MissingClientOptions {
		/// Key of the provider whose options are missing.
		provider: String,
	},
	/// A configured endpoint path does not resolve against the site URL.
	#[error("Client option path `{path}` does not form a valid URL against the site.")]
	InvalidEndpoint {
		/// Offending path from the client options.
		path: String,
		/// Parse failure from joining the path onto the site.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Boxes a transport builder failure into [`ConfigError::HttpClientBuild`].
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
