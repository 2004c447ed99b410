//! Per-provider configuration bound into a strategy at registration time.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError, provider::ProviderKey};

/// Default authorize-endpoint path appended to the site URL.
pub const DEFAULT_AUTHORIZE_PATH: &str = "/oauth/authorize";
/// Default token-endpoint path appended to the site URL.
pub const DEFAULT_TOKEN_PATH: &str = "/oauth/token";
/// Default path probed with the access token to validate it and, for the
/// whoami identity source, to read the identity payload.
pub const DEFAULT_WHOAMI_PATH: &str = "/oauth/authorize";

/// Where the identity handed to the user resolver comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
	/// The access token itself is the identity.
	#[default]
	AccessToken,
	/// Extract a field from the JSON body of the whoami response.
	WhoamiField {
		/// Field to read; dotted paths (`data.user.id`) descend into nested
		/// objects.
		field: String,
	},
}

/// Options handed through to the wire client.
///
/// Only `site` is mandatory; paths default to the common provider layout. The
/// binding snapshots these by value, so later mutation by the caller never
/// reaches an already-registered strategy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
	/// Base URL of the provider.
	pub site: Url,
	/// Authorization endpoint path, relative to `site`.
	#[serde(default = "default_authorize_path")]
	pub authorize_path: String,
	/// Token endpoint path, relative to `site`.
	#[serde(default = "default_token_path")]
	pub token_path: String,
	/// Path of the authenticated probe/whoami request, relative to `site`.
	#[serde(default = "default_whoami_path")]
	pub whoami_path: String,
	/// Redirect URI the provider sends the user-agent back to.
	#[serde(default)]
	pub redirect_uri: Option<Url>,
	/// Scope string requested during authorization.
	#[serde(default)]
	pub scope: Option<String>,
	/// Extra query parameters appended to the authorize URL.
	#[serde(default)]
	pub extra_params: BTreeMap<String, String>,
}
impl ClientOptions {
	/// Creates options for the given provider site with default paths.
	pub fn new(site: Url) -> Self {
		Self {
			site,
			authorize_path: default_authorize_path(),
			token_path: default_token_path(),
			whoami_path: default_whoami_path(),
			redirect_uri: None,
			scope: None,
			extra_params: BTreeMap::new(),
		}
	}

	/// Overrides the authorization endpoint path.
	pub fn with_authorize_path(mut self, path: impl Into<String>) -> Self {
		self.authorize_path = path.into();

		self
	}

	/// Overrides the token endpoint path.
	pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
		self.token_path = path.into();

		self
	}

	/// Overrides the probe/whoami path.
	pub fn with_whoami_path(mut self, path: impl Into<String>) -> Self {
		self.whoami_path = path.into();

		self
	}

	/// Sets the redirect URI sent with authorization requests.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Sets the scope string requested during authorization.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Appends one extra authorize-URL query parameter.
	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_params.insert(key.into(), value.into());

		self
	}
}

/// Declarative configuration for one provider.
///
/// Assembled by the application at startup, validated by
/// [`validate`](Self::validate) during
/// [`build_provider_strategy`](crate::strategy::StrategyFactory::build_provider_strategy),
/// then frozen inside the strategy binding for the binding's lifetime.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
	/// Provider name; stamped from the registration key by the factory.
	#[serde(default)]
	pub provider_name: Option<ProviderKey>,
	/// OAuth client id issued by the provider.
	#[serde(default)]
	pub client_id: Option<String>,
	/// OAuth client secret issued by the provider.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Options handed to the wire client.
	#[serde(default)]
	pub options: Option<ClientOptions>,
	/// How the resolver's identity input is derived.
	#[serde(default)]
	pub identity_source: IdentitySource,
	/// Opt-in lifetime for mirroring persisted tokens into the cookie store.
	///
	/// `None` keeps tokens session-only, matching providers that should not
	/// outlive the browser session.
	#[serde(default)]
	pub cookie_ttl: Option<Duration>,
}
impl ProviderConfig {
	/// Creates an empty configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets both client credentials.
	pub fn with_credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		self.client_id = Some(client_id.into());
		self.client_secret = Some(TokenSecret::new(client_secret));

		self
	}

	/// Sets the wire-client options.
	pub fn with_options(mut self, options: ClientOptions) -> Self {
		self.options = Some(options);

		self
	}

	/// Selects how the resolver's identity input is derived.
	pub fn with_identity_source(mut self, identity_source: IdentitySource) -> Self {
		self.identity_source = identity_source;

		self
	}

	/// Opts persisted tokens into a durable cookie mirror with this lifetime.
	pub fn with_cookie_ttl(mut self, cookie_ttl: Duration) -> Self {
		self.cookie_ttl = Some(cookie_ttl);

		self
	}

	/// Checks that both credentials are present.
	///
	/// Runs at registration time so a misconfigured provider aborts startup
	/// instead of failing its first login request.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.as_deref().is_none_or(str::is_empty) {
			return Err(ConfigError::MissingClientId);
		}
		if self.client_secret.as_ref().is_none_or(|s| s.expose().is_empty()) {
			return Err(ConfigError::MissingClientSecret);
		}

		Ok(())
	}

	/// Probe/whoami path from the options, or the default when options are
	/// absent (mock clients ignore it either way).
	pub fn whoami_path(&self) -> &str {
		self.options.as_ref().map_or(DEFAULT_WHOAMI_PATH, |options| options.whoami_path.as_str())
	}
}

fn default_authorize_path() -> String {
	DEFAULT_AUTHORIZE_PATH.to_owned()
}

fn default_token_path() -> String {
	DEFAULT_TOKEN_PATH.to_owned()
}

fn default_whoami_path() -> String {
	DEFAULT_WHOAMI_PATH.to_owned()
}
