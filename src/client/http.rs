//! Reqwest-backed [`TokenClient`] built on the `oauth2` crate.
//!
//! [`HttpClientFactory`] turns each validated [`ProviderConfig`] into an
//! [`HttpTokenClient`]: authorization-code exchanges and refreshes run through
//! `oauth2`'s typed request builders, while identity probes issue plain
//! bearer-authenticated GETs against the provider's whoami endpoint.

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, HttpClientError, HttpRequest, HttpResponse, RedirectUrl, RefreshToken,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
};
use reqwest::{StatusCode, redirect::Policy};
// self
use crate::{
	_prelude::*,
	auth::TokenGrant,
	client::{ClientFuture, TokenClient, TokenClientError, TokenClientFactory},
	error::ConfigError,
	provider::ProviderConfig,
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// [`TokenClientFactory`] producing [`HttpTokenClient`]s over a shared reqwest pool.
///
/// One factory serves every provider registration; each built client clones the
/// underlying [`ReqwestClient`] handle, so connections are pooled across providers.
#[derive(Clone)]
pub struct HttpClientFactory {
	http: ReqwestClient,
}
impl HttpClientFactory {
	/// Creates a factory whose connection pool has redirect following disabled; token
	/// endpoints are expected to answer directly.
	pub fn new() -> Result<Self, ConfigError> {
		let http =
			ReqwestClient::builder().redirect(Policy::none()).build().map_err(ConfigError::from)?;

		Ok(Self { http })
	}

	/// Wraps an existing [`ReqwestClient`], keeping its settings as-is.
	///
	/// The client should have redirect following disabled; see [`HttpClientFactory::new`].
	pub fn with_client(http: ReqwestClient) -> Self {
		Self { http }
	}
}
impl TokenClientFactory for HttpClientFactory {
	fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn TokenClient>, ConfigError> {
		Ok(Arc::new(HttpTokenClient::from_config(config, self.http.clone())?))
	}
}

/// [`TokenClient`] speaking the authorization-code grant over HTTP.
///
/// Token-minting calls are delegated to `oauth2` so error payloads are parsed per
/// RFC 6749; the whoami probe is a plain GET carrying the access token as a bearer
/// credential.
pub struct HttpTokenClient {
	oauth: ConfiguredBasicClient,
	http: ReqwestClient,
	site: Url,
	authorize_url: Url,
	client_id: String,
	redirect_uri: Option<Url>,
	scope: Option<String>,
	extra_params: BTreeMap<String, String>,
}
impl HttpTokenClient {
	/// Builds a client from a provider configuration and a shared connection pool.
	///
	/// Requires [`ClientOptions`](crate::provider::ClientOptions) with a site URL. All
	/// endpoint paths are resolved against the site here, so a malformed path fails the
	/// registration instead of the first login attempt.
	pub fn from_config(config: &ProviderConfig, http: ReqwestClient) -> Result<Self, ConfigError> {
		let options = config.options.as_ref().ok_or_else(|| ConfigError::MissingClientOptions {
			provider: config
				.provider_name
				.as_ref()
				.map(|key| key.to_string())
				.unwrap_or_else(|| "unnamed".into()),
		})?;
		let client_id = config.client_id.clone().ok_or(ConfigError::MissingClientId)?;
		let client_secret = config.client_secret.clone().ok_or(ConfigError::MissingClientSecret)?;
		let authorize_url = join_endpoint(&options.site, &options.authorize_path)?;
		let token_url = join_endpoint(&options.site, &options.token_path)?;

		// The whoami request bypasses `oauth2`; its path is checked here all the same.
		join_endpoint(&options.site, &options.whoami_path)?;

		// Client credentials travel in the form body.
		let mut oauth = BasicClient::new(ClientId::new(client_id.clone()))
			.set_auth_uri(AuthUrl::from_url(authorize_url.clone()))
			.set_token_uri(TokenUrl::from_url(token_url))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody);

		if let Some(redirect) = &options.redirect_uri {
			oauth = oauth.set_redirect_uri(RedirectUrl::from_url(redirect.clone()));
		}

		Ok(Self {
			oauth,
			http,
			site: options.site.clone(),
			authorize_url,
			client_id,
			redirect_uri: options.redirect_uri.clone(),
			scope: options.scope.clone(),
			extra_params: options.extra_params.clone(),
		})
	}
}
impl TokenClient for HttpTokenClient {
	fn build_authorize_url(&self, state: Option<&str>) -> Url {
		let mut url = self.authorize_url.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", &self.client_id);

		if let Some(redirect) = &self.redirect_uri {
			pairs.append_pair("redirect_uri", redirect.as_str());
		}
		if let Some(scope) = &self.scope {
			pairs.append_pair("scope", scope);
		}

		for (key, value) in &self.extra_params {
			pairs.append_pair(key, value);
		}

		if let Some(state) = state {
			pairs.append_pair("state", state);
		}

		drop(pairs);

		url
	}

	fn exchange<'a>(&'a self, code: &'a str) -> ClientFuture<'a, TokenGrant> {
		Box::pin(async move {
			let dispatch = HttpDispatch(self.http.clone());
			let response = self
				.oauth
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.request_async(&dispatch)
				.await
				.map_err(map_token_error)?;

			Ok(grant_from_response(&response))
		})
	}

	fn authenticated_get<'a>(
		&'a self,
		access_token: &'a str,
		path: &'a str,
	) -> ClientFuture<'a, String> {
		Box::pin(async move {
			let url = self.site.join(path).map_err(|e| TokenClientError::Unexpected {
				message: format!("request path `{path}` does not resolve against the site: {e}"),
				status: None,
			})?;
			let response = self.http.get(url).bearer_auth(access_token).send().await?;
			let status = response.status();

			if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
				return Err(TokenClientError::access_denied(format!(
					"identity endpoint answered {status}"
				)));
			}
			if !status.is_success() {
				return Err(TokenClientError::Unexpected {
					message: format!("identity endpoint answered {status}"),
					status: Some(status.as_u16()),
				});
			}

			Ok(response.text().await?)
		})
	}

	fn refresh<'a>(&'a self, refresh_token: &'a str) -> ClientFuture<'a, TokenGrant> {
		Box::pin(async move {
			let dispatch = HttpDispatch(self.http.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth
				.exchange_refresh_token(&refresh_secret)
				.request_async(&dispatch)
				.await
				.map_err(map_token_error)?;

			Ok(grant_from_response(&response))
		})
	}
}

/// Adapter handing reqwest to `oauth2`'s [`AsyncHttpClient`] interface.
///
/// Copies status and headers onto the buffered body so `oauth2` can classify OAuth
/// error payloads itself.
struct HttpDispatch(ReqwestClient);
impl<'c> AsyncHttpClient<'c> for HttpDispatch {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut mapped = HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*mapped.status_mut() = status;
			*mapped.headers_mut() = headers;

			Ok(mapped)
		})
	}
}

fn join_endpoint(site: &Url, path: &str) -> Result<Url, ConfigError> {
	site.join(path).map_err(|source| ConfigError::InvalidEndpoint { path: path.to_owned(), source })
}

fn grant_from_response(response: &BasicTokenResponse) -> TokenGrant {
	let grant = TokenGrant::new(response.access_token().secret().clone());

	match response.refresh_token() {
		Some(refresh) => grant.with_refresh_token(refresh.secret().clone()),
		None => grant,
	}
}

fn map_token_error(err: BasicRequestTokenError<HttpClientError<ReqwestError>>) -> TokenClientError {
	match err {
		// An RFC 6749 error payload means the provider deliberately rejected the
		// request; anything else stays transient.
		RequestTokenError::ServerResponse(response) => {
			let reason = response
				.error_description()
				.map(|description| description.to_owned())
				.unwrap_or_else(|| response.error().as_ref().to_owned());

			TokenClientError::AccessDenied { reason }
		},
		RequestTokenError::Request(error) => match error {
			HttpClientError::Reqwest(inner) => TokenClientError::transport(*inner),
			HttpClientError::Io(inner) => TokenClientError::transport(inner),
			other => TokenClientError::Unexpected { message: other.to_string(), status: None },
		},
		RequestTokenError::Parse(source, _body) => TokenClientError::ResponseParse { source },
		RequestTokenError::Other(message) => TokenClientError::Unexpected { message, status: None },
	}
}
