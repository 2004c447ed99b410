//! Per-provider authentication strategies and their factory/registry layer.
//!
//! A [`Strategy`] evaluates one request against one registered provider and
//! settles on an [`AuthDecision`]: stay out of the chain's way, bounce the
//! user-agent to the provider, or conclude with a success/failure outcome.
//! Stage detection keys off the `oauth_provider` and `oauth_token` request
//! parameters plus the per-strategy pending-flow marker and stored token, so
//! initiation, callback, and silent resumption cannot shadow one another.

pub mod factory;
pub use factory::*;

// crates.io
use rand::{Rng, distr::Alphanumeric};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ExternalIdentity, StoredToken, TokenSecret},
	obs::{self, AuthSpan, AuthStage, AuthVerdict},
	provider::{IdentitySource, ProviderKey, StrategyKey},
	store::{CookieStore, SessionStore, StoreError, TokenStore},
};

/// Request parameter naming the provider whose dance to initiate.
pub const PROVIDER_PARAM: &str = "oauth_provider";
/// Request parameter carrying the provider's callback code.
pub const CALLBACK_PARAM: &str = "oauth_token";
/// Request parameter carrying the anti-forgery state echoed by the provider.
pub const STATE_PARAM: &str = "oauth_state";

const STATE_LEN: usize = 32;

/// Host-framework view of one inbound request.
///
/// Carries the request parameters relevant to the dance plus handles to the
/// host's session and cookie stores. Cloning is cheap; per-request adapters
/// build one of these and hand clones to every strategy in the chain.
#[derive(Clone)]
pub struct RequestContext {
	params: HashMap<String, String>,
	session: Arc<dyn SessionStore>,
	cookies: Arc<dyn CookieStore>,
}
impl RequestContext {
	/// Creates a context over the host's per-request stores.
	pub fn new(session: Arc<dyn SessionStore>, cookies: Arc<dyn CookieStore>) -> Self {
		Self { params: HashMap::new(), session, cookies }
	}

	/// Records one request parameter.
	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.insert(key.into(), value.into());

		self
	}

	/// Looks up a request parameter.
	pub fn param(&self, key: &str) -> Option<&str> {
		self.params.get(key).map(String::as_str)
	}

	pub(crate) fn session(&self) -> Arc<dyn SessionStore> {
		self.session.clone()
	}

	pub(crate) fn cookies(&self) -> Arc<dyn CookieStore> {
		self.cookies.clone()
	}
}
impl Debug for RequestContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestContext").field("params", &self.params).finish()
	}
}

/// What the host must do with the request after a strategy evaluated it.
#[derive(Debug)]
pub enum AuthDecision<U> {
	/// The strategy was not applicable; evaluate the next one.
	Continue,
	/// Redirect the user-agent to this URL and halt the chain.
	Redirect(Url),
	/// Authentication concluded; halt the chain with this outcome.
	Outcome(AuthOutcome<U>),
}

/// Terminal verdict of an applicable strategy.
#[derive(Debug)]
pub enum AuthOutcome<U> {
	/// The resolver produced an application user.
	Success(U),
	/// Authentication failed definitively.
	Fail(AuthFailure),
}

/// Classification of a definitive authentication failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
	/// The callback's state parameter did not match the recorded value.
	StateMismatch,
	/// The provider refused to exchange the callback code.
	ExchangeRejected,
	/// The provider rejected a freshly issued access token.
	TokenRejected,
	/// The stored token was rejected and could not be refreshed.
	RefreshFailed,
	/// The resolver declined to map the external identity to a user.
	UserNotFound,
	/// No identity could be derived from the provider's whoami payload.
	IdentityExtraction,
	/// The provider was unreachable or answered outside its protocol.
	ProviderError,
}

/// Definitive authentication failure handed back to the host.
///
/// `kind` drives programmatic handling, `message` is human-readable, and
/// `context` carries the strategy's identity and credentials so failure pages
/// can be rendered per provider.
#[derive(Clone, Debug)]
pub struct AuthFailure {
	/// Failure classification.
	pub kind: FailureKind,
	/// Human-readable description of what went wrong.
	pub message: String,
	/// Strategy context the failure occurred in.
	pub context: FailureContext,
}
impl Display for AuthFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.message)
	}
}

/// Strategy state captured at the moment of failure.
///
/// Tokens and client credentials stay wrapped in [`TokenSecret`], so the
/// whole context can be logged without leaking secrets.
#[derive(Clone, Debug)]
pub struct FailureContext {
	provider: ProviderKey,
	strategy_key: StrategyKey,
	access_token: Option<TokenSecret>,
	client_id: Option<String>,
	client_secret: Option<TokenSecret>,
}
impl FailureContext {
	/// Provider the failing strategy was registered for.
	pub fn provider(&self) -> &ProviderKey {
		&self.provider
	}

	/// Registry key of the failing strategy.
	pub fn strategy_key(&self) -> &StrategyKey {
		&self.strategy_key
	}

	/// Access token involved in the failure, when one was held.
	pub fn access_token(&self) -> Option<&TokenSecret> {
		self.access_token.as_ref()
	}

	/// OAuth client id of the failing strategy.
	pub fn client_id(&self) -> Option<&str> {
		self.client_id.as_deref()
	}

	/// OAuth client secret of the failing strategy.
	pub fn client_secret(&self) -> Option<&TokenSecret> {
		self.client_secret.as_ref()
	}
}
impl Display for FailureContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "provider `{}`", self.provider)?;

		if let Some(token) = &self.access_token {
			write!(f, ", token fingerprint `{}`", token.fingerprint())?;
		}

		Ok(())
	}
}

/// One provider's authentication strategy, bound to one request.
///
/// Built by [`StrategyBinding::strategy`] per request; owns nothing beyond
/// the binding handle, the request context, and the token-store view scoped
/// to the binding's registry key.
pub struct Strategy<U> {
	binding: Arc<StrategyBinding<U>>,
	ctx: RequestContext,
	store: TokenStore,
}
impl<U> Strategy<U> {
	fn new(binding: Arc<StrategyBinding<U>>, ctx: RequestContext) -> Self {
		let store = TokenStore::new(
			binding.strategy_key(),
			binding.config().cookie_ttl,
			ctx.session(),
			ctx.cookies(),
		);

		Self { binding, ctx, store }
	}

	/// Token-store view scoped to this strategy's registry key.
	pub fn store(&self) -> &TokenStore {
		&self.store
	}

	/// Determines which stage of the dance this request is in, if any.
	///
	/// Initiation wins over callback and callback over resumption. A
	/// callback-shaped request whose pending marker belongs to another
	/// strategy (or is absent) matches nothing at all; it never degrades
	/// into a resumption.
	pub async fn stage(&self) -> Result<Option<AuthStage>, StoreError> {
		if self.ctx.param(PROVIDER_PARAM) == Some(self.binding.provider().as_ref()) {
			return Ok(Some(AuthStage::Initiate));
		}
		if self.ctx.param(CALLBACK_PARAM).is_some() {
			let ours = self
				.store
				.peek_pending()
				.await?
				.is_some_and(|pending| pending.belongs_to(self.binding.strategy_key()));

			return Ok(ours.then_some(AuthStage::Callback));
		}
		if self.store.peek().await?.is_some() {
			return Ok(Some(AuthStage::Resume));
		}

		Ok(None)
	}

	/// True when [`stage`](Self::stage) matches this request.
	pub async fn applicable(&self) -> Result<bool, StoreError> {
		Ok(self.stage().await?.is_some())
	}

	/// Runs the stage this request is in and settles on a decision.
	///
	/// Provider rejections and lookup misses come back as `Fail` outcomes;
	/// only deployment-level problems (broken stores, missing resolvers)
	/// surface as errors.
	pub async fn authenticate(&self) -> Result<AuthDecision<U>> {
		let provider = self.binding.provider();
		let stage = self.stage().await?;
		let span = AuthSpan::new(provider, stage);

		let Some(stage) = stage else {
			obs::record_auth_verdict(provider, None, AuthVerdict::Skipped);

			return Ok(AuthDecision::Continue);
		};

		obs::record_auth_verdict(provider, Some(stage), AuthVerdict::Attempt);

		let result = span
			.instrument(async move {
				match stage {
					AuthStage::Initiate => self.initiate().await,
					AuthStage::Callback => self.callback().await,
					AuthStage::Resume => self.resume().await,
				}
			})
			.await;
		let verdict = match &result {
			Ok(AuthDecision::Continue) => AuthVerdict::Skipped,
			Ok(AuthDecision::Redirect(_)) => AuthVerdict::Redirect,
			Ok(AuthDecision::Outcome(AuthOutcome::Success(_))) => AuthVerdict::Success,
			Ok(AuthDecision::Outcome(AuthOutcome::Fail(_))) | Err(_) => AuthVerdict::Failure,
		};

		obs::record_auth_verdict(provider, Some(stage), verdict);

		result
	}

	/// Initiation: resume a live session when one exists, otherwise record a
	/// pending-flow marker and redirect to the provider.
	///
	/// A stored token that still works never bounces the user back to the
	/// provider; a stored token the provider has rejected beyond refresh is
	/// cleared so the redirect starts a clean dance.
	async fn initiate(&self) -> Result<AuthDecision<U>> {
		if let Some(token) = self.store.retrieve().await? {
			match self.validate_stored(token).await? {
				StoredVerdict::Live { token, whoami } => return self.resolve(token, whoami).await,
				StoredVerdict::Dead { .. } => self.store.clear().await?,
				StoredVerdict::Unreachable { token, reason } => {
					return Ok(self.fail(FailureKind::ProviderError, reason, Some(&token)));
				},
			}
		}

		let state = random_string(STATE_LEN);

		self.store.mark_pending(&state).await?;

		Ok(AuthDecision::Redirect(self.binding.client().build_authorize_url(Some(&state))))
	}

	/// Callback: verify the state echo, exchange the code, persist the grant,
	/// and resolve the user.
	async fn callback(&self) -> Result<AuthDecision<U>> {
		let Some(code) = self.ctx.param(CALLBACK_PARAM) else {
			return Ok(AuthDecision::Continue);
		};
		let Some(pending) = self.store.take_pending().await? else {
			return Ok(AuthDecision::Continue);
		};

		if pending.state.as_deref() != self.ctx.param(STATE_PARAM) {
			return Ok(self.fail(
				FailureKind::StateMismatch,
				"Callback state does not match the value recorded at initiation.",
				None,
			));
		}

		let grant = match self.binding.client().exchange(code).await {
			Ok(grant) => grant,
			Err(err) if err.is_access_denied() => {
				return Ok(self.fail(FailureKind::ExchangeRejected, err.to_string(), None));
			},
			Err(err) => {
				return Ok(self.fail(FailureKind::ProviderError, err.to_string(), None));
			},
		};
		let token = StoredToken::from(grant);

		self.store.persist(&token).await?;

		match self.probe_for_identity(&token).await {
			Ok(whoami) => self.resolve(token, whoami).await,
			Err(ProbeFailure::Denied(reason)) => {
				self.store.clear().await?;

				Ok(self.fail(FailureKind::TokenRejected, reason, Some(&token)))
			},
			Err(ProbeFailure::Unreachable(reason)) => {
				Ok(self.fail(FailureKind::ProviderError, reason, Some(&token)))
			},
		}
	}

	/// Resumption: validate the stored token against the provider, refreshing
	/// it once when rejected.
	async fn resume(&self) -> Result<AuthDecision<U>> {
		let Some(token) = self.store.retrieve().await? else {
			return Ok(AuthDecision::Continue);
		};

		match self.validate_stored(token).await? {
			StoredVerdict::Live { token, whoami } => self.resolve(token, whoami).await,
			StoredVerdict::Dead { token, kind, reason } => {
				self.store.clear().await?;

				Ok(self.fail(kind, reason, Some(&token)))
			},
			StoredVerdict::Unreachable { token, reason } => {
				Ok(self.fail(FailureKind::ProviderError, reason, Some(&token)))
			},
		}
	}

	/// Probes the provider with the stored access token.
	///
	/// Both identity modes probe here; a stored token is only trusted after
	/// the provider vouched for it on this request.
	async fn validate_stored(&self, token: StoredToken) -> Result<StoredVerdict> {
		let path = self.binding.config().whoami_path();

		match self.binding.client().authenticated_get(token.access_token.expose(), path).await {
			Ok(body) => Ok(StoredVerdict::Live { token, whoami: Some(body) }),
			Err(err) if err.is_access_denied() => self.refresh_stored(token).await,
			Err(err) => Ok(StoredVerdict::Unreachable { token, reason: err.to_string() }),
		}
	}

	/// One refresh attempt for a rejected stored token.
	///
	/// Runs at most once per request; when the provider rejects the refreshed
	/// token too, the verdict is final rather than another refresh.
	async fn refresh_stored(&self, token: StoredToken) -> Result<StoredVerdict> {
		let Some(refresh_token) = token.refresh_token.clone() else {
			return Ok(StoredVerdict::Dead {
				token,
				kind: FailureKind::RefreshFailed,
				reason: "Provider rejected the stored access token and no refresh token is held."
					.into(),
			});
		};
		let grant = match self.binding.client().refresh(refresh_token.expose()).await {
			Ok(grant) => grant,
			Err(err) if err.is_access_denied() => {
				return Ok(StoredVerdict::Dead {
					token,
					kind: FailureKind::RefreshFailed,
					reason: err.to_string(),
				});
			},
			Err(err) => {
				return Ok(StoredVerdict::Unreachable { token, reason: err.to_string() });
			},
		};
		// Providers that do not rotate refresh tokens expect the old one to
		// survive the replacement grant.
		let refreshed = if grant.refresh_token.is_some() {
			StoredToken::from(grant)
		} else {
			StoredToken { access_token: grant.access_token, refresh_token: Some(refresh_token) }
		};

		self.store.persist(&refreshed).await?;

		match self.binding.config().identity_source {
			IdentitySource::AccessToken =>
				Ok(StoredVerdict::Live { token: refreshed, whoami: None }),
			IdentitySource::WhoamiField { .. } => {
				let path = self.binding.config().whoami_path();
				let probe = self
					.binding
					.client()
					.authenticated_get(refreshed.access_token.expose(), path)
					.await;

				match probe {
					Ok(body) => Ok(StoredVerdict::Live { token: refreshed, whoami: Some(body) }),
					Err(err) if err.is_access_denied() => Ok(StoredVerdict::Dead {
						token: refreshed,
						kind: FailureKind::TokenRejected,
						reason: "Provider rejected the freshly refreshed access token.".into(),
					}),
					Err(err) => Ok(StoredVerdict::Unreachable {
						token: refreshed,
						reason: err.to_string(),
					}),
				}
			},
		}
	}

	/// Fetches the identity payload for a freshly exchanged token.
	///
	/// The access-token identity mode trusts the fresh grant without a probe;
	/// the whoami mode must fetch the body it extracts the identity from.
	async fn probe_for_identity(
		&self,
		token: &StoredToken,
	) -> Result<Option<String>, ProbeFailure> {
		if matches!(self.binding.config().identity_source, IdentitySource::AccessToken) {
			return Ok(None);
		}

		let path = self.binding.config().whoami_path();

		match self.binding.client().authenticated_get(token.access_token.expose(), path).await {
			Ok(body) => Ok(Some(body)),
			Err(err) if err.is_access_denied() => Err(ProbeFailure::Denied(err.to_string())),
			Err(err) => Err(ProbeFailure::Unreachable(err.to_string())),
		}
	}

	/// Derives the external identity and hands it to the registered resolver.
	async fn resolve(&self, token: StoredToken, whoami: Option<String>) -> Result<AuthDecision<U>> {
		let identity = match self.derive_identity(&token, whoami.as_deref()) {
			Ok(identity) => identity,
			Err(reason) => {
				return Ok(self.fail(FailureKind::IdentityExtraction, reason, Some(&token)));
			},
		};
		let resolver = self.binding.resolvers().require(self.binding.provider())?;

		match resolver.resolve(&identity).await {
			Some(user) => Ok(AuthDecision::Outcome(AuthOutcome::Success(user))),
			None => Ok(self.fail(
				FailureKind::UserNotFound,
				format!("No user is mapped to the `{}` identity.", self.binding.provider()),
				Some(&token),
			)),
		}
	}

	fn derive_identity(
		&self,
		token: &StoredToken,
		whoami: Option<&str>,
	) -> Result<ExternalIdentity, String> {
		match &self.binding.config().identity_source {
			IdentitySource::AccessToken =>
				Ok(ExternalIdentity::AccessToken(token.access_token.clone())),
			IdentitySource::WhoamiField { field } => {
				let Some(body) = whoami else {
					return Err("Whoami response body is missing.".into());
				};
				let value = serde_json::from_str::<Value>(body)
					.map_err(|e| format!("Whoami response is not valid JSON: {e}."))?;
				let Some(found) = extract_json_field(&value, field) else {
					return Err(format!("Whoami response has no `{field}` field."));
				};

				scalar_to_subject(found)
					.ok_or_else(|| format!("Whoami field `{field}` is not a scalar value."))
			},
		}
	}

	fn fail(
		&self,
		kind: FailureKind,
		message: impl Into<String>,
		token: Option<&StoredToken>,
	) -> AuthDecision<U> {
		AuthDecision::Outcome(AuthOutcome::Fail(AuthFailure {
			kind,
			message: message.into(),
			context: self.failure_context(token),
		}))
	}

	fn failure_context(&self, token: Option<&StoredToken>) -> FailureContext {
		let config = self.binding.config();

		FailureContext {
			provider: self.binding.provider().clone(),
			strategy_key: self.binding.strategy_key().clone(),
			access_token: token.map(|t| t.access_token.clone()),
			client_id: config.client_id.clone(),
			client_secret: config.client_secret.clone(),
		}
	}
}
impl<U> Debug for Strategy<U> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Strategy").field("binding", &self.binding).finish()
	}
}

/// Provider's verdict on a stored token, after at most one refresh.
enum StoredVerdict {
	Live { token: StoredToken, whoami: Option<String> },
	Dead { token: StoredToken, kind: FailureKind, reason: String },
	Unreachable { token: StoredToken, reason: String },
}

enum ProbeFailure {
	Denied(String),
	Unreachable(String),
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

/// Descends `value` along `path`, where dots separate object keys.
fn extract_json_field<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
	let mut current = value;

	for segment in path.split('.') {
		current = current.get(segment)?;
	}

	Some(current)
}

fn scalar_to_subject(value: &Value) -> Option<ExternalIdentity> {
	match value {
		Value::String(s) => Some(ExternalIdentity::Subject(s.clone())),
		Value::Number(n) => Some(ExternalIdentity::Subject(n.to_string())),
		Value::Bool(b) => Some(ExternalIdentity::Subject(b.to_string())),
		_ => None,
	}
}
