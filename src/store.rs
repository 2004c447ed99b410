//! Storage contracts and the per-request token persistence policy.
//!
//! Hosts own the actual storage: a per-visitor [`SessionStore`] and a durable
//! [`CookieStore`]. [`TokenStore`] layers the engine's policy on top of both,
//! namespacing every key under one strategy so providers never read each
//! other's tokens, and promoting cookie-mirrored tokens back into the session
//! when the session copy is gone.

pub mod memory;

pub use memory::{MemoryCookieJar, MemorySession};

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::StoredToken, provider::StrategyKey};

const ACCESS_FIELD: &str = "access_token";
const COOKIE_FIELD: &str = "token";
const PENDING_FIELD: &str = "pending";
const REFRESH_FIELD: &str = "refresh_token";
const STATE_FIELD: &str = "state";

/// Boxed future returned by the storage traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Per-visitor session owned by the host, exposed as plain string key-value.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Reads the value under `key`, if any.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Writes `value` under `key`, replacing any previous value.
	fn put<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes the value under `key`; removing an absent key is not an error.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Durable cookie jar owned by the host.
///
/// Values are opaque strings already encoded for cookie transport. The TTL is
/// fixed when the cookie is set; reads never extend it.
pub trait CookieStore
where
	Self: Send + Sync,
{
	/// Reads the cookie named `name`, if present and unexpired.
	fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Sets the cookie named `name` to `value`, expiring after `ttl`.
	fn set<'a>(&'a self, name: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()>;

	/// Deletes the cookie named `name`; deleting an absent cookie is not an error.
	fn clear<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`SessionStore`] and [`CookieStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failure while encoding a value for storage.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Backend-supplied description.
		message: String,
	},
	/// Backend-level failure of the host's storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Backend-supplied description.
		message: String,
	},
}

/// Marker recorded between the authorize redirect and the provider's callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFlow {
	/// Registry key of the strategy that initiated the flow.
	pub strategy_key: String,
	/// State parameter the callback must echo.
	pub state: Option<String>,
}
impl PendingFlow {
	/// True when this marker was recorded by `key`'s strategy.
	pub fn belongs_to(&self, key: &StrategyKey) -> bool {
		self.strategy_key == key.as_ref()
	}
}

/// Token persistence policy for one strategy within one request.
///
/// Session first, cookie second: `retrieve` falls back to the cookie mirror and
/// promotes the decoded token into the session, while `persist` mirrors into
/// the cookie only for providers that opted in via
/// [`cookie_ttl`](crate::provider::ProviderConfig::cookie_ttl). A cookie that
/// fails to decode reads as absent; stale mirrors are overwritten on the next
/// persist and dropped on `clear`.
pub struct TokenStore {
	session: Arc<dyn SessionStore>,
	cookies: Arc<dyn CookieStore>,
	namespace: String,
	cookie_ttl: Option<Duration>,
}
impl TokenStore {
	/// Creates the policy view for one strategy over the host's stores.
	pub fn new(
		strategy_key: &StrategyKey,
		cookie_ttl: Option<Duration>,
		session: Arc<dyn SessionStore>,
		cookies: Arc<dyn CookieStore>,
	) -> Self {
		Self { session, cookies, namespace: strategy_key.as_ref().to_owned(), cookie_ttl }
	}

	/// Returns the stored token without touching either store's contents.
	pub async fn peek(&self) -> Result<Option<StoredToken>, StoreError> {
		if let Some(token) = self.session_token().await? {
			return Ok(Some(token));
		}

		self.cookie_token().await
	}

	/// Returns the stored token, promoting a cookie-mirrored one into the session.
	///
	/// Promotion rewrites the session only; the cookie keeps its original
	/// lifetime.
	pub async fn retrieve(&self) -> Result<Option<StoredToken>, StoreError> {
		if let Some(token) = self.session_token().await? {
			return Ok(Some(token));
		}

		match self.cookie_token().await? {
			Some(token) => {
				self.write_session(&token).await?;

				Ok(Some(token))
			},
			None => Ok(None),
		}
	}

	/// Writes the token into the session and, when the provider opted in, the
	/// cookie mirror.
	pub async fn persist(&self, token: &StoredToken) -> Result<(), StoreError> {
		self.write_session(token).await?;

		if let Some(ttl) = self.cookie_ttl {
			self.cookies.set(&self.cookie_name(), encode_cookie(token)?, ttl).await?;
		}

		Ok(())
	}

	/// Removes the token, the pending marker, and the cookie mirror.
	pub async fn clear(&self) -> Result<(), StoreError> {
		self.session.remove(&self.key(ACCESS_FIELD)).await?;
		self.session.remove(&self.key(REFRESH_FIELD)).await?;
		self.session.remove(&self.key(PENDING_FIELD)).await?;
		self.session.remove(&self.key(STATE_FIELD)).await?;
		self.cookies.clear(&self.cookie_name()).await?;

		Ok(())
	}

	/// Records this strategy's key and the freshly generated state parameter
	/// ahead of the authorize redirect.
	pub async fn mark_pending(&self, state: &str) -> Result<(), StoreError> {
		self.session.put(&self.key(PENDING_FIELD), self.namespace.clone()).await?;
		self.session.put(&self.key(STATE_FIELD), state.to_owned()).await?;

		Ok(())
	}

	/// Reads the pending marker without consuming it.
	pub async fn peek_pending(&self) -> Result<Option<PendingFlow>, StoreError> {
		let Some(strategy_key) = self.session.get(&self.key(PENDING_FIELD)).await? else {
			return Ok(None);
		};
		let state = self.session.get(&self.key(STATE_FIELD)).await?;

		Ok(Some(PendingFlow { strategy_key, state }))
	}

	/// Consumes the pending marker once its callback has arrived.
	pub async fn take_pending(&self) -> Result<Option<PendingFlow>, StoreError> {
		let pending = self.peek_pending().await?;

		if pending.is_some() {
			self.session.remove(&self.key(PENDING_FIELD)).await?;
			self.session.remove(&self.key(STATE_FIELD)).await?;
		}

		Ok(pending)
	}

	fn key(&self, field: &str) -> String {
		format!("{}.{field}", self.namespace)
	}

	fn cookie_name(&self) -> String {
		self.key(COOKIE_FIELD)
	}

	async fn session_token(&self) -> Result<Option<StoredToken>, StoreError> {
		let Some(access) = self.session.get(&self.key(ACCESS_FIELD)).await? else {
			return Ok(None);
		};
		let token = match self.session.get(&self.key(REFRESH_FIELD)).await? {
			Some(refresh) => StoredToken::new(access).with_refresh_token(refresh),
			None => StoredToken::new(access),
		};

		Ok(Some(token))
	}

	async fn cookie_token(&self) -> Result<Option<StoredToken>, StoreError> {
		Ok(self.cookies.get(&self.cookie_name()).await?.and_then(|raw| decode_cookie(&raw)))
	}

	async fn write_session(&self, token: &StoredToken) -> Result<(), StoreError> {
		self.session.put(&self.key(ACCESS_FIELD), token.access_token.expose().to_owned()).await?;

		match &token.refresh_token {
			Some(refresh) =>
				self.session.put(&self.key(REFRESH_FIELD), refresh.expose().to_owned()).await?,
			None => self.session.remove(&self.key(REFRESH_FIELD)).await?,
		}

		Ok(())
	}
}

fn encode_cookie(token: &StoredToken) -> Result<String, StoreError> {
	let json = serde_json::to_vec(token)
		.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

	Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_cookie(raw: &str) -> Option<StoredToken> {
	let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;

	serde_json::from_slice(&bytes).ok()
}
