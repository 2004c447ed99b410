//! Application-supplied user resolution.
//!
//! The engine never stores users; it hands the provider-backed identity to a
//! host-registered [`UserResolver`] and treats `None` as an authentication
//! failure. Resolvers live in a [`ResolverRegistry`] keyed by provider, looked
//! up per request so registration order relative to strategy construction does
//! not matter.

// self
use crate::{
	_prelude::*,
	auth::ExternalIdentity,
	provider::{ProviderKey, ProviderKeyError},
};

/// Boxed future returned by [`UserResolver`] implementations.
pub type ResolverFuture<'a, U> = Pin<Box<dyn Future<Output = Option<U>> + 'a + Send>>;

/// Application hook mapping an external identity to a local user.
pub trait UserResolver<U>
where
	Self: Send + Sync,
{
	/// Looks up the local user for `identity`; `None` fails the authentication.
	fn resolve<'a>(&'a self, identity: &'a ExternalIdentity) -> ResolverFuture<'a, U>;
}
impl<U> Debug for dyn UserResolver<U> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("UserResolver")
	}
}

/// Adapter lifting a synchronous closure into a [`UserResolver`].
struct FnResolver<F>(F);
impl<U, F> UserResolver<U> for FnResolver<F>
where
	F: Fn(&ExternalIdentity) -> Option<U> + Send + Sync,
	U: 'static + Send,
{
	fn resolve<'a>(&'a self, identity: &'a ExternalIdentity) -> ResolverFuture<'a, U> {
		let user = (self.0)(identity);

		Box::pin(async move { user })
	}
}

/// Resolver wiring failures, surfaced on first use rather than at registration.
#[derive(Debug, ThisError)]
pub enum ResolverError {
	/// The provider handling the request has no registered resolver.
	#[error("No user resolver is registered for provider `{provider}`; call `ResolverRegistry::register_fn(\"{provider}\", ..)` before authenticating.")]
	MissingResolver {
		/// Provider whose strategy needed the resolver.
		provider: String,
	},
}

/// Process-wide resolver table keyed by provider.
///
/// Written at startup, read on every request. Re-registering a key replaces the
/// previous resolver; `clear` empties the table for tests and reconfiguration.
pub struct ResolverRegistry<U> {
	entries: RwLock<HashMap<ProviderKey, Arc<dyn UserResolver<U>>>>,
}
impl<U> ResolverRegistry<U> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `resolver` for `key`, replacing any previous registration.
	///
	/// The key is normalized exactly like a strategy registration key, so
	/// `"Service"` and `"service"` address the same provider.
	pub fn register(
		&self,
		key: impl AsRef<str>,
		resolver: Arc<dyn UserResolver<U>>,
	) -> Result<(), ProviderKeyError> {
		let key = ProviderKey::new(key)?;

		self.entries.write().insert(key, resolver);

		Ok(())
	}

	/// Registers a plain closure for `key`, replacing any previous registration.
	pub fn register_fn<F>(&self, key: impl AsRef<str>, resolver: F) -> Result<(), ProviderKeyError>
	where
		F: 'static + Fn(&ExternalIdentity) -> Option<U> + Send + Sync,
		U: 'static + Send,
	{
		self.register(key, Arc::new(FnResolver(resolver)))
	}

	/// Returns the resolver registered for `key`, if any.
	pub fn get(&self, key: &ProviderKey) -> Option<Arc<dyn UserResolver<U>>> {
		self.entries.read().get(key).cloned()
	}

	/// Returns the resolver for `key` or the error telling the host how to
	/// register one.
	pub fn require(&self, key: &ProviderKey) -> Result<Arc<dyn UserResolver<U>>, ResolverError> {
		self.get(key).ok_or_else(|| ResolverError::MissingResolver { provider: key.to_string() })
	}

	/// Removes every registered resolver.
	///
	/// In-flight requests that already fetched their resolver are unaffected.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	/// Number of registered resolvers.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// True when no resolver is registered.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
impl<U> Default for ResolverRegistry<U> {
	fn default() -> Self {
		Self { entries: RwLock::new(HashMap::new()) }
	}
}
