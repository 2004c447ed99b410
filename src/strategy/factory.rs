//! Strategy construction and the `"<provider>_oauth"` registry.
//!
//! [`StrategyFactory::build_provider_strategy`] turns a declarative
//! [`ProviderConfig`] into a published [`StrategyBinding`]; the shared
//! [`StrategyRegistry`] keeps bindings in registration order and dispatches
//! whole requests across them.

// self
use crate::{
	_prelude::*,
	client::{TokenClient, TokenClientFactory},
	error::ConfigError,
	provider::{ProviderConfig, ProviderKey, StrategyKey},
	resolver::ResolverRegistry,
	strategy::{AuthDecision, RequestContext, Strategy},
};

/// Immutable result of registering one provider.
///
/// Holds the validated identity, the frozen configuration snapshot, the wire
/// client built for it, and the shared resolver table. Every request-scoped
/// [`Strategy`] of this provider is spawned from the same binding, so they
/// all share one client connection pool.
pub struct StrategyBinding<U> {
	provider: ProviderKey,
	strategy_key: StrategyKey,
	config: ProviderConfig,
	client: Arc<dyn TokenClient>,
	resolvers: Arc<ResolverRegistry<U>>,
}
impl<U> StrategyBinding<U> {
	/// Provider this binding was registered for.
	pub fn provider(&self) -> &ProviderKey {
		&self.provider
	}

	/// Registry key the binding is published under.
	pub fn strategy_key(&self) -> &StrategyKey {
		&self.strategy_key
	}

	/// Configuration snapshot frozen at registration time.
	pub fn config(&self) -> &ProviderConfig {
		&self.config
	}

	/// Wire client every flow of this binding goes through.
	pub fn client(&self) -> &dyn TokenClient {
		self.client.as_ref()
	}

	pub(crate) fn resolvers(&self) -> &ResolverRegistry<U> {
		self.resolvers.as_ref()
	}

	/// Instantiates this binding's strategy for one request.
	pub fn strategy(self: &Arc<Self>, ctx: RequestContext) -> Strategy<U> {
		Strategy::new(self.clone(), ctx)
	}
}
impl<U> Debug for StrategyBinding<U> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StrategyBinding")
			.field("provider", &self.provider)
			.field("strategy_key", &self.strategy_key)
			.finish()
	}
}

/// Builds provider strategies and publishes them in the shared registry.
pub struct StrategyFactory<U> {
	clients: Arc<dyn TokenClientFactory>,
	resolvers: Arc<ResolverRegistry<U>>,
	registry: Arc<StrategyRegistry<U>>,
}
impl<U> StrategyFactory<U> {
	/// Creates a factory over the given collaborator set.
	pub fn new(
		clients: Arc<dyn TokenClientFactory>,
		resolvers: Arc<ResolverRegistry<U>>,
		registry: Arc<StrategyRegistry<U>>,
	) -> Self {
		Self { clients, resolvers, registry }
	}

	/// Registers provider `key` and publishes its strategy under
	/// `"<key>_oauth"`.
	///
	/// Registration is idempotent per derived key: the first call wins, and
	/// later calls return the already-published binding without validating or
	/// building anything, so a second configuration for the same provider can
	/// never replace a live one.
	pub fn build_provider_strategy(
		&self,
		key: impl AsRef<str>,
		mut config: ProviderConfig,
	) -> Result<Arc<StrategyBinding<U>>, ConfigError> {
		let provider = ProviderKey::new(key)?;
		let strategy_key = provider.strategy_key();

		if let Some(existing) = self.registry.get(&strategy_key) {
			return Ok(existing);
		}

		config.validate()?;

		config.provider_name = Some(provider.clone());

		let client = self.clients.build(&config)?;
		let binding = Arc::new(StrategyBinding {
			provider,
			strategy_key,
			config,
			client,
			resolvers: self.resolvers.clone(),
		});

		Ok(self.registry.publish(binding))
	}
}

/// Ordered, shared table of published strategy bindings.
///
/// Preserves registration order; dispatch walks bindings oldest first, so the
/// earliest applicable strategy answers the request.
pub struct StrategyRegistry<U> {
	entries: RwLock<Vec<Arc<StrategyBinding<U>>>>,
}
impl<U> StrategyRegistry<U> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self { entries: RwLock::new(Vec::new()) }
	}

	/// Looks up the binding published under `key`.
	pub fn get(&self, key: &StrategyKey) -> Option<Arc<StrategyBinding<U>>> {
		self.entries.read().iter().find(|binding| binding.strategy_key == *key).cloned()
	}

	/// Snapshot of the published bindings in registration order.
	pub fn bindings(&self) -> Vec<Arc<StrategyBinding<U>>> {
		self.entries.read().clone()
	}

	/// Number of published bindings.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// True when nothing has been published yet.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Removes every published binding.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	/// Publishes `binding` unless its key is already taken.
	///
	/// The check runs under the write lock, so when two registrations of the
	/// same key race, the insert that wins the lock is the binding every
	/// caller receives.
	pub(crate) fn publish(&self, binding: Arc<StrategyBinding<U>>) -> Arc<StrategyBinding<U>> {
		let mut entries = self.entries.write();

		if let Some(existing) =
			entries.iter().find(|published| published.strategy_key == binding.strategy_key)
		{
			return existing.clone();
		}

		entries.push(binding.clone());

		binding
	}

	/// Evaluates each binding's strategy against `ctx` until one halts the
	/// chain.
	pub async fn authenticate(&self, ctx: &RequestContext) -> Result<AuthDecision<U>> {
		for binding in self.bindings() {
			match binding.strategy(ctx.clone()).authenticate().await {
				Ok(AuthDecision::Continue) => continue,
				decision => return decision,
			}
		}

		Ok(AuthDecision::Continue)
	}
}
impl<U> Default for StrategyRegistry<U> {
	fn default() -> Self {
		Self::new()
	}
}
impl<U> Debug for StrategyRegistry<U> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StrategyRegistry").field("len", &self.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	fn test_factory()
	-> (StrategyFactory<String>, Arc<StrategyRegistry<String>>, Arc<StubClientFactory>) {
		let clients = Arc::new(StubClientFactory::new(Arc::new(StubTokenClient::new())));
		let registry = Arc::new(StrategyRegistry::new());
		let factory = StrategyFactory::new(
			clients.clone(),
			Arc::new(ResolverRegistry::new()),
			registry.clone(),
		);

		(factory, registry, clients)
	}

	#[test]
	fn registration_is_idempotent_per_provider() {
		let (factory, registry, clients) = test_factory();
		let config = ProviderConfig::new().with_credentials("ABC", "123");
		let first = factory
			.build_provider_strategy("service", config)
			.expect("First registration should succeed.");
		// The repeat configuration is not even valid; first-wins means it is
		// never inspected.
		let second = factory
			.build_provider_strategy("service", ProviderConfig::new())
			.expect("Repeat registration should return the existing binding.");

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(registry.len(), 1);
		assert_eq!(clients.built_for(), ["service"]);
		assert_eq!(first.config().client_id.as_deref(), Some("ABC"));
	}

	#[test]
	fn keys_normalize_before_publishing() {
		let (factory, registry, _) = test_factory();
		let config = ProviderConfig::new().with_credentials("ABC", "123");

		factory
			.build_provider_strategy("Service", config.clone())
			.expect("Mixed-case key should normalize and register.");

		let binding = factory
			.build_provider_strategy("SERVICE", config)
			.expect("Normalized repeat should return the existing binding.");

		assert_eq!(binding.provider().as_ref(), "service");
		assert_eq!(binding.strategy_key().as_ref(), "service_oauth");
		assert_eq!(
			binding.config().provider_name.as_ref().map(AsRef::as_ref),
			Some("service"),
			"The factory should stamp the normalized provider name into the config.",
		);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn invalid_registrations_abort_before_publishing() {
		let (factory, registry, clients) = test_factory();
		let missing_secret = ProviderConfig { client_id: Some("ABC".into()), ..Default::default() };

		assert!(matches!(
			factory.build_provider_strategy("service", missing_secret),
			Err(ConfigError::MissingClientSecret)
		));
		assert!(matches!(
			factory.build_provider_strategy("bad key!", ProviderConfig::new()),
			Err(ConfigError::InvalidProviderKey(_))
		));
		assert!(registry.is_empty());
		assert!(clients.built_for().is_empty());
	}

	#[test]
	fn registry_preserves_order_and_supports_lookup() {
		let (factory, registry, _) = test_factory();
		let config = ProviderConfig::new().with_credentials("ABC", "123");

		factory
			.build_provider_strategy("alpha", config.clone())
			.expect("First provider should register.");
		factory
			.build_provider_strategy("beta", config)
			.expect("Second provider should register.");

		let keys =
			registry.bindings().iter().map(|b| b.strategy_key().to_string()).collect::<Vec<_>>();

		assert_eq!(keys, ["alpha_oauth", "beta_oauth"]);

		let alpha = ProviderKey::new("alpha").expect("Fixture key should be valid.");

		assert!(registry.get(&alpha.strategy_key()).is_some());

		registry.clear();

		assert!(registry.is_empty());
	}
}
