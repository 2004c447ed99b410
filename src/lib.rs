//! Provider-pluggable OAuth 2.0 authentication engine: declarative provider
//! registration, three-outcome request strategies, session/cookie token
//! persistence, and app-defined user resolution in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod error;
pub mod obs;
pub mod provider;
pub mod resolver;
pub mod store;
pub mod strategy;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience stubs and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		auth::TokenGrant,
		client::{ClientFuture, TokenClient, TokenClientError, TokenClientFactory},
		error::ConfigError,
		provider::ProviderConfig,
		store::{MemoryCookieJar, MemorySession},
		strategy::RequestContext,
	};

	/// Scripted reply for one stubbed exchange or refresh call.
	#[derive(Clone, Debug)]
	pub enum GrantScript {
		/// Succeed with this grant.
		Grant(TokenGrant),
		/// Fail with an access denial carrying this reason.
		Denied(String),
		/// Fail with a transport-style error carrying this message.
		Unreachable(String),
	}

	/// Scripted reply for one stubbed authenticated GET.
	#[derive(Clone, Debug)]
	pub enum BodyScript {
		/// Succeed with this response body.
		Body(String),
		/// Fail with an access denial carrying this reason.
		Denied(String),
		/// Fail with a transport-style error carrying this message.
		Unreachable(String),
	}

	/// Scriptable [`TokenClient`] answering every wire call with canned replies.
	///
	/// Replies queue per operation and pop in call order; an exhausted queue panics, so tests
	/// fail loudly when the engine makes a call they did not script.
	#[derive(Debug)]
	pub struct StubTokenClient {
		authorize_url: Url,
		exchanges: Mutex<VecDeque<GrantScript>>,
		refreshes: Mutex<VecDeque<GrantScript>>,
		gets: Mutex<VecDeque<BodyScript>>,
		exchanged: Mutex<Vec<String>>,
		refreshed: Mutex<Vec<String>>,
		requested: Mutex<Vec<(String, String)>>,
	}
	impl StubTokenClient {
		/// Creates a stub with every script queue empty.
		pub fn new() -> Self {
			Self {
				authorize_url: "https://provider.test/oauth/authorize"
					.parse()
					.expect("Stub authorize URL should parse."),
				exchanges: Mutex::new(VecDeque::new()),
				refreshes: Mutex::new(VecDeque::new()),
				gets: Mutex::new(VecDeque::new()),
				exchanged: Mutex::new(Vec::new()),
				refreshed: Mutex::new(Vec::new()),
				requested: Mutex::new(Vec::new()),
			}
		}

		/// Queues the reply for the next exchange call.
		pub fn script_exchange(&self, script: GrantScript) {
			self.exchanges.lock().push_back(script);
		}

		/// Queues the reply for the next refresh call.
		pub fn script_refresh(&self, script: GrantScript) {
			self.refreshes.lock().push_back(script);
		}

		/// Queues the reply for the next authenticated GET.
		pub fn script_get(&self, script: BodyScript) {
			self.gets.lock().push_back(script);
		}

		/// Codes the engine exchanged, in call order.
		pub fn exchanged_codes(&self) -> Vec<String> {
			self.exchanged.lock().clone()
		}

		/// Refresh tokens the engine presented, in call order.
		pub fn refreshed_tokens(&self) -> Vec<String> {
			self.refreshed.lock().clone()
		}

		/// `(access_token, path)` pairs of every authenticated GET, in call order.
		pub fn authenticated_requests(&self) -> Vec<(String, String)> {
			self.requested.lock().clone()
		}
	}
	impl Default for StubTokenClient {
		fn default() -> Self {
			Self::new()
		}
	}
	impl TokenClient for StubTokenClient {
		fn build_authorize_url(&self, state: Option<&str>) -> Url {
			let mut url = self.authorize_url.clone();

			if let Some(state) = state {
				url.query_pairs_mut().append_pair("state", state);
			}

			url
		}

		fn exchange<'a>(&'a self, code: &'a str) -> ClientFuture<'a, TokenGrant> {
			self.exchanged.lock().push(code.to_owned());

			let script = self.exchanges.lock().pop_front();

			Box::pin(async move { grant_reply(script, || format!("exchange of `{code}`")) })
		}

		fn authenticated_get<'a>(
			&'a self,
			access_token: &'a str,
			path: &'a str,
		) -> ClientFuture<'a, String> {
			self.requested.lock().push((access_token.to_owned(), path.to_owned()));

			let script = self.gets.lock().pop_front();

			Box::pin(async move {
				match script {
					Some(BodyScript::Body(body)) => Ok(body),
					Some(BodyScript::Denied(reason)) =>
						Err(TokenClientError::AccessDenied { reason }),
					Some(BodyScript::Unreachable(message)) =>
						Err(TokenClientError::Unexpected { message, status: None }),
					None => panic!("Unscripted authenticated GET for `{path}`."),
				}
			})
		}

		fn refresh<'a>(&'a self, refresh_token: &'a str) -> ClientFuture<'a, TokenGrant> {
			self.refreshed.lock().push(refresh_token.to_owned());

			let script = self.refreshes.lock().pop_front();

			Box::pin(async move { grant_reply(script, || format!("refresh of `{refresh_token}`")) })
		}
	}

	/// [`TokenClientFactory`] handing every provider the same stub client.
	#[derive(Debug)]
	pub struct StubClientFactory {
		client: Arc<StubTokenClient>,
		built: Mutex<Vec<String>>,
	}
	impl StubClientFactory {
		/// Creates a factory that always returns `client`.
		pub fn new(client: Arc<StubTokenClient>) -> Self {
			Self { client, built: Mutex::new(Vec::new()) }
		}

		/// Provider names a client was built for, in registration order.
		pub fn built_for(&self) -> Vec<String> {
			self.built.lock().clone()
		}
	}
	impl TokenClientFactory for StubClientFactory {
		fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn TokenClient>, ConfigError> {
			let provider =
				config.provider_name.as_ref().map(ToString::to_string).unwrap_or_default();

			self.built.lock().push(provider);

			Ok(self.client.clone())
		}
	}

	/// Fresh request context over in-memory stores, plus the raw handles for seeding and
	/// inspection.
	pub fn memory_context() -> (RequestContext, Arc<MemorySession>, Arc<MemoryCookieJar>) {
		let session = Arc::new(MemorySession::default());
		let cookies = Arc::new(MemoryCookieJar::default());

		(RequestContext::new(session.clone(), cookies.clone()), session, cookies)
	}

	fn grant_reply(
		script: Option<GrantScript>,
		call: impl FnOnce() -> String,
	) -> Result<TokenGrant, TokenClientError> {
		match script {
			Some(GrantScript::Grant(grant)) => Ok(grant),
			Some(GrantScript::Denied(reason)) => Err(TokenClientError::AccessDenied { reason }),
			Some(GrantScript::Unreachable(message)) =>
				Err(TokenClientError::Unexpected { message, status: None }),
			None => panic!("Unscripted {}.", call()),
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
