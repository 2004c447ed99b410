#![cfg(feature = "test")]

// self
use oauth2_gate::{
	_preludet::*,
	auth::{StoredToken, TokenGrant},
	error::Error,
	obs::AuthStage,
	provider::{ClientOptions, IdentitySource, ProviderConfig},
	resolver::ResolverRegistry,
	store::{MemoryCookieJar, MemorySession},
	strategy::{
		AuthDecision, AuthOutcome, CALLBACK_PARAM, FailureKind, PROVIDER_PARAM, RequestContext,
		STATE_PARAM, StrategyFactory, StrategyRegistry,
	},
};

const ACCESS_TOKEN: &str = "SylltB94pocC6hex8kr9";

struct Rig {
	client: Arc<StubTokenClient>,
	resolvers: Arc<ResolverRegistry<String>>,
	registry: Arc<StrategyRegistry<String>>,
}

fn build_rig(config: ProviderConfig) -> Rig {
	let client = Arc::new(StubTokenClient::new());
	let resolvers = Arc::new(ResolverRegistry::new());
	let registry = Arc::new(StrategyRegistry::new());
	let factory = StrategyFactory::new(
		Arc::new(StubClientFactory::new(client.clone())),
		resolvers.clone(),
		registry.clone(),
	);

	factory
		.build_provider_strategy("service", config)
		.expect("Provider registration should succeed.");
	resolvers
		.register_fn("service", |identity| Some(identity.as_str().to_owned()))
		.expect("Resolver registration should succeed.");

	Rig { client, resolvers, registry }
}

fn credentials() -> ProviderConfig {
	ProviderConfig::new().with_credentials("ABC", "123")
}

fn site() -> Url {
	"http://service.com".parse().expect("Fixture site URL should parse.")
}

async fn start_flow(
	rig: &Rig,
	session: &Arc<MemorySession>,
	cookies: &Arc<MemoryCookieJar>,
) -> String {
	let ctx = RequestContext::new(session.clone(), cookies.clone())
		.with_param(PROVIDER_PARAM, "service");
	let decision = rig.registry.authenticate(&ctx).await.expect("Initiation should not error.");
	let AuthDecision::Redirect(url) = decision else {
		panic!("Initiation should redirect, got {decision:?}.");
	};

	url.query_pairs()
		.find_map(|(key, value)| (key == "state").then(|| value.into_owned()))
		.expect("Redirect should carry the state parameter.")
}

async fn establish_session(
	rig: &Rig,
	session: &Arc<MemorySession>,
	cookies: &Arc<MemoryCookieJar>,
	grant: TokenGrant,
) {
	let state = start_flow(rig, session, cookies).await;

	rig.client.script_exchange(GrantScript::Grant(grant));

	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, state);
	let decision =
		rig.registry.authenticate(&callback).await.expect("Callback should not error.");

	assert!(
		matches!(decision, AuthDecision::Outcome(AuthOutcome::Success(_))),
		"Callback should conclude with a success.",
	);
}

#[tokio::test]
async fn full_dance_initiates_exchanges_and_resumes() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();
	let state = start_flow(&rig, &session, &cookies).await;
	let binding = rig.registry.bindings().into_iter().next().expect("One binding should exist.");
	let setup = binding.strategy(RequestContext::new(session.clone(), cookies.clone()));
	let pending = setup
		.store()
		.peek_pending()
		.await
		.expect("Peeking must succeed.")
		.expect("Initiation should record a pending marker.");

	assert_eq!(pending.strategy_key, "service_oauth");
	assert_eq!(pending.state.as_deref(), Some(state.as_str()));

	rig.client.script_exchange(GrantScript::Grant(TokenGrant::new(ACCESS_TOKEN)));

	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, state);
	let decision =
		rig.registry.authenticate(&callback).await.expect("Callback should not error.");
	let AuthDecision::Outcome(AuthOutcome::Success(user)) = decision else {
		panic!("Callback should resolve the user, got {decision:?}.");
	};

	assert_eq!(user, ACCESS_TOKEN);
	assert_eq!(rig.client.exchanged_codes(), ["auth-code-1"]);
	// The access-token identity mode trusts the fresh grant without a probe.
	assert!(rig.client.authenticated_requests().is_empty());

	rig.client.script_get(BodyScript::Body("{}".into()));

	let resume = RequestContext::new(session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");
	let AuthDecision::Outcome(AuthOutcome::Success(user)) = decision else {
		panic!("Resumption should resolve the user, got {decision:?}.");
	};

	assert_eq!(user, ACCESS_TOKEN);
	assert_eq!(
		rig.client.authenticated_requests(),
		[(ACCESS_TOKEN.into(), "/oauth/authorize".into())],
	);
}

#[tokio::test]
async fn callback_state_mismatch_fails_before_the_exchange() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();
	let _ = start_flow(&rig, &session, &cookies).await;
	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, "forged");
	let decision =
		rig.registry.authenticate(&callback).await.expect("Callback should not error.");
	let AuthDecision::Outcome(AuthOutcome::Fail(failure)) = decision else {
		panic!("A forged state should fail, got {decision:?}.");
	};

	assert_eq!(failure.kind, FailureKind::StateMismatch);
	assert_eq!(failure.context.provider().as_ref(), "service");
	assert!(rig.client.exchanged_codes().is_empty(), "The code must not be exchanged.");

	// The marker was consumed, so a replayed callback no longer matches.
	let replay = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, "forged");

	assert!(matches!(
		rig.registry.authenticate(&replay).await.expect("Replay should not error."),
		AuthDecision::Continue
	));
}

#[tokio::test]
async fn callback_without_a_marker_is_not_applicable() {
	let rig = build_rig(credentials());
	let (ctx, _, _) = memory_context();
	let callback = ctx.with_param(CALLBACK_PARAM, "auth-code-1");

	assert!(matches!(
		rig.registry.authenticate(&callback).await.expect("Dispatch should not error."),
		AuthDecision::Continue
	));
	assert!(rig.client.exchanged_codes().is_empty());
}

#[tokio::test]
async fn rejected_exchange_fails_without_persisting_a_token() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();
	let state = start_flow(&rig, &session, &cookies).await;

	rig.client.script_exchange(GrantScript::Denied("authorization code expired".into()));

	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, state);
	let decision =
		rig.registry.authenticate(&callback).await.expect("Callback should not error.");
	let AuthDecision::Outcome(AuthOutcome::Fail(failure)) = decision else {
		panic!("A rejected exchange should fail, got {decision:?}.");
	};

	assert_eq!(failure.kind, FailureKind::ExchangeRejected);
	assert!(failure.message.contains("authorization code expired"));

	// Nothing was persisted, so the next bare request matches no stage.
	let resume = RequestContext::new(session.clone(), cookies.clone());

	assert!(matches!(
		rig.registry.authenticate(&resume).await.expect("Dispatch should not error."),
		AuthDecision::Continue
	));
}

#[tokio::test]
async fn resumption_refreshes_a_rejected_token_and_keeps_the_unrotated_refresh_token() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();

	establish_session(
		&rig,
		&session,
		&cookies,
		TokenGrant::new(ACCESS_TOKEN).with_refresh_token("refresh-1"),
	)
	.await;

	// The probe rejects the stored token; the refresh grant rotates the
	// access token but not the refresh token.
	rig.client.script_get(BodyScript::Denied("token expired".into()));
	rig.client.script_refresh(GrantScript::Grant(TokenGrant::new("access-2")));

	let resume = RequestContext::new(session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");
	let AuthDecision::Outcome(AuthOutcome::Success(user)) = decision else {
		panic!("A refreshed resumption should resolve the user, got {decision:?}.");
	};

	assert_eq!(user, "access-2");
	assert_eq!(rig.client.refreshed_tokens(), ["refresh-1"]);

	// The unrotated refresh token survived and is presented again on the
	// next rejection.
	rig.client.script_get(BodyScript::Denied("token expired".into()));
	rig.client.script_refresh(GrantScript::Grant(TokenGrant::new("access-3")));

	let resume = RequestContext::new(session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");
	let AuthDecision::Outcome(AuthOutcome::Success(user)) = decision else {
		panic!("The second refresh should also succeed, got {decision:?}.");
	};

	assert_eq!(user, "access-3");
	assert_eq!(rig.client.refreshed_tokens(), ["refresh-1", "refresh-1"]);
}

#[tokio::test]
async fn unrefreshable_rejection_clears_the_stored_token() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();

	establish_session(&rig, &session, &cookies, TokenGrant::new(ACCESS_TOKEN)).await;
	rig.client.script_get(BodyScript::Denied("token revoked".into()));

	let resume = RequestContext::new(session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");
	let AuthDecision::Outcome(AuthOutcome::Fail(failure)) = decision else {
		panic!("An unrefreshable token should fail, got {decision:?}.");
	};

	assert_eq!(failure.kind, FailureKind::RefreshFailed);
	assert_eq!(
		failure.context.access_token().map(|token| token.expose()),
		Some(ACCESS_TOKEN),
		"The failure context should carry the rejected token.",
	);
	assert!(rig.client.refreshed_tokens().is_empty());

	// The store was cleared, so the next bare request matches no stage.
	let resume = RequestContext::new(session.clone(), cookies.clone());

	assert!(matches!(
		rig.registry.authenticate(&resume).await.expect("Dispatch should not error."),
		AuthDecision::Continue
	));
}

#[tokio::test]
async fn rejected_refresh_clears_the_stored_token() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();

	establish_session(
		&rig,
		&session,
		&cookies,
		TokenGrant::new(ACCESS_TOKEN).with_refresh_token("refresh-1"),
	)
	.await;
	rig.client.script_get(BodyScript::Denied("token expired".into()));
	rig.client.script_refresh(GrantScript::Denied("refresh token revoked".into()));

	let resume = RequestContext::new(session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");
	let AuthDecision::Outcome(AuthOutcome::Fail(failure)) = decision else {
		panic!("A rejected refresh should fail, got {decision:?}.");
	};

	assert_eq!(failure.kind, FailureKind::RefreshFailed);
	assert!(failure.message.contains("refresh token revoked"));

	let resume = RequestContext::new(session.clone(), cookies.clone());

	assert!(matches!(
		rig.registry.authenticate(&resume).await.expect("Dispatch should not error."),
		AuthDecision::Continue
	));
}

#[tokio::test]
async fn provider_outages_fail_without_clearing_the_token() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();

	establish_session(&rig, &session, &cookies, TokenGrant::new(ACCESS_TOKEN)).await;
	rig.client.script_get(BodyScript::Unreachable("connection reset".into()));

	let resume = RequestContext::new(session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");
	let AuthDecision::Outcome(AuthOutcome::Fail(failure)) = decision else {
		panic!("An unreachable provider should fail, got {decision:?}.");
	};

	assert_eq!(failure.kind, FailureKind::ProviderError);

	// The token survived the outage; the next successful probe resumes the
	// session.
	rig.client.script_get(BodyScript::Body("{}".into()));

	let resume = RequestContext::new(session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");

	assert!(matches!(decision, AuthDecision::Outcome(AuthOutcome::Success(_))));
}

#[tokio::test]
async fn whoami_identities_extract_dotted_fields() {
	let config = credentials()
		.with_options(ClientOptions::new(site()).with_whoami_path("/api/me"))
		.with_identity_source(IdentitySource::WhoamiField { field: "data.user.id".into() });
	let rig = build_rig(config);
	let (_, session, cookies) = memory_context();
	let state = start_flow(&rig, &session, &cookies).await;

	rig.client.script_exchange(GrantScript::Grant(TokenGrant::new(ACCESS_TOKEN)));
	rig.client.script_get(BodyScript::Body(r#"{"data":{"user":{"id":42}}}"#.into()));

	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, state);
	let decision =
		rig.registry.authenticate(&callback).await.expect("Callback should not error.");
	let AuthDecision::Outcome(AuthOutcome::Success(user)) = decision else {
		panic!("Whoami callback should resolve the user, got {decision:?}.");
	};

	assert_eq!(user, "42");
	assert_eq!(rig.client.authenticated_requests(), [(ACCESS_TOKEN.into(), "/api/me".into())]);
}

#[tokio::test]
async fn missing_whoami_fields_fail_identity_extraction() {
	let config = credentials()
		.with_options(ClientOptions::new(site()).with_whoami_path("/api/me"))
		.with_identity_source(IdentitySource::WhoamiField { field: "data.user.id".into() });
	let rig = build_rig(config);
	let (_, session, cookies) = memory_context();
	let state = start_flow(&rig, &session, &cookies).await;

	rig.client.script_exchange(GrantScript::Grant(TokenGrant::new(ACCESS_TOKEN)));
	rig.client.script_get(BodyScript::Body(r#"{"data":{}}"#.into()));

	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, state);
	let decision =
		rig.registry.authenticate(&callback).await.expect("Callback should not error.");
	let AuthDecision::Outcome(AuthOutcome::Fail(failure)) = decision else {
		panic!("A missing whoami field should fail, got {decision:?}.");
	};

	assert_eq!(failure.kind, FailureKind::IdentityExtraction);
	assert!(failure.message.contains("data.user.id"));
}

#[tokio::test]
async fn unmapped_identities_fail_with_the_full_context() {
	let rig = build_rig(credentials());

	rig.resolvers.clear();
	rig.resolvers
		.register_fn("service", |_| None::<String>)
		.expect("Resolver registration should succeed.");

	let (_, session, cookies) = memory_context();
	let state = start_flow(&rig, &session, &cookies).await;

	rig.client.script_exchange(GrantScript::Grant(TokenGrant::new(ACCESS_TOKEN)));

	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, state);
	let decision =
		rig.registry.authenticate(&callback).await.expect("Callback should not error.");
	let AuthDecision::Outcome(AuthOutcome::Fail(failure)) = decision else {
		panic!("An unmapped identity should fail, got {decision:?}.");
	};

	assert_eq!(failure.kind, FailureKind::UserNotFound);
	assert_eq!(failure.context.provider().as_ref(), "service");
	assert_eq!(failure.context.strategy_key().as_ref(), "service_oauth");
	assert_eq!(failure.context.access_token().map(|token| token.expose()), Some(ACCESS_TOKEN));
	assert_eq!(failure.context.client_id(), Some("ABC"));
	assert_eq!(failure.context.client_secret().map(|secret| secret.expose()), Some("123"));
}

#[tokio::test]
async fn missing_resolvers_surface_a_wiring_error() {
	let rig = build_rig(credentials());

	rig.resolvers.clear();

	let (_, session, cookies) = memory_context();
	let state = start_flow(&rig, &session, &cookies).await;

	rig.client.script_exchange(GrantScript::Grant(TokenGrant::new(ACCESS_TOKEN)));

	let callback = RequestContext::new(session.clone(), cookies.clone())
		.with_param(CALLBACK_PARAM, "auth-code-1")
		.with_param(STATE_PARAM, state);
	let err = rig
		.registry
		.authenticate(&callback)
		.await
		.expect_err("A missing resolver should abort the request.");

	assert!(matches!(err, Error::Resolver(_)));
	assert!(err.to_string().contains("`service`"), "Diagnostic should name the provider: {err}");
}

#[tokio::test]
async fn initiation_with_a_live_token_resumes_the_session() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();

	establish_session(&rig, &session, &cookies, TokenGrant::new(ACCESS_TOKEN)).await;
	rig.client.script_get(BodyScript::Body("{}".into()));

	let again = RequestContext::new(session.clone(), cookies.clone())
		.with_param(PROVIDER_PARAM, "service");
	let decision =
		rig.registry.authenticate(&again).await.expect("Initiation should not error.");

	assert!(
		matches!(decision, AuthDecision::Outcome(AuthOutcome::Success(_))),
		"A live session should not bounce back to the provider.",
	);
}

#[tokio::test]
async fn initiation_with_a_dead_token_restarts_the_dance() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();

	establish_session(&rig, &session, &cookies, TokenGrant::new(ACCESS_TOKEN)).await;
	rig.client.script_get(BodyScript::Denied("token revoked".into()));

	let again = RequestContext::new(session.clone(), cookies.clone())
		.with_param(PROVIDER_PARAM, "service");
	let decision =
		rig.registry.authenticate(&again).await.expect("Initiation should not error.");

	assert!(
		matches!(decision, AuthDecision::Redirect(_)),
		"A dead token should restart the dance.",
	);
}

#[tokio::test]
async fn cookie_mirrors_restore_a_lost_session() {
	let rig = build_rig(credentials().with_cookie_ttl(Duration::days(30)));
	let (_, session, cookies) = memory_context();

	establish_session(&rig, &session, &cookies, TokenGrant::new(ACCESS_TOKEN)).await;

	// The browser session is gone; only the cookie survives.
	let fresh_session = Arc::new(MemorySession::default());

	rig.client.script_get(BodyScript::Body("{}".into()));

	let resume = RequestContext::new(fresh_session.clone(), cookies.clone());
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");

	assert!(matches!(decision, AuthDecision::Outcome(AuthOutcome::Success(_))));

	// Promotion copied the token into the new session, so the cookie is no
	// longer needed.
	let bare_cookies = Arc::new(MemoryCookieJar::default());

	rig.client.script_get(BodyScript::Body("{}".into()));

	let resume = RequestContext::new(fresh_session.clone(), bare_cookies);
	let decision =
		rig.registry.authenticate(&resume).await.expect("Resumption should not error.");

	assert!(matches!(decision, AuthDecision::Outcome(AuthOutcome::Success(_))));
}

#[tokio::test]
async fn initiation_takes_precedence_over_the_callback_shape() {
	let rig = build_rig(credentials());
	let (_, session, cookies) = memory_context();

	establish_session(&rig, &session, &cookies, TokenGrant::new(ACCESS_TOKEN)).await;

	let mixed = RequestContext::new(session.clone(), cookies.clone())
		.with_param(PROVIDER_PARAM, "service")
		.with_param(CALLBACK_PARAM, "auth-code-9");
	let binding = rig.registry.bindings().into_iter().next().expect("One binding should exist.");
	let stage = binding
		.strategy(mixed.clone())
		.stage()
		.await
		.expect("Stage detection should not error.");

	assert_eq!(stage, Some(AuthStage::Initiate));

	rig.client.script_get(BodyScript::Body("{}".into()));

	let decision = rig.registry.authenticate(&mixed).await.expect("Dispatch should not error.");

	assert!(matches!(decision, AuthDecision::Outcome(AuthOutcome::Success(_))));
	// Only the session establishment exchanged a code; the mixed request
	// resumed instead of exchanging `auth-code-9`.
	assert_eq!(rig.client.exchanged_codes(), ["auth-code-1"]);
}

#[tokio::test]
async fn stage_detection_covers_every_request_shape() {
	let rig = build_rig(credentials());
	let binding = rig.registry.bindings().into_iter().next().expect("One binding should exist.");

	// {initiation param, callback param, own pending marker, stored token} in
	// every combination.
	for (initiation, callback, marker, token, expected) in [
		(false, false, false, false, None),
		(false, false, false, true, Some(AuthStage::Resume)),
		(false, false, true, false, None),
		(false, false, true, true, Some(AuthStage::Resume)),
		(false, true, false, false, None),
		(false, true, false, true, None),
		(false, true, true, false, Some(AuthStage::Callback)),
		(false, true, true, true, Some(AuthStage::Callback)),
		(true, false, false, false, Some(AuthStage::Initiate)),
		(true, false, false, true, Some(AuthStage::Initiate)),
		(true, false, true, false, Some(AuthStage::Initiate)),
		(true, false, true, true, Some(AuthStage::Initiate)),
		(true, true, false, false, Some(AuthStage::Initiate)),
		(true, true, false, true, Some(AuthStage::Initiate)),
		(true, true, true, false, Some(AuthStage::Initiate)),
		(true, true, true, true, Some(AuthStage::Initiate)),
	] {
		let (_, session, cookies) = memory_context();
		let setup = binding.strategy(RequestContext::new(session.clone(), cookies.clone()));

		if marker {
			setup.store().mark_pending("st-row").await.expect("Marking must succeed.");
		}
		if token {
			setup
				.store()
				.persist(&StoredToken::new("tok-row"))
				.await
				.expect("Persisting must succeed.");
		}

		let mut ctx = RequestContext::new(session.clone(), cookies.clone());

		if initiation {
			ctx = ctx.with_param(PROVIDER_PARAM, "service");
		}
		if callback {
			ctx = ctx.with_param(CALLBACK_PARAM, "code-row");
		}

		let stage =
			binding.strategy(ctx).stage().await.expect("Stage detection should not error.");

		assert_eq!(
			stage, expected,
			"Shape (initiation: {initiation}, callback: {callback}, marker: {marker}, \
			 token: {token}) should stage as {expected:?}.",
		);
	}
}
