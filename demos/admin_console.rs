//! Demonstrates an admin console session: a rate-limited login, a burst of dashboard calls
//! that share one token refresh, and a session-expiry subscriber that reacts to logout.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use session_gate::{
	auth::LoginRequest,
	config::{SessionConfig, StorageKeys},
	http::ApiRequest,
	login::{LoginConfig, LoginGate},
	notify::SessionExpired,
	session::ReqwestSessionClient,
	store::{MemoryStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token\":\"stale-access\",\"refreshToken\":\"demo-refresh\"}");
		})
		.await;
	let expired_mock = server
		.mock_async(|when, then| {
			when.method(GET).header("authorization", "Bearer stale-access");
			then.status(401).body("{\"code\":\"TOKEN_EXPIRED\"}");
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.delay(std::time::Duration::from_millis(100))
				.header("content-type", "application/json")
				.body("{\"token\":\"fresh-access\",\"refreshToken\":\"rotated-refresh\"}");
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).header("authorization", "Bearer fresh-access");
			then.status(200).body("{\"count\":3}");
		})
		.await;
	let config = SessionConfig::builder(Url::parse(&server.base_url())?)
		.storage_keys(StorageKeys::admin())
		.build()?;
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let client = ReqwestSessionClient::new(config, store.clone());

	client.subscribe(|event: &SessionExpired| {
		println!("Redirecting to /login: {}", event.message);
	});

	let gate = LoginGate::new(LoginConfig::default(), Arc::new(client.identity_backend()), store);

	gate.login(LoginRequest::new("admin", "correct-horse")).await?;

	let (users, courses, exams) = tokio::join!(
		client.send(ApiRequest::get("/stats/users")),
		client.send(ApiRequest::get("/stats/courses")),
		client.send(ApiRequest::get("/stats/exams")),
	);

	for response in [users?, courses?, exams?] {
		println!("Dashboard widget loaded: {}.", response.text());
	}

	println!(
		"Refresh calls: {}, queued callers: {}.",
		client.refresh_metrics.attempts(),
		client.refresh_metrics.queued()
	);

	login_mock.assert_async().await;
	expired_mock.assert_calls_async(3).await;
	refresh_mock.assert_async().await;
	api_mock.assert_calls_async(3).await;

	client.logout().await?;

	Ok(())
}
