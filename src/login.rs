//! Rate-limited login route.
//!
//! [`LoginGate::login`] validates the submitted payload, draws one token from the shared
//! [`LoginRateLimiter`], asks the [`IdentityBackend`] for a token pair, and persists it.
//! Malformed payloads are rejected before the limiter is consulted and cost nothing.

// self
use crate::{
	_prelude::*,
	auth::{Credentials, LoginRequest, TokenPair},
	config::SessionConfig,
	http::{ApiRequest, HttpTransport, StatusCode},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	rate_limit::{LoginRateLimiter, RateLimitConfig, RateLimitDecision},
	session::SessionClient,
	store::TokenStore,
};

/// Boxed future returned by [`IdentityBackend::authenticate`].
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenPair>> + 'a + Send>>;

/// Verifies credentials and issues a token pair.
pub trait IdentityBackend
where
	Self: Send + Sync,
{
	/// Exchanges `credentials` for a token pair or fails with
	/// [`Error::InvalidCredentials`].
	fn authenticate<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a>;
}

/// Settings for [`LoginGate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginConfig {
	/// Bucket sizes and refill windows.
	pub rate_limit: RateLimitConfig,
	/// Message returned with [`Error::RateLimited`]; may be localized.
	pub rate_limit_message: String,
}
impl Default for LoginConfig {
	fn default() -> Self {
		Self {
			rate_limit: RateLimitConfig::default(),
			rate_limit_message: "Too many login attempts. Please try again later.".into(),
		}
	}
}

/// Login route guarded by a process-wide [`LoginRateLimiter`].
pub struct LoginGate {
	/// Shared limiter; one per process.
	pub limiter: Arc<LoginRateLimiter>,
	/// Credential verifier.
	pub backend: Arc<dyn IdentityBackend>,
	/// Store receiving the issued pair.
	pub store: Arc<dyn TokenStore>,
	message: String,
}
impl LoginGate {
	/// Creates a gate with its own limiter built from `config`.
	pub fn new(
		config: LoginConfig,
		backend: Arc<dyn IdentityBackend>,
		store: Arc<dyn TokenStore>,
	) -> Self {
		let limiter = Arc::new(LoginRateLimiter::new(config.rate_limit));

		Self::with_limiter(limiter, config.rate_limit_message, backend, store)
	}

	/// Creates a gate that shares an existing limiter.
	pub fn with_limiter(
		limiter: Arc<LoginRateLimiter>,
		rate_limit_message: impl Into<String>,
		backend: Arc<dyn IdentityBackend>,
		store: Arc<dyn TokenStore>,
	) -> Self {
		Self { limiter, backend, store, message: rate_limit_message.into() }
	}

	/// Runs one login attempt.
	pub async fn login(&self, request: LoginRequest) -> Result<TokenPair> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.attempt(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::info!(error = %_e, "login attempt rejected");

				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn attempt(&self, request: LoginRequest) -> Result<TokenPair> {
		let credentials = request.validate()?;

		if let RateLimitDecision::Delay(directive) = self.limiter.acquire() {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				retry_after_secs = directive.recommended_backoff.whole_seconds(),
				"login throttled"
			);

			return Err(Error::RateLimited {
				retry_after: directive.recommended_backoff,
				message: self.message.clone(),
			});
		}

		let pair = self.backend.authenticate(&credentials).await?;

		self.store.set(pair.clone()).await?;

		Ok(pair)
	}
}
impl Debug for LoginGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginGate")
			.field("limiter", &self.limiter)
			.field("rate_limit_message", &self.message)
			.finish()
	}
}

#[derive(Serialize)]
struct LoginBody<'a> {
	username: &'a str,
	password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
	token: String,
	#[serde(default)]
	refresh_token: Option<String>,
}

/// [`IdentityBackend`] that forwards credentials to the configured login endpoint.
pub struct HttpIdentityBackend<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	config: SessionConfig,
}
impl<T> HttpIdentityBackend<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a backend posting to `config.login_path` through `transport`.
	pub fn new(config: SessionConfig, transport: impl Into<Arc<T>>) -> Self {
		Self { transport: transport.into(), config }
	}
}
impl<T> IdentityBackend for HttpIdentityBackend<T>
where
	T: ?Sized + HttpTransport,
{
	fn authenticate<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a> {
		Box::pin(async move {
			let path = self.config.login_path.as_str();
			let url = self.config.endpoint(path)?;
			let request = ApiRequest::post(path).json(&LoginBody {
				username: credentials.username.as_ref(),
				password: credentials.password.expose(),
			})?;
			let response = self.transport.execute(url, request).await?;

			match response.status {
				status if status.is_success() => {
					let body: LoginResponse = response.json(path)?;
					let pair = match body.refresh_token.filter(|token| !token.is_empty()) {
						Some(refresh) => TokenPair::new(body.token, refresh),
						None => TokenPair::access_only(body.token),
					};

					Ok(pair)
				},
				StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::InvalidCredentials),
				StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited {
					retry_after: response.retry_after().unwrap_or(Duration::ZERO),
					message: response.text(),
				}),
				status =>
					Err(Error::UnexpectedStatus { path: path.to_owned(), status: status.as_u16() }),
			}
		})
	}
}
impl<T> Debug for HttpIdentityBackend<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpIdentityBackend").field("login_path", &self.config.login_path).finish()
	}
}
impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Identity backend that reuses this client's transport and configuration.
	pub fn identity_backend(&self) -> HttpIdentityBackend<T> {
		HttpIdentityBackend { transport: Arc::clone(&self.transport), config: self.config.clone() }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{_preludet::*, auth::CredentialError, store::MemoryStore};

	#[derive(Default)]
	struct CountingBackend {
		calls: AtomicUsize,
		reject: bool,
	}
	impl IdentityBackend for CountingBackend {
		fn authenticate<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				if self.reject {
					return Err(Error::InvalidCredentials);
				}

				Ok(TokenPair::new(format!("access-{}", credentials.username), "refresh"))
			})
		}
	}

	fn gate(backend: Arc<CountingBackend>) -> (LoginGate, MemoryStore) {
		let store = MemoryStore::default();
		let gate = LoginGate::new(LoginConfig::default(), backend, Arc::new(store.clone()));

		(gate, store)
	}

	#[tokio::test]
	async fn successful_login_persists_the_pair() {
		let backend = Arc::new(CountingBackend::default());
		let (gate, store) = gate(backend.clone());
		let pair =
			gate.login(LoginRequest::new("admin", "hunter2")).await.expect("Login should succeed.");

		assert_eq!(pair.access_token.expose(), "access-admin");
		assert_eq!(store.snapshot(), Some(pair));
		assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn invalid_payloads_do_not_consume_tokens() {
		let backend = Arc::new(CountingBackend::default());
		let (gate, _) = gate(backend.clone());

		for _ in 0..20 {
			let err = gate
				.login(LoginRequest::new("admin user", "hunter2"))
				.await
				.expect_err("Whitespace usernames must be rejected.");

			assert!(matches!(
				err,
				Error::Validation(CredentialError::ContainsWhitespace { field: "Username" })
			));
		}

		assert!(gate.limiter.can_attempt());
		assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn exhausted_limiter_short_circuits_the_backend() {
		let backend = Arc::new(CountingBackend { reject: true, ..Default::default() });
		let (gate, store) = gate(backend.clone());

		for _ in 0..14 {
			let err = gate
				.login(LoginRequest::new("admin", "wrong"))
				.await
				.expect_err("Backend rejects these credentials.");

			assert!(matches!(err, Error::InvalidCredentials));
		}

		let err = gate
			.login(LoginRequest::new("admin", "wrong"))
			.await
			.expect_err("Fifteenth attempt must be throttled.");

		match err {
			Error::RateLimited { retry_after, message } => {
				assert!(retry_after.is_positive());
				assert_eq!(message, LoginConfig::default().rate_limit_message);
			},
			other => panic!("Unexpected error: {other:?}"),
		}

		assert_eq!(backend.calls.load(Ordering::SeqCst), 14);
		assert_eq!(store.snapshot(), None);
	}

	#[tokio::test]
	async fn http_backend_maps_statuses() {
		let transport = ScriptedTransport::new(|request| {
			let body = String::from_utf8_lossy(request.body.as_deref().unwrap_or_default());

			if body.contains("\"password\":\"hunter2\"") {
				respond(StatusCode::OK, "{\"token\":\"access\",\"refreshToken\":\"refresh\"}")
			} else if body.contains("\"username\":\"legacy\"") {
				respond(StatusCode::OK, "{\"token\":\"access-only\"}")
			} else if body.contains("\"username\":\"flood\"") {
				respond(StatusCode::TOO_MANY_REQUESTS, "slow down")
			} else if body.contains("\"username\":\"broken\"") {
				respond(StatusCode::BAD_GATEWAY, "")
			} else {
				respond(StatusCode::UNAUTHORIZED, "")
			}
		});
		let backend: HttpIdentityBackend<ScriptedTransport> =
			HttpIdentityBackend::new(test_config(), transport);
		let authenticate = |username: &str, password: &str| {
			LoginRequest::new(username, password).validate().expect("Fixture should validate.")
		};
		let pair = backend
			.authenticate(&authenticate("admin", "hunter2"))
			.await
			.expect("Valid credentials should log in.");

		assert_eq!(pair, TokenPair::new("access", "refresh"));

		let pair = backend
			.authenticate(&authenticate("legacy", "pw"))
			.await
			.expect("Backends without refresh tokens are accepted.");

		assert!(!pair.can_refresh());
		assert!(matches!(
			backend.authenticate(&authenticate("admin", "wrong")).await,
			Err(Error::InvalidCredentials)
		));
		assert!(matches!(
			backend.authenticate(&authenticate("flood", "pw")).await,
			Err(Error::RateLimited { ref message, .. }) if message == "slow down"
		));
		assert!(matches!(
			backend.authenticate(&authenticate("broken", "pw")).await,
			Err(Error::UnexpectedStatus { status: 502, .. })
		));
		assert!(backend.transport.calls().iter().all(|request| request.path == "/login"));
	}
}
