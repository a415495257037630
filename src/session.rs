//! Session-aware request pipeline.
//!
//! [`SessionClient`] attaches the stored access token to every outbound call, passes
//! successful and non-auth responses through untouched, and routes HTTP 401 into the
//! single-flight [`RefreshCoordinator`]. HTTP 403 is a permission failure and never
//! triggers a refresh; a missing response is a connectivity failure.

pub mod refresh;

pub use refresh::*;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	config::SessionConfig,
	error::{AuthExpiredReason, ConfigError},
	http::{ApiRequest, ApiResponse, HeaderValue, HttpTransport, StatusCode},
	notify::{SessionExpiryHandler, SessionExpiryNotifier, SubscriptionId},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Session client type alias used by reqwest-backed consoles.
#[cfg(feature = "reqwest")]
pub type ReqwestSessionClient = SessionClient<ReqwestTransport>;

/// Authenticated API client sharing one token store, one refresh coordinator, and one
/// session-expiry notifier across every call it makes.
pub struct SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// HTTP transport used for API calls and the refresh endpoint.
	pub transport: Arc<T>,
	/// Holder of the current token pair.
	pub store: Arc<dyn TokenStore>,
	/// Endpoint, header, and storage configuration.
	pub config: SessionConfig,
	/// Observer list fired once per failed refresh batch.
	pub notifier: SessionExpiryNotifier,
	/// Counters describing refresh cycles.
	pub refresh_metrics: Arc<RefreshMetrics>,
	coordinator: Arc<RefreshCoordinator>,
}
impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that executes calls through `transport`.
	pub fn with_transport(
		config: SessionConfig,
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			config,
			notifier: SessionExpiryNotifier::default(),
			refresh_metrics: Default::default(),
			coordinator: Default::default(),
		}
	}

	/// Replaces the notifier, e.g. to share one between several clients.
	pub fn with_notifier(mut self, notifier: SessionExpiryNotifier) -> Self {
		self.notifier = notifier;

		self
	}

	/// Registers a session-expiry subscriber on this client's notifier.
	pub fn subscribe(&self, handler: impl 'static + SessionExpiryHandler) -> SubscriptionId {
		self.notifier.subscribe(handler)
	}

	/// Refresh state machine shared by every call made through this client.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	/// Returns the pair currently held by the store.
	pub async fn current_tokens(&self) -> Result<Option<TokenPair>> {
		Ok(self.store.get().await?)
	}

	/// Ends the session locally by clearing both token slots.
	pub async fn logout(&self) -> Result<()> {
		self.store.clear().await?;

		#[cfg(feature = "tracing")]
		tracing::info!("session cleared by logout");

		Ok(())
	}

	/// Dispatches `request` with the current access token.
	///
	/// Returns the response for any status other than 401 and 403, including 5xx. A 401 is
	/// recovered through [`handle_unauthorized`](Self::handle_unauthorized) and the replayed
	/// response is returned instead.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span =
			FlowSpan::request("send", request.method.as_str(), &request.path, request.is_retried());

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Sends `request` and decodes a 2xx JSON body into `R`.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let path = request.path.clone();
		let response = self.send(request).await?;

		if !response.is_success() {
			return Err(Error::UnexpectedStatus { path, status: response.status.as_u16() });
		}

		response.json(&path)
	}

	async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
		let access_token = self.store.get().await?.map(|pair| pair.access_token);
		let response = self.execute(&request, access_token.as_ref()).await?;

		match classify(&request, response)? {
			Classified::Pass(response) => Ok(response),
			Classified::Unauthorized(response) => {
				#[cfg(feature = "tracing")]
				tracing::debug!(
					path = %request.path,
					token_expired = response.is_token_expired(),
					"unauthorized response; starting refresh"
				);
				#[cfg(not(feature = "tracing"))]
				let _ = response;

				self.handle_unauthorized(request).await
			},
		}
	}

	/// Executes a request released by a refresh cycle, exactly once.
	pub(crate) async fn replay(&self, ticket: ReplayTicket) -> Result<ApiResponse> {
		let ReplayTicket { request, access_token } = ticket;
		let span =
			FlowSpan::request("replay", request.method.as_str(), &request.path, request.is_retried());
		let response = span.instrument(self.execute(&request, Some(&access_token))).await?;

		match classify(&request, response)? {
			Classified::Pass(response) => Ok(response),
			Classified::Unauthorized(_) =>
				Err(Error::AuthExpired(AuthExpiredReason::AlreadyRetried)),
		}
	}

	async fn execute(
		&self,
		request: &ApiRequest,
		access_token: Option<&TokenSecret>,
	) -> Result<ApiResponse> {
		let url = self.config.endpoint(&request.path)?;
		let header = self.config.auth_header_name()?;
		let mut outbound = request.clone();

		match access_token.filter(|token| !token.is_empty()) {
			Some(token) => {
				let mut value = HeaderValue::from_str(&self.config.auth_value(token.expose()))
					.map_err(|_| ConfigError::InvalidHeader {
						name: self.config.auth_header.clone(),
					})?;

				value.set_sensitive(true);
				outbound.headers.insert(header, value);
			},
			None => {
				outbound.headers.remove(&header);
			},
		}

		Ok(self.transport.execute(url, outbound).await?)
	}
}
#[cfg(feature = "reqwest")]
impl SessionClient<ReqwestTransport> {
	/// Creates a client backed by a default reqwest transport.
	pub fn new(config: SessionConfig, store: Arc<dyn TokenStore>) -> Self {
		Self::with_transport(config, store, ReqwestTransport::default())
	}
}
impl<T> Clone for SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			store: Arc::clone(&self.store),
			config: self.config.clone(),
			notifier: self.notifier.clone(),
			refresh_metrics: Arc::clone(&self.refresh_metrics),
			coordinator: Arc::clone(&self.coordinator),
		}
	}
}
impl<T> Debug for SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.field("notifier", &self.notifier)
			.finish()
	}
}

enum Classified {
	Pass(ApiResponse),
	Unauthorized(ApiResponse),
}

fn classify(request: &ApiRequest, response: ApiResponse) -> Result<Classified> {
	match response.status {
		StatusCode::FORBIDDEN => Err(Error::Permission { path: request.path.clone() }),
		StatusCode::UNAUTHORIZED if request.is_retried() =>
			Err(Error::AuthExpired(AuthExpiredReason::AlreadyRetried)),
		StatusCode::UNAUTHORIZED => Ok(Classified::Unauthorized(response)),
		_ => Ok(Classified::Pass(response)),
	}
}
