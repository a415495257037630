//! Session control layer for admin consoles: single-flight token refresh, a replaying
//! request pipeline, session-expiry notifications, and dual-window login throttling.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod login;
pub mod notify;
pub mod obs;
pub mod rate_limit;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::SessionConfig,
		error::TransportError,
		http::{ApiRequest, ApiResponse, HttpTransport, StatusCode, TransportFuture},
		session::SessionClient,
		store::{MemoryStore, TokenStore},
	};

	type Responder = dyn Fn(&ApiRequest) -> TransportFuture<'static> + Send + Sync;

	/// In-process transport that records every request and answers through a closure.
	pub struct ScriptedTransport {
		calls: Mutex<Vec<ApiRequest>>,
		responder: Box<Responder>,
	}
	impl ScriptedTransport {
		/// Creates a transport answering every request with `responder`.
		pub fn new<F>(responder: F) -> Self
		where
			F: 'static + Fn(&ApiRequest) -> TransportFuture<'static> + Send + Sync,
		{
			Self { calls: Mutex::new(Vec::new()), responder: Box::new(responder) }
		}

		/// Every request received so far, in arrival order.
		pub fn calls(&self) -> Vec<ApiRequest> {
			self.calls.lock().clone()
		}

		/// Number of requests received for `path`.
		pub fn calls_to(&self, path: &str) -> usize {
			self.calls.lock().iter().filter(|request| request.path == path).count()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, _url: Url, request: ApiRequest) -> TransportFuture<'_> {
			self.calls.lock().push(request.clone());

			(self.responder)(&request)
		}
	}

	/// Ready future resolving to a response with `status` and `body`.
	pub fn respond(status: StatusCode, body: impl Into<Vec<u8>>) -> TransportFuture<'static> {
		let response = ApiResponse::new(status, body);

		Box::pin(async move { Ok(response) })
	}

	/// Ready future resolving to a connection failure for `path`.
	pub fn refuse(path: &str) -> TransportFuture<'static> {
		let error = TransportError::network(
			path,
			std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
		);

		Box::pin(async move { Err(error) })
	}

	/// Returns the value of the `authorization` header, if present.
	pub fn bearer(request: &ApiRequest) -> Option<&str> {
		request.headers.get("authorization").and_then(|value| value.to_str().ok())
	}

	/// Default configuration rooted at `https://console.test/api`.
	pub fn test_config() -> SessionConfig {
		let base = Url::parse("https://console.test/api").expect("Test base URL should parse.");

		SessionConfig::builder(base).build().expect("Default test configuration should validate.")
	}

	/// Builds a client over `transport` with an in-memory store seeded with `access`/`refresh`.
	pub fn build_test_client(
		transport: ScriptedTransport,
		access: &str,
		refresh: Option<&str>,
	) -> (SessionClient<ScriptedTransport>, MemoryStore) {
		let pair = match refresh {
			Some(refresh) => crate::auth::TokenPair::new(access, refresh),
			None => crate::auth::TokenPair::access_only(access),
		};
		let backend = MemoryStore::with_pair(pair);
		let store: Arc<dyn TokenStore> = Arc::new(backend.clone());

		(SessionClient::with_transport(test_config(), store, transport), backend)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
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
#[cfg(test)] use {color_eyre as _, httpmock as _};
