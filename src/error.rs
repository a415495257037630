//! Session-level error types shared by the pipeline, coordinator, stores, and login gate.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical session error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No response was received (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Connectivity(#[from] TransportError),
	/// A response body did not match the expected JSON shape.
	#[error("Response body from `{path}` did not match the expected shape.")]
	Decode {
		/// Request path whose response failed to decode.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Login credentials failed local validation.
	#[error(transparent)]
	Validation(#[from] crate::auth::CredentialError),

	/// The session could not be renewed and the user must sign in again.
	#[error("Session expired: {0}.")]
	AuthExpired(AuthExpiredReason),
	/// The backend refused the request (HTTP 403).
	#[error("Permission denied for `{path}`.")]
	Permission {
		/// Request path that was refused.
		path: String,
	},
	/// Login attempts exhausted both rate-limit windows.
	#[error("{message}")]
	RateLimited {
		/// Time until the next attempt is permitted.
		retry_after: Duration,
		/// Caller-facing (localizable) message.
		message: String,
	},
	/// The identity backend rejected the supplied credentials.
	#[error("Invalid username or password.")]
	InvalidCredentials,
	/// A response carried a status the caller cannot interpret.
	#[error("Unexpected HTTP {status} from `{path}`.")]
	UnexpectedStatus {
		/// Request path that produced the response.
		path: String,
		/// HTTP status code.
		status: u16,
	},
}
impl Error {
	/// Returns `true` for errors that end the session and trigger a logout.
	pub fn is_auth_expired(&self) -> bool {
		matches!(self, Self::AuthExpired(_))
	}
}

/// Why an unauthorized response could not be recovered by a refresh.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthExpiredReason {
	/// The store held no refresh token, so no refresh was attempted.
	#[error("no refresh token is available")]
	MissingRefreshToken,
	/// The refresh call failed (transport error, non-2xx status, or malformed body).
	#[error("token refresh failed: {message}")]
	RefreshFailed {
		/// HTTP status of the refresh response, when one was received.
		status: Option<u16>,
		/// Summary of the failure.
		message: String,
	},
	/// The request was already replayed once and was rejected again.
	#[error("request was rejected after a token refresh")]
	AlreadyRetried,
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Session configuration failed validation.
	#[error(transparent)]
	Session(#[from] crate::config::SessionConfigError),
	/// Request path could not be joined onto the base URL.
	#[error("Request path `{path}` cannot be joined onto the base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header name or value is not valid HTTP.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Header name as supplied.
		name: String,
	},
	/// A request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Serialize(#[from] serde_json::Error),
}

/// Transport-level failures (no response object was produced).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling `{path}`.")]
	Network {
		/// Request path that failed.
		path: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete before the transport's deadline.
	#[error("Request to `{path}` timed out.")]
	Timeout {
		/// Request path that timed out.
		path: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		path: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { path: path.into(), source: Box::new(src) }
	}
}
