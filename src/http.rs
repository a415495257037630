//! Transport primitives for session-aware API calls.
//!
//! The module exposes [`HttpTransport`] alongside the transport-neutral [`ApiRequest`] and
//! [`ApiResponse`] values so downstream crates can plug in custom HTTP stacks. A transport
//! only moves bytes: it never inspects status codes, attaches credentials, or retries. Those
//! decisions belong to [`SessionClient`](crate::session::SessionClient). A transport must
//! return `Err` only when no response object exists (DNS, TCP, TLS, timeout); every HTTP
//! status, including 4xx and 5xx, is an `Ok` response.

// crates.io
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use http::header::{CONTENT_TYPE, RETRY_AFTER};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing API calls.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared
/// by the request pipeline, the refresh coordinator, and the login gate.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` to the absolute `url` and returns whatever response arrives.
	fn execute(&self, url: Url, request: ApiRequest) -> TransportFuture<'_>;
}

/// Description of an outbound API call, replayable after a token refresh.
#[derive(Clone)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path (and optional query) relative to the configured base URL.
	pub path: String,
	/// Caller-supplied headers. The auth header is overwritten on every dispatch.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
	retried: bool,
}
impl ApiRequest {
	/// Creates a request for the provided method and path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), headers: HeaderMap::new(), body: None, retried: false }
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Adds a typed header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Adds a header from raw strings, validating both parts.
	pub fn try_header(self, name: &str, value: &str) -> Result<Self, ConfigError> {
		let header_name = HeaderName::from_bytes(name.as_bytes())
			.map_err(|_| ConfigError::InvalidHeader { name: name.to_owned() })?;
		let header_value = HeaderValue::from_str(value)
			.map_err(|_| ConfigError::InvalidHeader { name: name.to_owned() })?;

		Ok(self.with_header(header_name, header_value))
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body and sets the content type.
	pub fn json<T>(mut self, value: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(value)?);
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Returns `true` once the request has been replayed after a refresh.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	/// Sets the retry mark; a marked request is never replayed again.
	pub(crate) fn mark_retried(mut self) -> Self {
		self.retried = true;

		self
	}
}
impl Debug for ApiRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiRequest")
			.field("method", &self.method)
			.field("path", &self.path)
			.field("headers", &self.headers.keys().collect::<Vec<_>>())
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.field("retried", &self.retried)
			.finish()
	}
}

/// Response returned by a transport; passed through to callers unchanged.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with an empty header map.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Decodes the body as JSON, reporting the failing field path on mismatch.
	pub fn json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { path: path.to_owned(), source })
	}

	/// Returns the body as lossy UTF-8 text.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Returns `true` when a JSON body carries `{"code": "TOKEN_EXPIRED"}`.
	///
	/// Used for diagnostics only; every 401 starts the refresh path regardless.
	pub fn is_token_expired(&self) -> bool {
		#[derive(Deserialize)]
		struct ErrorBody {
			code: Option<String>,
		}

		serde_json::from_slice::<ErrorBody>(&self.body)
			.ok()
			.and_then(|body| body.code)
			.is_some_and(|code| code == "TOKEN_EXPIRED")
	}

	/// Parses a `Retry-After` header expressed in seconds or as an HTTP date.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(&self.headers)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, url: Url, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let ApiRequest { method, path, headers, body, .. } = request;
			let mut builder = self.0.request(method, url).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(|e| map_reqwest_error(&path, e))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| map_reqwest_error(&path, e))?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(path: &str, e: ReqwestError) -> TransportError {
	if e.is_timeout() {
		TransportError::Timeout { path: path.to_owned() }
	} else {
		TransportError::network(path, e)
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
