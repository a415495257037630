//! Session client configuration: endpoints, auth header shape, and storage key names.
//!
//! Call sites that historically disagreed on header shapes or storage key names are
//! expressed as configuration here rather than as separate client implementations.

// crates.io
use http::HeaderName;
// self
use crate::{_prelude::*, error::ConfigError};

/// Errors raised while constructing or validating a [`SessionConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum SessionConfigError {
	/// Base URL must use HTTP or HTTPS.
	#[error("The base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// URL that failed validation.
		url: String,
	},
	/// Base URL cannot have paths joined onto it (e.g. `mailto:` style URLs).
	#[error("The base URL cannot serve as a base: {url}.")]
	CannotBeABase {
		/// URL that failed validation.
		url: String,
	},
	/// Endpoint paths must be absolute.
	#[error("The {endpoint} path must start with '/': {path}.")]
	RelativePath {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
	},
	/// Header name is not a valid HTTP token.
	#[error("`{name}` is not a valid HTTP header name.")]
	InvalidHeaderName {
		/// Header name that failed validation.
		name: String,
	},
	/// Storage key names must be non-empty and distinct.
	#[error("Storage keys must be non-empty and distinct.")]
	InvalidStorageKeys,
}

/// Names of the two persisted token slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageKeys {
	/// Slot holding the access token.
	pub access: String,
	/// Slot holding the refresh token.
	pub refresh: String,
}
impl StorageKeys {
	/// Key pair used by the admin console (`admin_token` / `admin_refresh_token`).
	pub fn admin() -> Self {
		Self { access: "admin_token".into(), refresh: "admin_refresh_token".into() }
	}

	fn validate(&self) -> Result<(), SessionConfigError> {
		if self.access.is_empty() || self.refresh.is_empty() || self.access == self.refresh {
			Err(SessionConfigError::InvalidStorageKeys)
		} else {
			Ok(())
		}
	}
}
impl Default for StorageKeys {
	fn default() -> Self {
		Self { access: "token".into(), refresh: "refreshToken".into() }
	}
}

/// Validated configuration consumed by [`SessionClient`](crate::session::SessionClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// Base URL every request path is joined onto.
	pub base_url: Url,
	/// Path of the refresh endpoint.
	pub refresh_path: String,
	/// Path of the login endpoint.
	pub login_path: String,
	/// Header carrying the access token.
	pub auth_header: String,
	/// Scheme prefix placed before the access token.
	pub auth_scheme: String,
	/// Persisted slot names.
	pub storage_keys: StorageKeys,
}
impl SessionConfig {
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &'static str = "/auth/refresh";
	/// Default login endpoint path.
	pub const DEFAULT_LOGIN_PATH: &'static str = "/login";

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(base_url)
	}

	/// Resolves a request path against the base URL.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let relative = path.trim_start_matches('/');
		let mut base = self.base_url.clone();

		if !base.path().ends_with('/') {
			let with_slash = format!("{}/", base.path());

			base.set_path(&with_slash);
		}

		base.join(relative)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}

	/// Parsed header name used for the access token.
	pub fn auth_header_name(&self) -> Result<HeaderName, ConfigError> {
		HeaderName::from_bytes(self.auth_header.as_bytes())
			.map_err(|_| ConfigError::InvalidHeader { name: self.auth_header.clone() })
	}

	/// Formats the header value for an access token.
	pub fn auth_value(&self, access_token: &str) -> String {
		if self.auth_scheme.is_empty() {
			access_token.to_owned()
		} else {
			format!("{} {access_token}", self.auth_scheme)
		}
	}

	fn validate(&self) -> Result<(), SessionConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(SessionConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}
		if self.base_url.cannot_be_a_base() {
			return Err(SessionConfigError::CannotBeABase { url: self.base_url.to_string() });
		}

		validate_path("refresh", &self.refresh_path)?;
		validate_path("login", &self.login_path)?;

		if HeaderName::from_bytes(self.auth_header.as_bytes()).is_err() {
			return Err(SessionConfigError::InvalidHeaderName { name: self.auth_header.clone() });
		}

		self.storage_keys.validate()
	}
}

/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	base_url: Url,
	refresh_path: String,
	login_path: String,
	auth_header: String,
	auth_scheme: String,
	storage_keys: StorageKeys,
}
impl SessionConfigBuilder {
	/// Creates a new builder seeded with defaults for the provided base URL.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			refresh_path: SessionConfig::DEFAULT_REFRESH_PATH.into(),
			login_path: SessionConfig::DEFAULT_LOGIN_PATH.into(),
			auth_header: "authorization".into(),
			auth_scheme: "Bearer".into(),
			storage_keys: StorageKeys::default(),
		}
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the header carrying the access token.
	pub fn auth_header(mut self, name: impl Into<String>) -> Self {
		self.auth_header = name.into();

		self
	}

	/// Overrides the scheme prefix; an empty scheme sends the raw token.
	pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.auth_scheme = scheme.into();

		self
	}

	/// Overrides the persisted slot names.
	pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
		self.storage_keys = keys;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
		let config = SessionConfig {
			base_url: self.base_url,
			refresh_path: self.refresh_path,
			login_path: self.login_path,
			auth_header: self.auth_header.to_ascii_lowercase(),
			auth_scheme: self.auth_scheme,
			storage_keys: self.storage_keys,
		};

		config.validate()?;

		Ok(config)
	}
}

fn validate_path(endpoint: &'static str, path: &str) -> Result<(), SessionConfigError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(SessionConfigError::RelativePath { endpoint, path: path.to_owned() })
	}
}
