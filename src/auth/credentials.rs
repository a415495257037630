//! Login credentials validated at the login boundary.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::{_prelude::*, auth::TokenSecret};

const USERNAME_MAX_LEN: usize = 128;

/// Error returned when login credentials fail validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum CredentialError {
	/// The field was missing or empty.
	#[error("{field} is required.")]
	Missing {
		/// Field name (username, password).
		field: &'static str,
	},
	/// The field contains whitespace characters.
	#[error("{field} contains whitespace.")]
	ContainsWhitespace {
		/// Field name (username, password).
		field: &'static str,
	},
	/// The field exceeded the allowed character count.
	#[error("{field} exceeds {max} characters.")]
	TooLong {
		/// Field name (username, password).
		field: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Account name submitted to the login route.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);
impl Username {
	/// Creates a username after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, CredentialError> {
		let view = value.as_ref();

		validate_username(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for Username {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for Username {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<Username> for String {
	fn from(value: Username) -> Self {
		value.0
	}
}
impl TryFrom<String> for Username {
	type Error = CredentialError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_username(&value)?;

		Ok(Self(value))
	}
}
impl Borrow<str> for Username {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for Username {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Username({})", self.0)
	}
}
impl Display for Username {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for Username {
	type Err = CredentialError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

/// Raw login payload as received by `POST /login`.
#[derive(Clone, Default, Deserialize)]
pub struct LoginRequest {
	/// Submitted account name; may be absent in malformed payloads.
	#[serde(default)]
	pub username: Option<String>,
	/// Submitted password; may be absent in malformed payloads.
	#[serde(default)]
	pub password: Option<String>,
}
impl LoginRequest {
	/// Creates a request from the submitted fields.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { username: Some(username.into()), password: Some(password.into()) }
	}

	/// Validates the payload into [`Credentials`].
	pub fn validate(self) -> Result<Credentials, CredentialError> {
		let username = self.username.ok_or(CredentialError::Missing { field: "Username" })?;
		let password = self
			.password
			.filter(|value| !value.is_empty())
			.ok_or(CredentialError::Missing { field: "Password" })?;

		Ok(Credentials { username: Username::new(username)?, password: TokenSecret::new(password) })
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("username", &self.username)
			.field("password_set", &self.password.is_some())
			.finish()
	}
}

/// Validated credentials forwarded to the identity backend.
#[derive(Clone, Debug)]
pub struct Credentials {
	/// Validated account name.
	pub username: Username,
	/// Password, redacted in logs.
	pub password: TokenSecret,
}

fn validate_username(view: &str) -> Result<(), CredentialError> {
	const FIELD: &str = "Username";

	if view.is_empty() {
		return Err(CredentialError::Missing { field: FIELD });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(CredentialError::ContainsWhitespace { field: FIELD });
	}
	if view.chars().count() > USERNAME_MAX_LEN {
		return Err(CredentialError::TooLong { field: FIELD, max: USERNAME_MAX_LEN });
	}

	Ok(())
}
