//! Caller authentication.
//!
//! The web client sends its configured key as `Authorization: Bearer <key>`
//! on every request. Deployments on a trusted network run with `none`.

mod api_key;

pub use api_key::ApiKeyAuthenticator;

use async_trait::async_trait;
use std::net::IpAddr;
use thiserror::Error;

use crate::config::{AuthConfig, AuthMethod};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Credentials pulled off an incoming request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub bearer: Option<String>,
    pub api_key: Option<String>,
    pub source_ip: IpAddr,
}

impl Credentials {
    /// Collect credentials from `(header name, value)` pairs. Header names are
    /// matched case-insensitively.
    pub fn from_headers<'a, I>(headers: I, source_ip: IpAddr) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut bearer = None;
        let mut api_key = None;

        for (name, value) in headers {
            if name.eq_ignore_ascii_case("authorization") {
                let value = value.trim();
                let is_bearer = value
                    .get(..7)
                    .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer "));
                if is_bearer {
                    bearer = Some(value[7..].trim().to_string());
                }
            } else if name.eq_ignore_ascii_case("x-api-key") {
                api_key = Some(value.trim().to_string());
            }
        }

        Self {
            bearer,
            api_key,
            source_ip,
        }
    }

    /// The presented key, preferring the bearer token.
    pub fn presented_key(&self) -> Option<&str> {
        self.bearer.as_deref().or(self.api_key.as_deref())
    }
}

/// Who made the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub method: &'static str,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
            method: "none",
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a request and return the caller
    async fn authenticate(&self, credentials: &Credentials) -> Result<Caller, AuthError>;

    /// Name of this authentication method
    fn method_name(&self) -> &'static str;
}

/// Accepts every request as anonymous. Must be selected explicitly in config.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Caller, AuthError> {
        Ok(Caller::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

/// Build the authenticator selected by config.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator)),
        AuthMethod::ApiKey => {
            let key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    AuthError::ConfigurationError(
                        "api_key must be set when using ApiKey auth method".to_string(),
                    )
                })?;
            Ok(Box::new(ApiKeyAuthenticator::new(key)))
        }
    }
}
