//! Shared-key authentication.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AuthError, Authenticator, Caller, Credentials};

/// Validates requests against a single configured key.
pub struct ApiKeyAuthenticator {
    expected_key: String,
    caller_id: String,
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: String) -> Self {
        // Callers are identified by a short fingerprint of the key, never the key itself.
        let fingerprint = format!("{:x}", Sha256::digest(api_key.as_bytes()));
        Self {
            caller_id: format!("key:{}", &fingerprint[..12]),
            expected_key: api_key,
        }
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Caller, AuthError> {
        let presented = credentials
            .presented_key()
            .ok_or(AuthError::NotAuthenticated)?;

        if constant_time_eq(presented.as_bytes(), self.expected_key.as_bytes()) {
            Ok(Caller {
                id: self.caller_id.clone(),
                method: "api_key",
            })
        } else {
            Err(AuthError::InvalidCredentials("Invalid API key".to_string()))
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
