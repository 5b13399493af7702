/// Token claims and type discrimination.
///
/// Every token carries its own `type` claim. The claim is checked on
/// verification in addition to the secret selection, so a refresh token can
/// never be replayed as an access token even if both secrets leak.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Which class of token a claim set belongs to.
///
/// Determines the signing secret and the default TTL policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Payload of an issued token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Token class, serialized as the `type` claim
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Unique token ID, the revocation key
    pub jti: String,
}

impl Claims {
    /// Create a new claim set expiring `ttl` from now, with a fresh `jti`.
    pub fn new(user_id: Uuid, token_type: TokenType, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            token_type,
            exp: now + ttl.num_seconds(),
            iat: now,
            jti: new_token_id(),
        }
    }

    /// Extract the user ID from the subject claim.
    ///
    /// # Errors
    /// Returns `MalformedToken` if the subject is not a valid UUID.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::MalformedToken.into())
    }

    /// Expiry as a timestamp, for handing to the revocation store.
    pub fn expires_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.exp, 0).unwrap_or_else(chrono::Utc::now)
    }
}

/// Generate a unique token ID: 16 random bytes, hex encoded (128 bits).
fn new_token_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
