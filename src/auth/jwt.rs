/// Token encoding and decoding.
///
/// Two independently configured secrets sign access and refresh tokens.
/// Verification checks, in order: signature (against the secret for the
/// expected type), expiry, and the payload's own `type` claim. The first
/// failure short-circuits the rest.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenType};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

pub struct TokenCodec {
    algorithm: Algorithm,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl TokenCodec {
    /// Build a codec from configuration.
    ///
    /// # Errors
    /// Fails when either secret is empty, the secrets are equal, or the
    /// configured algorithm is not an HMAC variant.
    pub fn new(config: &JwtSettings) -> Result<Self, AppError> {
        if config.access_secret.is_empty() || config.refresh_secret.is_empty() {
            return Err(AppError::Internal(
                "Token secrets must not be empty".to_string(),
            ));
        }
        if config.access_secret == config.refresh_secret {
            return Err(AppError::Internal(
                "Access and refresh secrets must be distinct".to_string(),
            ));
        }

        let algorithm: Algorithm = config
            .algorithm
            .parse()
            .map_err(|_| AppError::Internal(format!("Unknown algorithm: {}", config.algorithm)))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AppError::Internal(format!(
                "Unsupported signing algorithm: {}",
                config.algorithm
            )));
        }

        Ok(Self {
            algorithm,
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: chrono::Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: chrono::Duration::days(config.refresh_ttl_days),
        })
    }

    /// Default TTL for the given token class.
    pub fn default_ttl(&self, token_type: TokenType) -> chrono::Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }

    /// Issue a signed token for `user_id`.
    ///
    /// `ttl_override` replaces the configured default when present.
    pub fn issue(
        &self,
        user_id: &Uuid,
        token_type: TokenType,
        ttl_override: Option<chrono::Duration>,
    ) -> Result<String, AppError> {
        let ttl = ttl_override.unwrap_or_else(|| self.default_ttl(token_type));
        let claims = Claims::new(*user_id, token_type, ttl);

        let key = match token_type {
            TokenType::Access => &self.access_encoding,
            TokenType::Refresh => &self.refresh_encoding,
        };

        encode(&Header::new(self.algorithm), &claims, key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Decode a token and check signature, expiry, and type claim.
    ///
    /// `check_expiry = false` skips the expiry check only; signature and type
    /// are always enforced. Revocation is not consulted here — that is the
    /// authenticator's job.
    pub fn decode(
        &self,
        token: &str,
        expected_type: TokenType,
        check_expiry: bool,
    ) -> Result<Claims, AppError> {
        let key = match expected_type {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(self.algorithm);
        // jsonwebtoken defaults to 60s of slack; expiry must be exact.
        validation.leeway = 0;
        validation.validate_exp = check_expiry;

        let claims = decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })?;

        if claims.token_type != expected_type {
            return Err(AuthError::WrongTokenType.into());
        }

        Ok(claims)
    }
}
