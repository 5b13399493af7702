/// Token verification and identity resolution.
///
/// The authenticator is the only place where the token codec, the revocation
/// store, and the user directory are composed. Route handlers and middleware
/// go through it; nothing else calls the codec for verification.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::time::timeout;
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenType};
use crate::auth::jwt::TokenCodec;
use crate::auth::revocation::RevocationStore;
use crate::error::{AppError, AuthError};

/// Minimal user record the authentication layer needs.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// User lookup capability consumed by the authenticator and the login flow.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError>;

    /// Lookup for login; the identifier may be an email address or a username.
    async fn find_by_credential(&self, identifier: &str) -> Result<Option<UserRecord>, AppError>;
}

/// Postgres-backed user directory.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type UserRow = (Uuid, String, String, String, String, String, bool);

fn row_to_record(row: UserRow) -> UserRecord {
    UserRecord {
        id: row.0,
        email: row.1,
        username: row.2,
        first_name: row.3,
        last_name: row.4,
        password_hash: row.5,
        is_active: row.6,
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, username, first_name, last_name, password_hash, is_active
            FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_record))
    }

    async fn find_by_credential(&self, identifier: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, username, first_name, last_name, password_hash, is_active
            FROM users WHERE email = $1 OR username = $1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_record))
    }
}

/// Access token and refresh token issued together.
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of resolving a bearer token: the user plus the claims that
/// authenticated them (the claims carry the jti needed for logout).
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserRecord,
    pub claims: Claims,
}

pub struct Authenticator {
    codec: TokenCodec,
    store: Arc<dyn RevocationStore>,
    users: Arc<dyn UserDirectory>,
    store_timeout: Duration,
}

impl Authenticator {
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn RevocationStore>,
        users: Arc<dyn UserDirectory>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            users,
            store_timeout,
        }
    }

    pub fn users(&self) -> &dyn UserDirectory {
        self.users.as_ref()
    }

    /// Issue a single token.
    pub fn issue(
        &self,
        user_id: &Uuid,
        token_type: TokenType,
        ttl_override: Option<chrono::Duration>,
    ) -> Result<String, AppError> {
        self.codec.issue(user_id, token_type, ttl_override)
    }

    /// Issue an access/refresh pair for a freshly authenticated user.
    pub fn issue_pair(&self, user_id: &Uuid) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.codec.issue(user_id, TokenType::Access, None)?,
            refresh_token: self.codec.issue(user_id, TokenType::Refresh, None)?,
        })
    }

    /// Seconds until a freshly issued access token expires.
    pub fn access_ttl_seconds(&self) -> i64 {
        self.codec.default_ttl(TokenType::Access).num_seconds()
    }

    /// Verify a token: signature, expiry, type claim, then revocation.
    ///
    /// The revocation lookup is bounded by the configured timeout and fails
    /// closed: if the store cannot answer in time the token is rejected with
    /// `StoreUnavailable`, never accepted.
    pub async fn verify(&self, token: &str, expected_type: TokenType) -> Result<Claims, AppError> {
        let claims = self.codec.decode(token, expected_type, true)?;

        let revoked = match timeout(self.store_timeout, self.store.contains(&claims.jti)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(jti = %claims.jti, "Revocation lookup timed out");
                return Err(AuthError::StoreUnavailable.into());
            }
        };
        if revoked {
            return Err(AuthError::Revoked.into());
        }

        Ok(claims)
    }

    /// Revoke a token by its jti, until its natural expiry.
    pub async fn revoke(&self, claims: &Claims) -> Result<(), AppError> {
        match timeout(
            self.store_timeout,
            self.store.add(&claims.jti, claims.expires_at()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(jti = %claims.jti, "Revocation write timed out");
                Err(AuthError::StoreUnavailable.into())
            }
        }
    }

    /// Resolve a bearer token to an active user.
    pub async fn resolve(&self, token: &str) -> Result<CurrentUser, AppError> {
        let claims = self.verify(token, TokenType::Access).await?;
        let user_id = claims.user_id()?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::InactiveAccount.into());
        }

        Ok(CurrentUser { user, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::revocation::InMemoryRevocationStore;
    use crate::configuration::JwtSettings;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    struct StaticDirectory {
        users: HashMap<Uuid, UserRecord>,
    }

    impl StaticDirectory {
        fn with_user(user: UserRecord) -> Self {
            let mut users = HashMap::new();
            users.insert(user.id, user);
            Self { users }
        }
    }

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
            Ok(self.users.get(&id).cloned())
        }

        async fn find_by_credential(
            &self,
            identifier: &str,
        ) -> Result<Option<UserRecord>, AppError> {
            Ok(self
                .users
                .values()
                .find(|u| u.email == identifier || u.username == identifier)
                .cloned())
        }
    }

    /// Store whose lookups never complete within any reasonable timeout.
    #[derive(Default)]
    struct StalledStore {
        entries: RwLock<HashMap<String, DateTime<Utc>>>,
    }

    #[async_trait]
    impl RevocationStore for StalledStore {
        async fn add(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
            self.entries
                .write()
                .await
                .insert(token_id.to_string(), expires_at);
            Ok(())
        }

        async fn contains(&self, _token_id: &str) -> Result<bool, AppError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(false)
        }
    }

    fn test_user() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Example".to_string(),
            password_hash: "$2b$04$placeholderplaceholderplaceholde".to_string(),
            is_active: true,
        }
    }

    fn authenticator_for(
        user: UserRecord,
        store: Arc<dyn RevocationStore>,
    ) -> Authenticator {
        let config = JwtSettings {
            access_secret: "access-secret-at-least-32-characters-long".to_string(),
            refresh_secret: "refresh-secret-at-least-32-characters-ok".to_string(),
            algorithm: "HS256".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
            store_timeout_ms: 100,
        };
        Authenticator::new(
            TokenCodec::new(&config).unwrap(),
            store,
            Arc::new(StaticDirectory::with_user(user)),
            Duration::from_millis(config.store_timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_resolve_returns_active_user() {
        let user = test_user();
        let auth = authenticator_for(user.clone(), Arc::new(InMemoryRevocationStore::new()));

        let pair = auth.issue_pair(&user.id).unwrap();
        let current = auth.resolve(&pair.access_token).await.unwrap();

        assert_eq!(current.user.id, user.id);
        assert!(current.user.is_active);
    }

    #[tokio::test]
    async fn test_refresh_token_cannot_be_used_as_access() {
        let user = test_user();
        let auth = authenticator_for(user.clone(), Arc::new(InMemoryRevocationStore::new()));

        let pair = auth.issue_pair(&user.id).unwrap();
        let result = auth.resolve(&pair.refresh_token).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected() {
        let user = test_user();
        let auth = authenticator_for(user.clone(), Arc::new(InMemoryRevocationStore::new()));

        let pair = auth.issue_pair(&user.id).unwrap();
        let claims = auth.verify(&pair.access_token, TokenType::Access).await.unwrap();

        auth.revoke(&claims).await.unwrap();

        let result = auth.verify(&pair.access_token, TokenType::Access).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::Revoked))));
    }

    #[tokio::test]
    async fn test_revoking_one_token_leaves_another_valid() {
        let user = test_user();
        let auth = authenticator_for(user.clone(), Arc::new(InMemoryRevocationStore::new()));

        let first = auth.issue(&user.id, TokenType::Access, None).unwrap();
        let second = auth.issue(&user.id, TokenType::Access, None).unwrap();

        let claims = auth.verify(&first, TokenType::Access).await.unwrap();
        auth.revoke(&claims).await.unwrap();

        assert!(auth.verify(&first, TokenType::Access).await.is_err());
        assert!(auth.verify(&second, TokenType::Access).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_subject_fails_with_user_not_found() {
        let user = test_user();
        let auth = authenticator_for(user, Arc::new(InMemoryRevocationStore::new()));

        let stranger = Uuid::new_v4();
        let token = auth.issue(&stranger, TokenType::Access, None).unwrap();

        let result = auth.resolve(&token).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::UserNotFound))
        ));
    }

    #[tokio::test]
    async fn test_inactive_account_is_rejected() {
        let mut user = test_user();
        user.is_active = false;
        let auth = authenticator_for(user.clone(), Arc::new(InMemoryRevocationStore::new()));

        let token = auth.issue(&user.id, TokenType::Access, None).unwrap();

        let result = auth.resolve(&token).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::InactiveAccount))
        ));
    }

    #[tokio::test]
    async fn test_store_timeout_fails_closed() {
        let user = test_user();
        let auth = authenticator_for(user.clone(), Arc::new(StalledStore::default()));

        let token = auth.issue(&user.id, TokenType::Access, None).unwrap();

        let result = auth.verify(&token, TokenType::Access).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::StoreUnavailable))
        ));
    }
}
