/// Token revocation store.
///
/// A time-bounded denylist of token IDs consulted on every verification.
/// Entries self-expire: they must outlive the token they revoke, and may be
/// purged any time after the token's own expiry. `add` is idempotent and
/// never shortens an existing entry's lifetime.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::{AppError, AuthError};

/// Token expiry is second-granular, and the signature check accepts a token
/// through the whole second named by its `exp`. An entry is therefore live
/// until that second has fully passed, never just until its start.
fn entry_live(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at.timestamp() >= now.timestamp()
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark `token_id` revoked until `expires_at`.
    async fn add(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AppError>;

    /// Whether `token_id` is currently revoked.
    ///
    /// This sits on the verification critical path; backends must surface
    /// their own failures as errors, never as `false`.
    async fn contains(&self, token_id: &str) -> Result<bool, AppError>;
}

/// Process-local store. Does not survive a restart; suitable for
/// single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryRevocationStore {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose token has already expired.
    pub async fn purge_expired(&self) {
        let now = Utc::now();
        self.entries.write().await.retain(|_, exp| entry_live(*exp, now));
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn add(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, exp| entry_live(*exp, now));

        let entry = entries.entry(token_id.to_string()).or_insert(expires_at);
        // Re-adding keeps the later expiry so a revocation never lapses early.
        if expires_at > *entry {
            *entry = expires_at;
        }
        Ok(())
    }

    async fn contains(&self, token_id: &str) -> Result<bool, AppError> {
        let entries = self.entries.read().await;
        Ok(matches!(entries.get(token_id), Some(exp) if entry_live(*exp, Utc::now())))
    }
}

/// Postgres-backed store. Survives restarts; shared across instances.
pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete entries whose token has expired. Intended for periodic
    /// housekeeping; correctness does not depend on it.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        // Cut off at the start of the current second so an entry whose token
        // is still acceptable this second survives.
        let now = Utc::now();
        let cutoff = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("purge", e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn add(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_id, expires_at, revoked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_id) DO UPDATE
            SET expires_at = GREATEST(revoked_tokens.expires_at, EXCLUDED.expires_at)
            "#,
        )
        .bind(token_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("add", e))?;

        Ok(())
    }

    async fn contains(&self, token_id: &str) -> Result<bool, AppError> {
        let expires_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT expires_at FROM revoked_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("contains", e))?;

        Ok(matches!(expires_at, Some(exp) if entry_live(exp, Utc::now())))
    }
}

fn store_error(operation: &str, e: sqlx::Error) -> AppError {
    tracing::error!(operation = operation, error = %e, "Revocation store query failed");
    AuthError::StoreUnavailable.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_one_hour() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn test_added_id_is_contained() {
        let store = InMemoryRevocationStore::new();
        store.add("abc123", in_one_hour()).await.unwrap();

        assert!(store.contains("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_contained() {
        let store = InMemoryRevocationStore::new();

        assert!(!store.contains("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoking_one_id_leaves_others_alone() {
        let store = InMemoryRevocationStore::new();
        store.add("token-a", in_one_hour()).await.unwrap();

        assert!(store.contains("token-a").await.unwrap());
        assert!(!store.contains("token-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_is_idempotent_and_keeps_later_expiry() {
        let store = InMemoryRevocationStore::new();
        let later = in_one_hour();
        let sooner = Utc::now() + chrono::Duration::minutes(5);

        store.add("abc123", later).await.unwrap();
        store.add("abc123", sooner).await.unwrap();

        let entries = store.entries.read().await;
        assert_eq!(entries.get("abc123"), Some(&later));
    }

    #[test]
    fn test_entry_is_live_through_its_expiry_second() {
        let now = Utc::now();
        let boundary = DateTime::from_timestamp(now.timestamp(), 0).unwrap();

        // A token whose exp names the current second is still accepted by
        // the signature check, so its entry must still count as revoked.
        assert!(entry_live(boundary, now));
        assert!(!entry_live(boundary - chrono::Duration::seconds(1), now));
    }

    #[tokio::test]
    async fn test_entry_expiring_this_second_is_still_contained() {
        let store = InMemoryRevocationStore::new();
        let this_second = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        store.add("boundary", this_second).await.unwrap();

        assert!(store.contains("boundary").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_contained() {
        let store = InMemoryRevocationStore::new();
        let past = Utc::now() - chrono::Duration::seconds(1);
        store.add("stale", past).await.unwrap();

        assert!(!store.contains("stale").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_drops_only_expired_entries() {
        let store = InMemoryRevocationStore::new();
        store
            .add("stale", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        store.add("live", in_one_hour()).await.unwrap();

        store.purge_expired().await;

        let entries = store.entries.read().await;
        assert!(!entries.contains_key("stale"));
        assert!(entries.contains_key("live"));
    }
}
