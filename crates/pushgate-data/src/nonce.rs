//! Replay-protection nonce store with at-most-once consumption.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;

const PURGE_EXPIRED: &str = r"DELETE FROM nonces WHERE expires_at <= $1";

const INSERT_NONCE: &str = r"
    INSERT INTO nonces (app_id, nonce, created_at, expires_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (app_id, nonce) DO NOTHING
";

/// Database-backed store of `(app id, nonce, expiry)` triples.
#[derive(Clone)]
pub struct NonceStore {
    pool: PgPool,
}

impl NonceStore {
    /// Open the nonce store on an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically record a nonce, returning whether this caller won.
    ///
    /// Stale rows are purged opportunistically first; the conditional insert
    /// relies on the composite primary key, so for any `(app_id, nonce)`
    /// within the validity window exactly one concurrent caller observes
    /// `true`. After expiry the same nonce may be accepted again.
    ///
    /// # Errors
    ///
    /// Returns an error if either statement fails.
    pub async fn consume(
        &self,
        app_id: &str,
        nonce: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        sqlx::query(PURGE_EXPIRED)
            .bind(now)
            .execute(&self.pool)
            .await?;
        let inserted = sqlx::query(INSERT_NONCE)
            .bind(app_id)
            .bind(nonce)
            .bind(now)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(inserted.rows_affected() == 1)
    }
}
