use chrono::{DateTime, Duration, Utc};
use nasdrop_core::{AppError, OriginIdentity, Token};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Registry of single-use upload tokens.
#[derive(Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
    ttl: Duration,
}

impl TokenRepository {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Issue a fresh token for `origin`, valid for the configured TTL.
    ///
    /// Any store failure is reported as `StoreUnavailable`; the caller must not
    /// hand out a link in that case.
    pub async fn issue(&self, origin: &OriginIdentity) -> Result<Token, AppError> {
        self.issue_at(origin, Utc::now()).await
    }

    #[tracing::instrument(skip(self, origin), fields(db.table = "upload_tokens", channel_id = %origin.channel_id))]
    pub async fn issue_at(
        &self,
        origin: &OriginIdentity,
        now: DateTime<Utc>,
    ) -> Result<Token, AppError> {
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            AppError::Internal(format!("token lifetime {} is out of range", self.ttl))
        })?;
        let token = Token {
            token: Uuid::new_v4().to_string(),
            expires_at,
            origin: origin.clone(),
        };

        sqlx::query(
            r#"
            INSERT INTO upload_tokens (token, expires_at_ms, requester_id, channel_id, created_at_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.token)
        .bind(token.expires_at.timestamp_millis())
        .bind(&origin.requester_id)
        .bind(&origin.channel_id)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store upload token");
            AppError::StoreUnavailable(e.to_string())
        })?;

        tracing::debug!(expires_at = %token.expires_at, "Upload token issued");
        Ok(token)
    }

    /// Look up the origin bound to `token`.
    ///
    /// Returns `None` for unknown and for expired tokens alike. The token is left
    /// in place; deleting it is the caller's job once the upload succeeded.
    pub async fn redeem(&self, token: &str) -> Result<Option<OriginIdentity>, AppError> {
        self.redeem_at(token, Utc::now()).await
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "upload_tokens"))]
    pub async fn redeem_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OriginIdentity>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT requester_id, channel_id
            FROM upload_tokens
            WHERE token = ? AND expires_at_ms > ?
            "#,
        )
        .bind(token)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(OriginIdentity {
                requester_id: row.try_get("requester_id")?,
                channel_id: row.try_get("channel_id")?,
            })),
            None => Ok(None),
        }
    }

    /// Delete `token`. Deleting an unknown token is not an error.
    #[tracing::instrument(skip(self, token), fields(db.table = "upload_tokens"))]
    pub async fn invalidate(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM upload_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every expired token and return how many were removed.
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        self.sweep_expired_at(Utc::now()).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_tokens"))]
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM upload_tokens WHERE expires_at_ms <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, "Expired upload tokens swept");
        }
        Ok(removed)
    }

    /// Number of tokens currently stored, expired or not.
    pub async fn count(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upload_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
