//! Refresh token tracking for rotation and revocation.
//!
//! A refresh token is live while its JTI has a row here. Rotating deletes
//! the old row and inserts the new one, so a consumed token cannot be
//! replayed.

use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub jti: String,
    pub user_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub created_at: String,
}

pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        jti: &str,
        user_id: &str,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (jti, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        let row: Option<(i64, String, String, i64, i64, String)> = sqlx::query_as(
            "SELECT id, jti, user_id, issued_at, expires_at, created_at FROM refresh_tokens WHERE jti = ?",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, jti, user_id, issued_at, expires_at, created_at)| RefreshTokenRecord {
                id,
                jti,
                user_id,
                issued_at,
                expires_at,
                created_at,
            },
        ))
    }

    /// Atomically replace `old_jti` with a new token row.
    ///
    /// Returns `false` without inserting if `old_jti` was already consumed.
    pub async fn rotate(
        &self,
        old_jti: &str,
        new_jti: &str,
        user_id: &str,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(old_jti)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens (jti, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(new_jti)
        .bind(user_id)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete a token by its JWT ID (revoke).
    pub async fn delete_by_jti(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all tokens whose expiry is before `now` (Unix seconds).
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
