//! Reader profiles keyed by identity-provider user id.

use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: String,
}

pub struct ProfileStore {
    pool: SqlitePool,
}

impl ProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a profile, or update an existing one. A `None` display name keeps the stored one.
    pub async fn upsert(
        &self,
        user_id: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO profiles (user_id, email, display_name) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET email = excluded.email, display_name = COALESCE(excluded.display_name, profiles.display_name)",
        )
        .bind(user_id)
        .bind(email)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<Profile>, sqlx::Error> {
        let row: Option<(String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT user_id, email, display_name, created_at FROM profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, email, display_name, created_at)| Profile {
            user_id,
            email,
            display_name,
            created_at,
        }))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Profile>, sqlx::Error> {
        let row: Option<(String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT user_id, email, display_name, created_at FROM profiles WHERE email = ? ORDER BY created_at LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, email, display_name, created_at)| Profile {
            user_id,
            email,
            display_name,
            created_at,
        }))
    }
}
