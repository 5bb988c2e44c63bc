//! Networked PostgreSQL backend.
//!
//! Rotation runs inside a transaction; the delete's affected-row count
//! decides the winner when two rotations race on the same token, so the
//! single-use guarantee holds under the default isolation level.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{AppError, AuthError, StorageError};

use super::models::{RefreshRecord, User};
use super::{hash_blocking, verify_blocking, CredentialStore};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| AppError::Storage(StorageError::Connection(e.to_string())))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                pw_hash TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_refresh_user ON refresh_tokens(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User, AppError> {
        let user = User::new(email.to_string(), name.map(str::to_string));

        let result = sqlx::query("INSERT INTO users (id, email, name) VALUES ($1, $2, $3)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.name)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AuthError::EmailExists.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_password(&self, user_id: &str, plain: &str) -> Result<(), AppError> {
        let hash = hash_blocking(plain.to_string()).await?;

        let result =
            sqlx::query("UPDATE users SET pw_hash = $1, updated_at = now() WHERE id = $2")
                .bind(&hash)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound.into());
        }
        Ok(())
    }

    async fn verify_credentials(&self, email: &str, plain: &str) -> Result<User, AppError> {
        let row: Option<(String, Option<String>, String)> =
            sqlx::query_as("SELECT id, name, pw_hash FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        let (id, name, pw_hash) = row.ok_or(AuthError::InvalidCredentials)?;
        if pw_hash.is_empty() {
            return Err(AuthError::InvalidCredentials.into());
        }
        if !verify_blocking(plain.to_string(), pw_hash).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        Ok(User {
            id,
            email: email.to_string(),
            name,
        })
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT id, email, name FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn remove_user(&self, id: &str) -> Result<(), AppError> {
        // refresh_tokens rows go with the user via ON DELETE CASCADE
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_refresh(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)
            ON CONFLICT (token) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_refresh(
        &self,
        old: &str,
        new: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<RefreshRecord> = sqlx::query_as(
            "SELECT user_id, expires_at FROM refresh_tokens WHERE token = $1",
        )
        .bind(old)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(rec) if rec.user_id == user_id && !rec.is_expired() => {}
            _ => return Err(AuthError::RefreshInvalid.into()),
        }

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(old)
            .execute(&mut *tx)
            .await?;
        // A concurrent rotation got there first; this one loses.
        if deleted.rows_affected() == 0 {
            return Err(AuthError::RefreshInvalid.into());
        }

        sqlx::query("INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(new)
            .bind(user_id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn lookup_refresh(&self, token: &str) -> Result<Option<RefreshRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshRecord>(
            "SELECT user_id, expires_at FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_refresh(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
