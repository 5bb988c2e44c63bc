//! Durable user and refresh-token state.
//!
//! Every backend implements the same [`CredentialStore`] contract; the
//! backend is picked once at startup from configuration and callers
//! never learn which one they are talking to. The store is the only
//! shared mutable resource in the system and is safe for concurrent use
//! without external locking.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::error::AppError;

pub use memory::MemoryStore;
pub use models::{RefreshRecord, User};
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Capability interface over durable user and refresh-token records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new user with a fresh id and no password yet. Fails with
    /// `EmailExists` if the email is already taken; concurrent duplicate
    /// inserts resolve to exactly one success.
    async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User, AppError>;

    /// Hash and persist a password. Fails with `UserNotFound` when no
    /// user row matched.
    async fn set_password(&self, user_id: &str, plain: &str) -> Result<(), AppError>;

    /// Look up by email and check the password. Unknown email, unset
    /// password, and wrong password are indistinguishable to the caller.
    async fn verify_credentials(&self, email: &str, plain: &str) -> Result<User, AppError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Remove a user and any refresh tokens bound to it. Used to roll
    /// back a registration whose password step failed.
    async fn remove_user(&self, id: &str) -> Result<(), AppError>;

    /// Idempotent upsert of a refresh token binding.
    async fn save_refresh(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Atomically consume `old` and install `new`. Fails with
    /// `RefreshInvalid` when `old` is absent, expired, or bound to a
    /// different user; on failure the prior state is left untouched.
    /// For a given old token, at most one concurrent rotation succeeds.
    async fn rotate_refresh(
        &self,
        old: &str,
        new: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Pure read; expiry is the caller's problem.
    async fn lookup_refresh(&self, token: &str) -> Result<Option<RefreshRecord>, AppError>;

    /// Idempotent delete; removing an unknown token is not an error.
    async fn delete_refresh(&self, token: &str) -> Result<(), AppError>;
}

/// Build the store selected by `database.backend`.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn CredentialStore>, AppError> {
    match settings.database.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => Ok(Arc::new(SqliteStore::connect(&settings.database.url).await?)),
        "postgres" => Ok(Arc::new(
            PostgresStore::connect(&settings.database.url, settings.database.max_connections)
                .await?,
        )),
        other => Err(AppError::Config(format!(
            "unknown database backend: {other}"
        ))),
    }
}

// Argon2 is deliberately expensive; keep it off the async executor
// threads. Both helpers take owned strings so the closure is 'static.

pub(crate) async fn hash_blocking(plain: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || crate::auth::hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("hash task: {e}")))?
}

pub(crate) async fn verify_blocking(plain: String, encoded: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || crate::auth::verify_password(&plain, &encoded))
        .await
        .map_err(|e| AppError::Internal(format!("verify task: {e}")))
}
