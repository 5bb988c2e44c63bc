//! Single-process in-memory backend.
//!
//! All state lives behind one exclusive lock owned by the instance, so
//! every mutation — rotation included — is trivially linearizable. The
//! lock is never held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, AuthError};

use super::models::{RefreshRecord, User};
use super::{hash_blocking, verify_blocking, CredentialStore};

#[derive(Debug, Clone)]
struct UserRow {
    user: User,
    pw_hash: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRow>,
    by_email: HashMap<String, String>, // email -> id
    refresh: HashMap<String, RefreshRecord>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning would mean a panic while mutating; there is no
        // sane recovery, so propagate the panic.
        self.inner.lock().expect("memory store lock poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_user(&self, email: &str, name: Option<&str>) -> Result<User, AppError> {
        let user = User::new(email.to_string(), name.map(str::to_string));

        let mut inner = self.lock();
        if inner.by_email.contains_key(email) {
            return Err(AuthError::EmailExists.into());
        }
        inner.by_email.insert(email.to_string(), user.id.clone());
        inner.users.insert(
            user.id.clone(),
            UserRow {
                user: user.clone(),
                pw_hash: String::new(),
            },
        );
        Ok(user)
    }

    async fn set_password(&self, user_id: &str, plain: &str) -> Result<(), AppError> {
        let hash = hash_blocking(plain.to_string()).await?;

        let mut inner = self.lock();
        match inner.users.get_mut(user_id) {
            Some(row) => {
                row.pw_hash = hash;
                Ok(())
            }
            None => Err(AuthError::UserNotFound.into()),
        }
    }

    async fn verify_credentials(&self, email: &str, plain: &str) -> Result<User, AppError> {
        // Copy out what we need so the hash check runs unlocked.
        let row = {
            let inner = self.lock();
            inner
                .by_email
                .get(email)
                .and_then(|id| inner.users.get(id))
                .cloned()
        };

        let row = row.ok_or(AuthError::InvalidCredentials)?;
        if row.pw_hash.is_empty() {
            return Err(AuthError::InvalidCredentials.into());
        }
        if !verify_blocking(plain.to_string(), row.pw_hash).await? {
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(row.user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let inner = self.lock();
        Ok(inner.users.get(id).map(|row| row.user.clone()))
    }

    async fn remove_user(&self, id: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(row) = inner.users.remove(id) {
            inner.by_email.remove(&row.user.email);
        }
        inner.refresh.retain(|_, rec| rec.user_id != id);
        Ok(())
    }

    async fn save_refresh(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        inner.refresh.insert(
            token.to_string(),
            RefreshRecord {
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn rotate_refresh(
        &self,
        old: &str,
        new: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();

        match inner.refresh.get(old) {
            Some(rec) if rec.user_id == user_id && !rec.is_expired() => {}
            _ => return Err(AuthError::RefreshInvalid.into()),
        }

        inner.refresh.remove(old);
        inner.refresh.insert(
            new.to_string(),
            RefreshRecord {
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn lookup_refresh(&self, token: &str) -> Result<Option<RefreshRecord>, AppError> {
        let inner = self.lock();
        Ok(inner.refresh.get(token).cloned())
    }

    async fn delete_refresh(&self, token: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        inner.refresh.remove(token);
        Ok(())
    }
}
