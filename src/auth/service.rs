use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::error::{AppError, AuthError};
use crate::store::{CredentialStore, User};

use super::token::{new_refresh_token, Claims, TokenSigner};

/// A freshly issued access/refresh token pair with absolute expiries.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a registration or login: who, plus their session tokens.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub tokens: TokenPair,
}

/// Orchestrates the session lifecycle: registration, login, refresh
/// rotation, and logout. The store is the only shared state; which
/// backend it is never matters here.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    signer: TokenSigner,
    access_ttl_minutes: i64,
    refresh_ttl_days: i64,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        signer: TokenSigner,
        access_ttl_minutes: i64,
        refresh_ttl_days: i64,
    ) -> Self {
        Self {
            store,
            signer,
            access_ttl_minutes,
            refresh_ttl_days,
        }
    }

    /// Create an account and start its first session.
    ///
    /// User creation and password setting are two store operations; if
    /// the second fails the just-created user is removed again so the
    /// email does not stay burned on a half-finished registration.
    pub async fn register(
        &self,
        email: &str,
        name: Option<&str>,
        password: &str,
    ) -> Result<AuthSession, AppError> {
        if password.is_empty() {
            return Err(AuthError::EmptyPassword.into());
        }

        let user = self.store.create_user(email, name).await?;

        if let Err(e) = self.store.set_password(&user.id, password).await {
            if let Err(cleanup) = self.store.remove_user(&user.id).await {
                warn!("failed to roll back user {} after password error: {}", user.id, cleanup);
            }
            return Err(e);
        }

        let tokens = self.issue_session(&user.id).await?;
        Ok(AuthSession { user, tokens })
    }

    /// Verify credentials and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let user = self.store.verify_credentials(email, password).await?;
        let tokens = self.issue_session(&user.id).await?;
        Ok(AuthSession { user, tokens })
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The old token is consumed atomically; presenting it a second time
    /// fails, which is what makes replayed refresh tokens detectable.
    pub async fn refresh(&self, old_refresh: &str) -> Result<TokenPair, AppError> {
        let record = self
            .store
            .lookup_refresh(old_refresh)
            .await?
            .ok_or(AuthError::RefreshInvalid)?;
        if record.is_expired() {
            return Err(AuthError::RefreshInvalid.into());
        }

        let (access_token, access_expires_at) = self
            .signer
            .issue_access(&record.user_id, self.access_ttl_minutes)?;

        let refresh_token = new_refresh_token();
        let refresh_expires_at = Utc::now() + Duration::days(self.refresh_ttl_days);
        self.store
            .rotate_refresh(
                old_refresh,
                &refresh_token,
                &record.user_id,
                refresh_expires_at,
            )
            .await?;

        Ok(TokenPair {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
        })
    }

    /// Drop the refresh token. Always succeeds from the caller's
    /// viewpoint, whether or not the token existed.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        self.store.delete_refresh(refresh_token).await
    }

    /// Verify an access token presented by the transport layer.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        self.signer.verify(token)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<User, AppError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }

    async fn issue_session(&self, user_id: &str) -> Result<TokenPair, AppError> {
        let (access_token, access_expires_at) =
            self.signer.issue_access(user_id, self.access_ttl_minutes)?;

        let refresh_token = new_refresh_token();
        let refresh_expires_at = Utc::now() + Duration::days(self.refresh_ttl_days);
        self.store
            .save_refresh(&refresh_token, user_id, refresh_expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
        })
    }
}
