pub mod auth;
pub mod config;
pub mod error;
pub mod store;

use std::sync::Arc;
use actix_web::HttpResponse;

pub use error::{AppError, AuthError, StorageError};
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, AuthSession, TokenPair, TokenSigner};
pub use store::{CredentialStore, RefreshRecord, User};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        // Build the credential store selected by configuration
        let store = store::connect(&config).await?;

        let signer = TokenSigner::new(config.auth.jwt_secret.clone());
        let auth = AuthService::new(
            store,
            signer,
            config.auth.access_ttl_minutes,
            config.auth.refresh_ttl_days,
        );

        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_creation() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::new(config).await.expect("memory backend needs no I/O");

        // The memory backend is usable immediately
        let session = state
            .auth
            .register("state@test.com", None, "secret1")
            .await
            .unwrap();
        assert_eq!(session.user.email, "state@test.com");
    }

    #[tokio::test]
    async fn test_app_state_unknown_backend() {
        let mut config = Settings::new_for_test().expect("Failed to load test config");
        config.database.backend = "oracle".to_string();

        match AppState::new(config).await {
            Err(AppError::Config(_)) => {}
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_app_state_clone() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::new(config).await.unwrap();

        let cloned = state.clone();

        // Verify Arc references are shared
        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert!(Arc::ptr_eq(&state.auth, &cloned.auth));
    }
}
