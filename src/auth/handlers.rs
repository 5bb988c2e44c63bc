use actix_web::{web, HttpResponse, HttpRequest};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, error};

use crate::error::{AppError, AuthError};
use crate::store::User;
use crate::AppState;

use super::service::TokenPair;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Token envelope returned by register, login, and refresh. Expiries are
/// relative seconds, computed at response time.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub access_expires_in: i64,
    pub refresh_token: String,
    pub refresh_expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl SessionResponse {
    fn new(tokens: TokenPair, user: Option<User>) -> Self {
        let now = Utc::now();
        Self {
            access_token: tokens.access_token,
            access_expires_in: (tokens.access_expires_at - now).num_seconds(),
            refresh_token: tokens.refresh_token,
            refresh_expires_in: (tokens.refresh_expires_at - now).num_seconds(),
            user,
        }
    }
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);

    match state
        .auth
        .register(&req.email, req.name.as_deref(), &req.password)
        .await
    {
        Ok(session) => {
            info!("Registration successful for email: {}", req.email);
            Ok(HttpResponse::Created()
                .json(SessionResponse::new(session.tokens, Some(session.user))))
        }
        Err(e) => {
            error!("Registration failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);

    match state.auth.login(&req.email, &req.password).await {
        Ok(session) => {
            info!("Login successful for email: {}", req.email);
            Ok(HttpResponse::Ok().json(SessionResponse::new(session.tokens, Some(session.user))))
        }
        Err(e) => {
            error!("Login failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.auth.refresh(&req.refresh_token).await {
        Ok(tokens) => Ok(HttpResponse::Ok().json(SessionResponse::new(tokens, None))),
        Err(e) => {
            error!("Refresh rotation failed: {}", e);
            Err(e)
        }
    }
}

pub async fn logout(
    req: web::Json<LogoutRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth.logout(&req.refresh_token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

pub async fn me(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&req)?;
    let claims = state.auth.verify_access(token)?;
    let user = state.auth.get_profile(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(user))
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AppError> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AuthError::TokenInvalid.into())
}
