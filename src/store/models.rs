use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered account. The password hash never leaves the store, so it
/// is not part of this model.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    pub fn new(email: String, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            name,
        }
    }
}

/// One live refresh token binding. The token value itself is the key and
/// is not repeated here.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshRecord {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
