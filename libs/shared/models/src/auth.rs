use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Display name from the auth provider's user metadata, if any.
    pub fn display_name(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("full_name").or_else(|| meta.get("name")))
            .and_then(|name| name.as_str())
            .map(str::to_string)
    }
}

/// A signed-in user together with the bearer token the backend expects
/// on every request made on their behalf.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub access_token: String,
}

impl Session {
    pub fn new(user: User, access_token: impl Into<String>) -> Self {
        Self {
            user,
            access_token: access_token.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}
