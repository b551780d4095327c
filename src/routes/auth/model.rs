use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::auth::TokenPair;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub google_uid: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub access_token: String,
}

/// Subset of Google's userinfo answer we rely on.
#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug)]
pub struct GoogleProfile {
    pub google_uid: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

impl GoogleUserInfo {
    pub fn into_profile(self) -> Option<GoogleProfile> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Some(GoogleProfile {
            google_uid: non_empty(self.id)?,
            email: non_empty(self.email)?,
            name: non_empty(self.name)?,
            picture: self.picture,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub google_uid: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            google_uid: user.google_uid,
            email: user.email,
            name: user.name,
            picture: user.picture,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserResponse>,
}

impl TokenResponse {
    pub fn new(pair: TokenPair, user_info: Option<UserResponse>) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: pair.token_type,
            expires_in: pair.expires_in,
            user_info,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UserResponse,
}

const USER_COLUMNS: &str = "id, google_uid, email, name, picture, created_at, updated_at";

impl User {
    /// Inserts the Google account or refreshes its profile fields.
    pub async fn upsert_google(pool: &PgPool, profile: &GoogleProfile) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO users (google_uid, email, name, picture) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (google_uid) DO UPDATE \
             SET email = EXCLUDED.email, name = EXCLUDED.name, picture = EXCLUDED.picture, updated_at = NOW() \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&profile.google_uid)
            .bind(&profile.email)
            .bind(&profile.name)
            .bind(&profile.picture)
            .fetch_one(pool)
            .await?;

        tracing::info!("signed in user {} ({})", user.id, user.email);
        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
