use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::non_blank;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const LIKED_SONGS_NAME: &str = "Liked Songs";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_artist: bool,
    #[serde(default)]
    pub is_distributor: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_artist: bool,
    pub is_distributor: bool,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What other users get to see.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_artist: bool,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            bio: user.bio,
            avatar_url: user.avatar_url,
            is_artist: user.is_artist,
            follower_count: user.follower_count,
            following_count: user.following_count,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
}

impl RegisterRequest {
    /// Names of required fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if non_blank(&self.username).is_none() {
            missing.push("username".to_string());
        }
        if non_blank(&self.email).is_none() {
            missing.push("email".to_string());
        }
        if self.password.as_deref().map_or(true, str::is_empty) {
            missing.push("password".to_string());
        }
        missing
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    pub identifier: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.display_name.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoles {
    pub is_admin: Option<bool>,
    pub is_artist: Option<bool>,
    pub is_distributor: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_reports_all_missing_fields() {
        let req: RegisterRequest = serde_json::from_str(r#"{"username": "  "}"#).unwrap();
        assert_eq!(req.missing_fields(), vec!["username", "email", "password"]);

        let req: RegisterRequest = serde_json::from_str(
            r#"{"username": "ana", "email": "ana@example.com", "password": "longenough"}"#,
        )
        .unwrap();
        assert!(req.missing_fields().is_empty());
    }

    #[test]
    fn login_accepts_username_or_email_keys() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email": "ana@example.com", "password": "x"}"#).unwrap();
        assert_eq!(req.identifier.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn profile_update_rejects_unknown_fields() {
        let err = serde_json::from_str::<UpdateProfile>(r#"{"is_admin": true}"#);
        assert!(err.is_err());
    }
}
