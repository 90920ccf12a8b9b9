//! Authentication-related models

use secrecy::{ExposeSecret, Secret};
use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};
use serde_json::Value;
use validator::Validate;

/// Login request
#[derive(Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: Secret<String>,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
        }
    }
}

impl Serialize for LoginRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LoginRequest", 2)?;
        state.serialize_field("username", &self.username)?;
        state.serialize_field("password", self.password.expose_secret())?;
        state.end()
    }
}

/// Registration request
#[derive(Debug, Clone, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 150, message = "Username must be 3-150 characters"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Access + refresh token pair
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .finish()
    }
}

/// Login / register response
///
/// `user` is kept raw and normalized by [`crate::models::user::User::from_payload`].
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Value,
    pub tokens: TokenPair,
    #[serde(default)]
    pub message: Option<String>,
}

/// Token refresh request
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Token refresh response (the backend may rotate the refresh token)
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Profile update
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,
}

/// Change password request
#[derive(Debug, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub old_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub new_password_confirm: String,
}

impl Serialize for ChangePasswordRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ChangePasswordRequest", 2)?;
        state.serialize_field("old_password", &self.old_password)?;
        state.serialize_field("new_password", &self.new_password)?;
        state.end()
    }
}
