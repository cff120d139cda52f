use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Token pair issued by login, registration, refresh and the Google flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl TokenPair {
    pub fn bearer(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: default_token_type(),
        }
    }
}

/// Profile returned by `GET /auth/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// The API emits both offset-qualified and naive timestamps; naive ones are UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

/// Response of `POST /auth/register`. Either half may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<TokenPair>,
}

#[derive(Clone, Serialize)]
pub struct RegisterData {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Clone, Serialize)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Serialize)]
pub struct ChangePasswordData {
    pub old_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

/// Body of `POST /auth/google/complete-register`.
/// `registration_token` is handed to the frontend by the Google callback redirect.
#[derive(Clone, Serialize)]
pub struct GoogleRegisterData {
    pub password: String,
    pub confirm_password: String,
    pub registration_token: String,
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for RegisterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterData")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("confirm_password", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for LoginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginData")
            .field("email", &self.email)
            .field("password", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for ChangePasswordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordData")
            .field("old_password", &REDACTED)
            .field("new_password", &REDACTED)
            .field("confirm_new_password", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for GoogleRegisterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleRegisterData")
            .field("password", &REDACTED)
            .field("confirm_password", &REDACTED)
            .field("registration_token", &REDACTED)
            .finish()
    }
}
