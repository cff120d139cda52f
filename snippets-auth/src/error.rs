use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use crate::client::auth_client::AuthClientError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("No refresh token stored")]
    NoRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] Arc<AuthError>),

    #[error("Request still unauthorized after token refresh")]
    Unauthorized,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid OAuth callback: {0}")]
    InvalidCallback(String),

    #[error("API error ({status}): {}", .messages.join("; "))]
    Api {
        status: StatusCode,
        messages: Vec<String>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token storage error: {0}")]
    TokenStorage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl AuthError {
    /// Field-level messages for inline display
    pub fn messages(&self) -> Vec<String> {
        match self {
            AuthError::ValidationFailed(messages) | AuthError::Api { messages, .. } => {
                messages.clone()
            }
            AuthError::InvalidCredentials(message) => vec![message.clone()],
            other => vec![other.to_string()],
        }
    }
}

impl From<AuthClientError> for AuthError {
    fn from(err: AuthClientError) -> Self {
        match err {
            AuthClientError::Http(e) => AuthError::Http(e),
            AuthClientError::Status { status, messages } => AuthError::Api { status, messages },
        }
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}
