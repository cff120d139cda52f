use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// FastAPI error body: `{"detail": "..."}` or `{"detail": [{"msg": "..."}, ...]}`
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl ErrorDetail {
    pub fn into_messages(self) -> Vec<String> {
        match self {
            ErrorDetail::Message(msg) => vec![msg],
            ErrorDetail::Fields(fields) => fields
                .into_iter()
                .map(|field| match field.msg {
                    Some(msg) => msg,
                    None => serde_json::Value::Object(field.rest).to_string(),
                })
                .collect(),
        }
    }
}

/// Decode an error response body into user-facing messages
pub fn error_messages(status: StatusCode, body: &str) -> Vec<String> {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.detail.into_messages();
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return vec![trimmed.to_string()];
    }
    vec![status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()]
}

#[derive(Debug)]
pub enum AuthClientError {
    Http(reqwest::Error),
    Status {
        status: StatusCode,
        messages: Vec<String>,
    },
}

impl AuthClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) => e.status(),
            Self::Status { status, .. } => Some(*status),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    pub fn into_messages(self) -> Vec<String> {
        match self {
            Self::Http(e) => vec![e.to_string()],
            Self::Status { messages, .. } => messages,
        }
    }
}

impl std::fmt::Display for AuthClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::Status { status, messages } => {
                write!(f, "Server returned {}: {}", status, messages.join("; "))
            }
        }
    }
}

impl std::error::Error for AuthClientError {}

impl From<reqwest::Error> for AuthClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}
