use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Overrides the token file location under the user cache directory
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            frontend_url: default_frontend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            token_path: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SNIPPETS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::from_file(&config_path)
    }

    pub fn from_file(config_path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SNIPPETS").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_url.is_empty() {
            return Err("api_url is required".to_string());
        }
        if !self.api_url.starts_with("http") {
            return Err("api_url must be a valid HTTP(S) URL".to_string());
        }
        if !self.frontend_url.starts_with("http") {
            return Err("frontend_url must be a valid HTTP(S) URL".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Where an expired session sends the user
    pub fn login_url(&self) -> String {
        format!("{}/login", self.frontend_url.trim_end_matches('/'))
    }
}
