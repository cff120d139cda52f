use crate::common::TokenPair;
use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;

/// Durable home of the access/refresh token pair.
///
/// Implementations replace the pair as a unit: a reader sees either the
/// previous pair or the new one, never one token from each.
pub trait TokenStore: Send + Sync {
    fn save(&self, pair: &TokenPair) -> Result<(), AuthError>;

    fn load(&self) -> Result<Option<TokenPair>, AuthError>;

    fn clear(&self) -> Result<(), AuthError>;
}

/// On-disk layout, keyed the same way the web frontend keys local storage
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(rename = "auth_token", default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
}

impl StoredTokens {
    fn into_pair(self) -> Option<TokenPair> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() => {
                let mut pair = TokenPair::bearer(access, refresh);
                if let Some(token_type) = self.token_type {
                    pair.token_type = token_type;
                }
                Some(pair)
            }
            _ => None,
        }
    }
}

impl From<&TokenPair> for StoredTokens {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
            token_type: Some(pair.token_type.clone()),
        }
    }
}

pub struct FileTokenStore {
    token_path: PathBuf,
}

impl FileTokenStore {
    /// Store under the user cache directory (`<cache>/snippets/tokens.json`)
    pub fn new() -> Result<Self, AuthError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find cache directory".to_string()))?
            .join("snippets");
        Self::at(cache_dir.join("tokens.json"))
    }

    pub fn at(token_path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let token_path = token_path.into();

        if let Some(parent) = token_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    AuthError::TokenStorage(format!("Failed to create token directory: {}", e))
                })?;
            }
        }

        Ok(Self { token_path })
    }

    pub fn path(&self) -> &Path {
        &self.token_path
    }

    fn token_dir(&self) -> &Path {
        match self.token_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, pair: &TokenPair) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(&StoredTokens::from(pair))?;

        // Each save gets its own temp file so concurrent writers never share one
        let mut temp = NamedTempFile::new_in(self.token_dir())
            .map_err(|e| AuthError::TokenStorage(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(json.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| AuthError::TokenStorage(format!("Failed to save token: {}", e)))?;

        // Set permissions to 0600 (read/write for owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o600)).map_err(|e| {
                AuthError::TokenStorage(format!("Failed to set file permissions: {}", e))
            })?;
        }

        // rename is atomic on the same filesystem
        temp.persist(&self.token_path).map_err(|e| {
            AuthError::TokenStorage(format!("Failed to replace token file: {}", e.error))
        })?;

        Ok(())
    }

    fn load(&self) -> Result<Option<TokenPair>, AuthError> {
        let json = match fs::read_to_string(&self.token_path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::TokenStorage(format!(
                    "Failed to read token: {}",
                    e
                )))
            }
        };

        let stored: StoredTokens = serde_json::from_str(&json)?;
        Ok(stored.into_pair())
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.token_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::TokenStorage(format!(
                "Failed to delete token: {}",
                e
            ))),
        }
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, pair: &TokenPair) -> Result<(), AuthError> {
        *self.pair.write().unwrap_or_else(|e| e.into_inner()) = Some(pair.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<TokenPair>, AuthError> {
        Ok(self.pair.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.pair.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
