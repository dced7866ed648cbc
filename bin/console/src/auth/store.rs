//! Token persistence.
//!
//! The console is a short-lived process: the pending authorization written
//! by `login` must survive until `login <callback-url>` runs, and tokens
//! must survive between commands.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickmenos_core::Result;
use clickmenos_platform_access::{AuthenticationError, TokenValidity};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Tokens obtained from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Absent when the provider did not say how long the token lives.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Returns true if the access token has not expired at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }

    /// Returns the issue and expiry instants, when the expiry is known.
    #[must_use]
    pub fn validity(&self) -> Option<TokenValidity> {
        self.expires_at
            .map(|expires_at| TokenValidity::new(self.issued_at, expires_at))
    }
}

/// An authorization request waiting for its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// CSRF state sent with the request.
    pub state: String,
    /// PKCE code verifier for the token exchange.
    pub pkce_verifier: String,
    /// Nonce the ID token must echo.
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the console keeps between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub tokens: Option<TokenSet>,
    #[serde(default)]
    pub pending: Option<PendingAuthorization>,
}

/// Storage for [`PersistedState`].
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads the persisted state. A store that was never written is empty.
    async fn load(&self) -> Result<PersistedState, AuthenticationError>;

    /// Replaces the persisted state.
    async fn save(&self, state: &PersistedState) -> Result<(), AuthenticationError>;
}

fn storage_error(action: &str, path: &Path, err: impl std::fmt::Display) -> AuthenticationError {
    AuthenticationError::Storage {
        reason: format!("failed to {action} {}: {err}", path.display()),
    }
}

/// JSON file store, written through on every save.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Creates a store backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<PersistedState, AuthenticationError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no token file yet");
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(storage_error("read", &self.path, e).into()),
        };

        let state = serde_json::from_slice(&bytes)
            .map_err(|e| storage_error("parse", &self.path, e))?;
        Ok(state)
    }

    async fn save(&self, state: &PersistedState) -> Result<(), AuthenticationError> {
        let _guard = self.write_lock.lock().await;

        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| storage_error("serialize", &self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create directory for", &self.path, e))?;
        }

        // Write to a sibling and rename so a crash never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error("write", &tmp, e))?;

        // Tokens and the PKCE verifier are secrets: owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp, perms)
                .await
                .map_err(|e| storage_error("restrict permissions of", &tmp, e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error("replace", &self.path, e))?;

        tracing::debug!(path = %self.path.display(), "token state saved");
        Ok(())
    }
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: Mutex<PersistedState>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<PersistedState, AuthenticationError> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), AuthenticationError> {
        *self.state.lock().await = state.clone();
        Ok(())
    }
}
