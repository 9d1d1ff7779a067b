use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWriteExt, sync::RwLock};
use tracing::{debug, info};

/// How long a login stays valid on this client.
pub const SESSION_LIFETIME: Duration = Duration::hours(12);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    #[serde(default)]
    pub uniq_token: Option<String>,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn issued(
        token: impl Into<String>,
        uniq_token: Option<String>,
        email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            uniq_token,
            email: email.into(),
            expires_at: now + SESSION_LIFETIME,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Shared credential slot handed to the transport and the session flows.
#[derive(Debug, Clone, Default)]
pub struct CredentialContext {
    inner: Arc<RwLock<Option<Credentials>>>,
}

impl CredentialContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(credentials))),
        }
    }

    pub async fn get(&self) -> Option<Credentials> {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, credentials: Credentials) {
        *self.inner.write().await = Some(credentials);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn bearer(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|c| c.token.clone())
    }

    pub async fn email(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|c| c.email.clone())
    }

    /// Drops expired credentials. Returns whether a usable session remains.
    pub async fn ensure_fresh(&self, now: DateTime<Utc>) -> bool {
        let mut guard = self.inner.write().await;
        let Some(credentials) = guard.as_ref() else {
            return false;
        };
        if !credentials.is_expired(now) {
            return true;
        }
        info!(email = %credentials.email, "stored session expired; clearing credentials");
        *guard = None;
        false
    }

    pub async fn load_from(&self, path: &Path) -> Result<bool> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "no stored credentials");
            return Ok(false);
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read credentials from '{}'", path.display()))?;
        let credentials: Credentials = serde_json::from_str(&raw)
            .with_context(|| format!("malformed credentials file '{}'", path.display()))?;
        self.set(credentials).await;
        Ok(true)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let Some(credentials) = self.get().await else {
            return remove_at(path).await;
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create credentials directory '{}'", parent.display())
            })?;
        }
        let raw = serde_json::to_string_pretty(&credentials)?;
        write_private(path, raw.as_bytes())
            .await
            .with_context(|| format!("failed to write credentials to '{}'", path.display()))?;
        Ok(())
    }
}

/// Writes `contents` readable by the owner only. A file left behind with
/// wider permissions is narrowed before it is truncated.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        options.mode(0o600);
        if tokio::fs::try_exists(path).await? {
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }
    }
    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await
}

pub async fn remove_at(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to remove credentials file '{}'", path.display())),
    }
}
