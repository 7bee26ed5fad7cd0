//! Durable on-disk token and client-registration cache.
//!
//! Persisted records are keyed by the connection fingerprint (computed by
//! `mcpfuse-core`) rather than by upstream URL alone, so two proxy instances
//! pointed at the same URL with different headers never share a cache entry.
//! Tokens and client registrations live in separate `{fingerprint}_tokens.json`
//! / `{fingerprint}_client_info.json` files rather than one combined record,
//! per the on-disk layout this proxy exposes to operators inspecting the
//! cache directory by hand. File permission handling follows the
//! `0o600`-for-secrets convention used for the unix socket transport in
//! `turbomcp-unix::transport` — this directory holds access and refresh
//! tokens, so it gets the same treatment.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// A persisted OAuth token pair for one upstream connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// ISO-8601 instant after which `access_token` should be treated as
    /// expired. `None` means the server did not report an expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl StoredTokens {
    /// True whenever `now + 30s` is at or past `expires_at`, a safety
    /// margin that leaves time for a refresh to complete before the real
    /// deadline. A token with no reported expiry is never expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + chrono::Duration::seconds(30) >= expires_at,
            None => false,
        }
    }
}

/// A persisted dynamic client registration for one upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredClient {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Reads and writes per-fingerprint JSON files under a base directory.
/// Every read and write happens through a single in-process async mutex per
/// call site at the `provider` layer; this type itself does plain blocking
/// file IO since records are small and writes are infrequent.
#[derive(Debug, Clone)]
pub struct TokenStore {
    base_dir: PathBuf,
}

impl TokenStore {
    /// Opens (creating if necessary) a token store rooted at `base_dir`.
    /// The directory is created with `0o700` and each record file with
    /// `0o600` on unix so only the owning user can read cached secrets.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&base_dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self { base_dir })
    }

    fn tokens_path(&self, fingerprint: &str) -> PathBuf {
        self.base_dir.join(format!("{fingerprint}_tokens.json"))
    }

    fn client_path(&self, fingerprint: &str) -> PathBuf {
        self.base_dir.join(format!("{fingerprint}_client_info.json"))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents).ok())
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(value)?;
        std::fs::write(path, contents)?;
        set_owner_only_permissions(path)?;
        Ok(())
    }

    pub fn load_tokens(&self, fingerprint: &str) -> Result<Option<StoredTokens>> {
        Self::read_json(&self.tokens_path(fingerprint))
    }

    pub fn save_tokens(&self, fingerprint: &str, tokens: StoredTokens) -> Result<()> {
        debug!(fingerprint, "persisted tokens");
        Self::write_json(&self.tokens_path(fingerprint), &tokens)
    }

    pub fn load_client(&self, fingerprint: &str) -> Result<Option<StoredClient>> {
        Self::read_json(&self.client_path(fingerprint))
    }

    pub fn save_client(&self, fingerprint: &str, client: StoredClient) -> Result<()> {
        debug!(fingerprint, "persisted dynamic client registration");
        Self::write_json(&self.client_path(fingerprint), &client)
    }

    /// Removes both the token and client-registration records for
    /// `fingerprint`, if present.
    pub fn clear(&self, fingerprint: &str) -> Result<()> {
        for path in [self.tokens_path(fingerprint), self.client_path(fingerprint)] {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
