//! Identity credential list and on-disk token cache
//!
//! The credential list is a plain text file of `handle:secret` lines, one
//! identity per line, read once at startup. Order is significant: it becomes
//! the pool's rotation order.
//!
//! The token cache is an optional JSON file mapping handles to their last
//! accepted token pair so a restarted run does not need a human for every
//! identity. All writes use atomic temp-file + rename with 0600 permissions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// One line of the credential list.
#[derive(Debug, Clone)]
pub struct CredentialEntry {
    pub handle: String,
    pub secret: Secret<String>,
}

/// Parse `handle:secret` lines. Blank lines and `#` comments are skipped; the
/// secret is everything after the first `:` so it may itself contain colons.
pub fn parse_credential_list(text: &str) -> Result<Vec<CredentialEntry>> {
    let mut entries = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (handle, secret) = line.split_once(':').ok_or_else(|| {
            Error::CredentialParse(format!("line {}: expected `handle:secret`", lineno + 1))
        })?;
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(Error::CredentialParse(format!(
                "line {}: empty handle",
                lineno + 1
            )));
        }
        if entries.iter().any(|e: &CredentialEntry| e.handle == handle) {
            return Err(Error::CredentialParse(format!(
                "line {}: duplicate handle {handle}",
                lineno + 1
            )));
        }
        entries.push(CredentialEntry {
            handle: handle.to_string(),
            secret: Secret::new(secret.to_string()),
        });
    }
    Ok(entries)
}

/// Load and parse the credential list file.
pub async fn load_credential_list(path: &Path) -> Result<Vec<CredentialEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("reading credential list {}: {e}", path.display())))?;
    let entries = parse_credential_list(&text)?;
    info!(path = %path.display(), identities = entries.len(), "loaded credential list");
    Ok(entries)
}

/// A persisted token pair.
///
/// `issued_at` is unix seconds at the moment the pair was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access: String,
    pub refresh: String,
    pub issued_at: u64,
    pub lifetime_secs: u64,
}

/// File-backed map of handle → last accepted token pair.
pub struct TokenCache {
    path: PathBuf,
    state: HashMap<String, CachedToken>,
}

impl TokenCache {
    /// Load the cache, starting empty when the file does not exist yet.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token cache: {e}")))?;
            let tokens: HashMap<String, CachedToken> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing token cache: {e}")))?;
            info!(path = %path.display(), identities = tokens.len(), "loaded token cache");
            tokens
        } else {
            info!(path = %path.display(), "token cache not found, starting empty");
            HashMap::new()
        };
        Ok(Self { path, state })
    }

    pub fn get(&self, handle: &str) -> Option<&CachedToken> {
        self.state.get(handle)
    }

    /// Record a new pair for `handle` and persist the whole cache.
    pub async fn put(&mut self, handle: &str, token: CachedToken) -> Result<()> {
        self.state.insert(handle.to_string(), token);
        debug!(handle, "cached token pair");
        write_atomic(&self.path, &self.state).await
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

async fn write_atomic(path: &Path, data: &HashMap<String, CachedToken>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing token cache: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token cache path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".token-cache.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token cache: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token cache permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token cache: {e}")))?;

    debug!(path = %path.display(), "persisted token cache");
    Ok(())
}
