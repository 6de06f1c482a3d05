//! Token and shared-config persistence.
//!
//! One directory under the user's config home holds everything the helper
//! and the widget share: per-provider token files, user-supplied OAuth
//! client credentials, and `config.json`, which the widget reads to learn
//! which provider is active and what access token to use.
//!
//! Reads are tolerant (a missing or corrupt file is treated as absent);
//! writes are flushed and fsynced so a crash right after a save cannot
//! leave a half-written token behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{HelperError, HelperResult};

/// File name of the shared config consumed by the widget.
const SHARED_CONFIG_FILE: &str = "config.json";

/// The calendar providers the helper can authenticate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Nextcloud,
}

impl Provider {
    /// Returns the provider name as used in `config.json` and CLI args.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Nextcloud => "nextcloud",
        }
    }

    /// Returns the token file name for this provider.
    fn token_file(&self) -> &'static str {
        match self {
            Self::Google => "token.json",
            Self::Nextcloud => "nextcloud_token.json",
        }
    }
}

/// Returns the current time as whole seconds since the Unix epoch.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A persisted OAuth credential.
///
/// `extra` round-trips whatever other fields the provider's token response
/// carried (token_type, scope, user_id, ...) so a re-saved file stays
/// compatible with what the server originally issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry as epoch seconds; zero means unknown and is treated as expired.
    #[serde(default)]
    pub expires_at: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credential {
    /// Creates a credential expiring `expires_in` seconds from now.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: now_epoch() + expires_in,
            extra: Map::new(),
        }
    }

    /// Returns true if the access token is still usable.
    ///
    /// An unset (zero) expiry is treated as invalid: we would rather refresh
    /// once too often than hand the widget a dead token.
    pub fn is_valid(&self) -> bool {
        self.expires_at > 0 && now_epoch() < self.expires_at
    }
}

/// File-backed storage for provider tokens and the shared widget config.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Creates a store rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the default store directory (`~/.config/calwidget`).
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calwidget")
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the token file path for a provider.
    pub fn token_path(&self, provider: Provider) -> PathBuf {
        self.dir.join(provider.token_file())
    }

    /// Returns the shared config file path.
    pub fn shared_config_path(&self) -> PathBuf {
        self.dir.join(SHARED_CONFIG_FILE)
    }

    /// Loads the stored credential for a provider.
    ///
    /// A missing or unparseable token file is treated as absent, never as an
    /// error: the caller falls through to a fresh authentication.
    pub fn load(&self, provider: Provider) -> Option<Credential> {
        let path = self.token_path(provider);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                debug!("no token file at {:?}", path);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(cred) => {
                debug!("loaded {} credential from {:?}", provider.as_str(), path);
                Some(cred)
            }
            Err(e) => {
                warn!("ignoring unparseable token file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Saves a credential for a provider, replacing any previous one.
    pub fn save(&self, provider: Provider, cred: &Credential) -> HelperResult<()> {
        let content = serde_json::to_string(cred).map_err(|e| {
            HelperError::internal(format!("failed to serialize token: {}", e))
        })?;
        let path = self.token_path(provider);
        self.write_durable(&path, &content)?;
        debug!("saved {} credential to {:?}", provider.as_str(), path);
        Ok(())
    }

    /// Deletes a provider's token file. Missing files are not an error.
    pub fn delete(&self, provider: Provider) -> HelperResult<()> {
        let path = self.token_path(provider);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("discarded stored {} token", provider.as_str());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HelperError::configuration(format!(
                "failed to remove token file {:?}: {}",
                path, e
            ))),
        }
    }

    /// Loads the shared config as a JSON object, treating any read or parse
    /// failure as an empty object.
    pub fn load_shared_config(&self) -> Map<String, Value> {
        let path = self.shared_config_path();
        fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .and_then(|value| value.as_object().cloned())
            .unwrap_or_default()
    }

    /// Shallow-merges `patch` over the existing shared config and writes the
    /// result back. Keys not present in the patch survive unchanged, so the
    /// widget's own settings are never clobbered.
    pub fn merge_shared_config(&self, patch: Map<String, Value>) -> HelperResult<()> {
        let mut config = self.load_shared_config();
        for (key, value) in patch {
            config.insert(key, value);
        }

        let content = serde_json::to_string(&Value::Object(config)).map_err(|e| {
            HelperError::internal(format!("failed to serialize shared config: {}", e))
        })?;
        self.write_durable(&self.shared_config_path(), &content)
    }

    /// Writes a file fully, then flushes and fsyncs before returning.
    fn write_durable(&self, path: &Path, content: &str) -> HelperResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            HelperError::configuration(format!(
                "failed to create config directory {:?}: {}",
                self.dir, e
            ))
        })?;

        let mut file = File::create(path).map_err(|e| {
            HelperError::configuration(format!("failed to write {:?}: {}", path, e))
        })?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                HelperError::configuration(format!("failed to write {:?}: {}", path, e))
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(path, perms);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, TokenStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn credential_validity() {
        let valid = Credential::new("token", None, 3600);
        assert!(valid.is_valid());

        let mut expired = Credential::new("token", None, 3600);
        expired.expires_at = now_epoch() - 10;
        assert!(!expired.is_valid());

        let mut unset = Credential::new("token", None, 3600);
        unset.expires_at = 0;
        assert!(!unset.is_valid());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (_tmp, store) = temp_store();
        let mut cred = Credential::new("access", Some("refresh".to_string()), 3600);
        cred.extra
            .insert("token_type".to_string(), Value::String("Bearer".to_string()));

        store.save(Provider::Nextcloud, &cred).unwrap();
        let loaded = store.load(Provider::Nextcloud).unwrap();

        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(loaded.expires_at, cred.expires_at);
        assert_eq!(
            loaded.extra.get("token_type"),
            Some(&Value::String("Bearer".to_string()))
        );
    }

    #[test]
    fn providers_use_separate_files() {
        let (_tmp, store) = temp_store();
        store
            .save(Provider::Google, &Credential::new("g", None, 60))
            .unwrap();
        assert!(store.load(Provider::Google).is_some());
        assert!(store.load(Provider::Nextcloud).is_none());
    }

    #[test]
    fn load_tolerates_missing_and_corrupt_files() {
        let (tmp, store) = temp_store();
        assert!(store.load(Provider::Google).is_none());

        fs::write(tmp.path().join("token.json"), "{not json").unwrap();
        assert!(store.load(Provider::Google).is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_tmp, store) = temp_store();
        store.delete(Provider::Google).unwrap();

        store
            .save(Provider::Google, &Credential::new("g", None, 60))
            .unwrap();
        store.delete(Provider::Google).unwrap();
        assert!(store.load(Provider::Google).is_none());
    }

    #[test]
    fn shared_config_merge_preserves_unrelated_keys() {
        let (tmp, store) = temp_store();
        fs::write(
            tmp.path().join("config.json"),
            r#"{"provider":"google","access_token":"old","widget_theme":"dark"}"#,
        )
        .unwrap();

        let mut patch = Map::new();
        patch.insert("provider".to_string(), Value::String("nextcloud".to_string()));
        patch.insert("access_token".to_string(), Value::String("new".to_string()));
        store.merge_shared_config(patch).unwrap();

        let config = store.load_shared_config();
        assert_eq!(config.get("provider"), Some(&Value::String("nextcloud".into())));
        assert_eq!(config.get("access_token"), Some(&Value::String("new".into())));
        assert_eq!(config.get("widget_theme"), Some(&Value::String("dark".into())));
    }

    #[test]
    fn shared_config_merge_tolerates_corrupt_existing_file() {
        let (tmp, store) = temp_store();
        fs::write(tmp.path().join("config.json"), "garbage").unwrap();

        let mut patch = Map::new();
        patch.insert("provider".to_string(), Value::String("google".to_string()));
        store.merge_shared_config(patch).unwrap();

        let config = store.load_shared_config();
        assert_eq!(config.get("provider"), Some(&Value::String("google".into())));
    }
}
