//! Google OAuth client configuration.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{HelperError, HelperResult};

/// OAuth 2.0 client id and secret for an installed (desktop) application.
///
/// Users supply these either directly on the command line or through the
/// `credentials.json` downloaded from the Google Cloud Console.
#[derive(Debug, Clone)]
pub struct GoogleClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// The relevant slice of Google's credentials JSON file.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: InstalledSection,
}

#[derive(Debug, Deserialize)]
struct InstalledSection {
    client_id: String,
    client_secret: String,
}

impl GoogleClientConfig {
    /// Creates a client config from explicit values.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads the client config from a `credentials.json` file.
    ///
    /// The file must carry an `installed` section (the installed-app flow);
    /// a `web` credential or anything else is rejected with a message that
    /// names the keys actually present.
    pub fn from_credentials_file(path: &Path) -> HelperResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HelperError::configuration(format!(
                "either provide client_id and client_secret as arguments, or place \
                 credentials.json in {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parses the client config from credentials JSON.
    pub fn from_json(json: &str) -> HelperResult<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| {
            HelperError::configuration(format!("credentials.json is not valid JSON: {}", e))
        })?;

        if value.get("installed").is_none() {
            let keys: Vec<&str> = value
                .as_object()
                .map(|obj| obj.keys().map(String::as_str).collect())
                .unwrap_or_default();
            return Err(HelperError::configuration(format!(
                "credentials.json must have 'installed' key. Current keys: {:?}",
                keys
            )));
        }

        let file: CredentialsFile = serde_json::from_value(value).map_err(|e| {
            HelperError::configuration(format!("invalid 'installed' section: {}", e))
        })?;

        Ok(Self::new(file.installed.client_id, file.installed.client_secret))
    }

    /// Checks that both values are present.
    pub fn validate(&self) -> HelperResult<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(HelperError::configuration(
                "Google client_id and client_secret must both be non-empty",
            ));
        }
        Ok(())
    }
}
