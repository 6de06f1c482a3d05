//! Nextcloud OAuth client configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::{HelperError, HelperResult};

/// User-supplied Nextcloud OAuth client, from `nextcloud_credentials.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct NextcloudCredentials {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl NextcloudCredentials {
    /// Loads the credentials file, with a format hint when it is missing.
    pub fn from_file(path: &Path) -> HelperResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|_| {
            HelperError::configuration(format!(
                "place nextcloud_credentials.json in {}\n\
                 Format: {{\"server_url\": \"https://your-nextcloud.com\", \
                 \"client_id\": \"...\", \"client_secret\": \"...\"}}",
                path.display()
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            HelperError::configuration(format!(
                "nextcloud_credentials.json is not valid JSON: {}",
                e
            ))
        })
    }

    /// Checks that all three fields are present and non-empty.
    pub fn validate(&self) -> HelperResult<()> {
        let complete = [&self.server_url, &self.client_id, &self.client_secret]
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()));

        if !complete {
            return Err(HelperError::configuration(
                "nextcloud_credentials.json must contain server_url, client_id, and client_secret",
            ));
        }
        Ok(())
    }
}
