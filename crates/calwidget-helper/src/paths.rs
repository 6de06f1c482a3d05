//! File locations and shared request settings.

use std::path::PathBuf;
use std::time::Duration;

use calwidget_providers::TokenStore;

/// User-supplied Google OAuth client file.
pub const GOOGLE_CREDENTIALS_FILE: &str = "credentials.json";
/// User-supplied Nextcloud OAuth client file.
pub const NEXTCLOUD_CREDENTIALS_FILE: &str = "nextcloud_credentials.json";

/// Timeout applied to every provider HTTP request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Path of `credentials.json` inside the store directory.
pub fn google_credentials_path(store: &TokenStore) -> PathBuf {
    store.dir().join(GOOGLE_CREDENTIALS_FILE)
}

/// Path of `nextcloud_credentials.json` inside the store directory.
pub fn nextcloud_credentials_path(store: &TokenStore) -> PathBuf {
    store.dir().join(NEXTCLOUD_CREDENTIALS_FILE)
}
