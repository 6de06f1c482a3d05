//! Nextcloud OCS identity lookup.
//!
//! CalDAV paths are rooted at `calendars/{username}/`, but OAuth tokens do
//! not carry the username; it has to be asked for via the OCS user
//! endpoint. Resolution failures are soft: callers build the best path
//! they can without it.

use serde_json::Value;
use tracing::debug;

/// Fetches the authenticated user's id, or `None` if the lookup fails in
/// any way.
pub async fn fetch_username(
    client: &reqwest::Client,
    server_url: &str,
    access_token: &str,
) -> Option<String> {
    let url = format!("{}/ocs/v2.php/cloud/user", server_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        debug!("user lookup returned {}", response.status());
        return None;
    }

    let body = response.text().await.ok()?;
    let payload: Value = serde_json::from_str(&body).ok()?;
    username_from_ocs(&payload)
}

/// Extracts the user id from an OCS envelope (`{ocs: {data: {id: ...}}}`).
pub fn username_from_ocs(payload: &Value) -> Option<String> {
    payload
        .get("ocs")?
        .get("data")?
        .get("id")?
        .as_str()
        .map(str::to_string)
}
