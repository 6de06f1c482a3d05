//! Authentication commands: run a provider flow, update the shared config,
//! and print the discovered calendar list.

use serde_json::{Map, Value};
use tracing::debug;

use calwidget_providers::google::{GoogleClientConfig, GoogleFlow};
use calwidget_providers::nextcloud::{NextcloudCredentials, NextcloudFlow};
use calwidget_providers::{
    CalendarList, TokenStore, discover_calendars, ensure_credential, resolve_endpoints,
};

use crate::error::{CliError, CliResult};
use crate::paths;

/// Runs the Google flow and prints the calendar list.
pub async fn google(
    client_id: Option<String>,
    client_secret: Option<String>,
    port: Option<u16>,
    store: &TokenStore,
) -> CliResult<()> {
    let client_config = match (client_id, client_secret) {
        (Some(id), Some(secret)) => {
            debug!("using Google OAuth credentials supplied on the command line");
            GoogleClientConfig::new(id, secret)
        }
        // Partial CLI credentials fall back to the file, same as none.
        _ => GoogleClientConfig::from_credentials_file(&paths::google_credentials_path(store))?,
    };

    let flow = GoogleFlow::new(
        client_config,
        store.clone(),
        port,
        paths::REQUEST_TIMEOUT,
    )?;
    let credential = ensure_credential(&flow).await?;

    let mut patch = Map::new();
    patch.insert("provider".to_string(), Value::String("google".to_string()));
    patch.insert(
        "access_token".to_string(),
        Value::String(credential.access_token.clone()),
    );
    store.merge_shared_config(patch)?;

    let listing =
        discover_calendars("", &credential.access_token, paths::REQUEST_TIMEOUT).await;
    print_json(&listing)
}

/// Runs the Nextcloud flow and prints the calendar list.
pub async fn nextcloud(
    auth_endpoint: Option<String>,
    token_endpoint: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    port: Option<u16>,
    store: &TokenStore,
) -> CliResult<()> {
    let (server_url, client_id, client_secret) = resolve_nextcloud_client(
        auth_endpoint.as_deref(),
        client_id,
        client_secret,
        store,
    )?;

    let endpoints = resolve_endpoints(
        server_url.as_deref(),
        auth_endpoint.as_deref(),
        token_endpoint.as_deref(),
    );
    debug!(
        "resolved endpoints: server={} auth={} token={}",
        endpoints.server_url, endpoints.auth_endpoint, endpoints.token_endpoint
    );

    let flow = NextcloudFlow::new(
        endpoints,
        client_id,
        client_secret,
        store.clone(),
        port,
        paths::REQUEST_TIMEOUT,
    );
    let credential = ensure_credential(&flow).await?;
    let server = flow.server_url().to_string();

    let mut patch = Map::new();
    patch.insert(
        "provider".to_string(),
        Value::String("nextcloud".to_string()),
    );
    patch.insert("nextcloud_server".to_string(), Value::String(server.clone()));
    patch.insert(
        "access_token".to_string(),
        Value::String(credential.access_token.clone()),
    );
    store.merge_shared_config(patch)?;

    let listing =
        discover_calendars(&server, &credential.access_token, paths::REQUEST_TIMEOUT).await;
    print_json(&listing)
}

/// Resolves the Nextcloud client configuration.
///
/// A complete CLI triple (auth endpoint + client id + client secret) wins
/// and skips the credentials file entirely; the server URL is then derived
/// from the endpoints by the resolver. Otherwise
/// `nextcloud_credentials.json` is required, with CLI values overriding
/// file values field by field.
fn resolve_nextcloud_client(
    auth_endpoint: Option<&str>,
    cli_client_id: Option<String>,
    cli_client_secret: Option<String>,
    store: &TokenStore,
) -> CliResult<(Option<String>, String, String)> {
    if auth_endpoint.is_some()
        && let (Some(id), Some(secret)) = (&cli_client_id, &cli_client_secret)
    {
        return Ok((None, id.clone(), secret.clone()));
    }

    let creds = NextcloudCredentials::from_file(&paths::nextcloud_credentials_path(store))?;
    let client_id = cli_client_id.or(creds.client_id);
    let client_secret = cli_client_secret.or(creds.client_secret);

    match (creds.server_url, client_id, client_secret) {
        (Some(server), Some(id), Some(secret))
            if !server.is_empty() && !id.is_empty() && !secret.is_empty() =>
        {
            Ok((Some(server), id, secret))
        }
        _ => Err(CliError::Config(
            "nextcloud_credentials.json must contain server_url, client_id, and client_secret"
                .to_string(),
        )),
    }
}

/// Prints the one stdout payload of an authentication run.
fn print_json(listing: &CalendarList) -> CliResult<()> {
    let json = serde_json::to_string(listing)
        .map_err(|e| CliError::Internal(format!("failed to serialize calendar list: {}", e)))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(creds: Option<&str>) -> (tempfile::TempDir, TokenStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(tmp.path());
        if let Some(content) = creds {
            std::fs::write(tmp.path().join("nextcloud_credentials.json"), content).unwrap();
        }
        (tmp, store)
    }

    #[test]
    fn complete_cli_triple_skips_credentials_file() {
        let (_tmp, store) = store_with(None);
        let (server, id, secret) = resolve_nextcloud_client(
            Some("https://cloud.example.com/authorize"),
            Some("cli-id".to_string()),
            Some("cli-secret".to_string()),
            &store,
        )
        .unwrap();

        assert_eq!(server, None);
        assert_eq!(id, "cli-id");
        assert_eq!(secret, "cli-secret");
    }

    #[test]
    fn credentials_file_fills_missing_values() {
        let (_tmp, store) = store_with(Some(
            r#"{"server_url":"https://cloud.example.com","client_id":"file-id","client_secret":"file-secret"}"#,
        ));
        let (server, id, secret) =
            resolve_nextcloud_client(None, None, None, &store).unwrap();

        assert_eq!(server.as_deref(), Some("https://cloud.example.com"));
        assert_eq!(id, "file-id");
        assert_eq!(secret, "file-secret");
    }

    #[test]
    fn cli_values_override_file_values() {
        let (_tmp, store) = store_with(Some(
            r#"{"server_url":"https://cloud.example.com","client_id":"file-id","client_secret":"file-secret"}"#,
        ));
        let (_, id, secret) = resolve_nextcloud_client(
            None,
            Some("cli-id".to_string()),
            None,
            &store,
        )
        .unwrap();

        assert_eq!(id, "cli-id");
        assert_eq!(secret, "file-secret");
    }

    #[test]
    fn incomplete_credentials_file_is_rejected() {
        let (_tmp, store) =
            store_with(Some(r#"{"server_url":"https://cloud.example.com"}"#));
        let err = resolve_nextcloud_client(None, None, None, &store).unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn missing_credentials_file_is_a_config_error() {
        let (_tmp, store) = store_with(None);
        // auth endpoint alone is not enough without a client id/secret
        let result = resolve_nextcloud_client(
            Some("https://cloud.example.com/authorize"),
            None,
            None,
            &store,
        );
        assert!(result.is_err());
    }
}
