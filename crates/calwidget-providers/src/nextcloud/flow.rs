//! Nextcloud token lifecycle.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::endpoints::ResolvedEndpoints;
use crate::error::{HelperError, HelperResult};
use crate::listener::CallbackListener;
use crate::port::{self, DEFAULT_PORT_RANGE, DEFAULT_PREFERRED_PORT};
use crate::provider::{BoxFuture, TokenProvider};
use crate::store::{Credential, Provider, TokenStore};

use super::oauth::NextcloudOAuthClient;

/// Redirect path registered with the Nextcloud OAuth2 app.
const CALLBACK_PATH: &str = "/oauth-callback";

/// The Nextcloud authorization-code flow.
///
/// Refresh-failure policy: unlike the Google flow, the stored token file is
/// left in place; a failed refresh just forces a new code round-trip in the
/// current run.
pub struct NextcloudFlow {
    oauth: NextcloudOAuthClient,
    store: TokenStore,
    redirect_port: Option<u16>,
}

impl NextcloudFlow {
    pub fn new(
        endpoints: ResolvedEndpoints,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        store: TokenStore,
        redirect_port: Option<u16>,
        timeout: Duration,
    ) -> Self {
        let oauth = NextcloudOAuthClient::new(endpoints, client_id, client_secret, timeout);
        Self {
            oauth,
            store,
            redirect_port,
        }
    }

    /// Returns the resolved server base URL for this account.
    pub fn server_url(&self) -> &str {
        &self.oauth.endpoints().server_url
    }

    async fn acquire_interactive(&self) -> HelperResult<Credential> {
        let port = match self.redirect_port {
            Some(port) => port,
            None => port::find_free_port(DEFAULT_PREFERRED_PORT, DEFAULT_PORT_RANGE)
                .ok_or_else(|| {
                    HelperError::port_exhaustion(format!(
                        "could not find a free local port for the OAuth callback \
                         (tried ports {}-{} on localhost)",
                        DEFAULT_PREFERRED_PORT,
                        DEFAULT_PREFERRED_PORT + DEFAULT_PORT_RANGE - 1
                    ))
                })?,
        };

        let listener = CallbackListener::bind(port)?;
        let redirect_uri = listener.redirect_uri(CALLBACK_PATH);
        eprintln!("Using redirect URI: {}", redirect_uri);
        eprintln!(
            "Make sure this URI is registered in your Nextcloud OAuth app settings (including port)."
        );

        let auth_url = self.oauth.authorize_url(&redirect_uri)?;
        debug!("authorization URL: {}", auth_url);

        info!("opening browser for Nextcloud authentication");
        if let Err(e) = open::that(&auth_url) {
            warn!("failed to open browser: {}", e);
            eprintln!("\nPlease open this URL in your browser:\n\n{}\n", auth_url);
        }

        let captured = listener.wait_for_code()?;
        self.oauth.exchange_code(&captured.code, &redirect_uri).await
    }
}

impl TokenProvider for NextcloudFlow {
    fn name(&self) -> &'static str {
        "nextcloud"
    }

    fn load(&self) -> Option<Credential> {
        self.store.load(Provider::Nextcloud)
    }

    fn refresh<'a>(&'a self, cred: &'a Credential) -> BoxFuture<'a, HelperResult<Credential>> {
        Box::pin(async move {
            let refresh_token = cred.refresh_token.as_deref().ok_or_else(|| {
                HelperError::authentication("no refresh token stored").with_provider("nextcloud")
            })?;
            self.oauth.refresh(refresh_token).await
        })
    }

    fn acquire(&self) -> BoxFuture<'_, HelperResult<Credential>> {
        Box::pin(self.acquire_interactive())
    }

    fn persist(&self, cred: &Credential) -> HelperResult<()> {
        self.store.save(Provider::Nextcloud, cred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::resolve_endpoints;

    fn test_flow(store: TokenStore) -> NextcloudFlow {
        let endpoints = resolve_endpoints(Some("https://cloud.example.com"), None, None);
        NextcloudFlow::new(
            endpoints,
            "client-id",
            "client-secret",
            store,
            None,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn server_url_comes_from_resolved_endpoints() {
        let flow = test_flow(TokenStore::new(std::env::temp_dir()));
        assert_eq!(flow.server_url(), "https://cloud.example.com");
    }

    #[test]
    fn load_reads_the_nextcloud_token_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(tmp.path());
        store
            .save(Provider::Nextcloud, &Credential::new("nc-token", None, 3600))
            .unwrap();

        let flow = test_flow(store);
        assert_eq!(flow.load().unwrap().access_token, "nc-token");
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_keeps_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(tmp.path());
        let cred = Credential::new("stale", None, 0);
        store.save(Provider::Nextcloud, &cred).unwrap();

        let flow = test_flow(store.clone());
        assert!(flow.refresh(&cred).await.is_err());
        // Per-provider policy: the Nextcloud token file survives a failed
        // refresh.
        assert!(store.load(Provider::Nextcloud).is_some());
    }
}
