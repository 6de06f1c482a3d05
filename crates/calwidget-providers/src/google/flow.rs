//! Google token lifecycle.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{HelperError, HelperErrorCode, HelperResult};
use crate::listener::CallbackListener;
use crate::port::{self, DEFAULT_PORT_RANGE, DEFAULT_PREFERRED_PORT};
use crate::provider::{BoxFuture, TokenProvider};
use crate::store::{Credential, Provider, TokenStore};

use super::config::GoogleClientConfig;
use super::oauth::{GoogleOAuthClient, PkceFlow};

/// The Google installed-app flow.
///
/// Refresh-failure policy: the stored `token.json` is deleted, so the next
/// run (or the fall-through in the current one) starts a full re-auth
/// instead of retrying a dead refresh token.
pub struct GoogleFlow {
    client_config: GoogleClientConfig,
    oauth: GoogleOAuthClient,
    store: TokenStore,
    redirect_port: Option<u16>,
}

impl GoogleFlow {
    pub fn new(
        client_config: GoogleClientConfig,
        store: TokenStore,
        redirect_port: Option<u16>,
        timeout: Duration,
    ) -> HelperResult<Self> {
        client_config.validate()?;
        let oauth = GoogleOAuthClient::new(
            &client_config.client_id,
            &client_config.client_secret,
            timeout,
        );
        Ok(Self {
            client_config,
            oauth,
            store,
            redirect_port,
        })
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
        let redirect_uri = listener.redirect_uri("/");
        eprintln!("Using redirect URI: {}", redirect_uri);
        eprintln!("Make sure this URI is registered in your Google OAuth app settings.");

        let pkce = PkceFlow::new();
        let auth_url = pkce.build_auth_url(&self.client_config.client_id, &redirect_uri);

        info!("opening browser for Google authentication");
        debug!("authorization URL: {}", auth_url);
        if let Err(e) = open::that(&auth_url) {
            warn!("failed to open browser: {}", e);
            eprintln!("\nPlease open this URL in your browser:\n\n{}\n", auth_url);
        }

        let captured = listener.wait_for_code().map_err(|e| {
            if e.code() == HelperErrorCode::AuthorizationDenied {
                Self::denied_with_hints(e.message())
            } else {
                e
            }
        })?;

        if let Some(state) = &captured.state
            && *state != pkce.state
        {
            return Err(HelperError::authentication(
                "OAuth state mismatch in callback",
            )
            .with_provider("google"));
        }

        self.oauth
            .exchange_code(&captured.code, &pkce.verifier, &redirect_uri)
            .await
    }

    /// Wraps a consent denial in the checklist of the usual culprits.
    fn denied_with_hints(reason: &str) -> HelperError {
        HelperError::authorization_denied(format!(
            "{}. Possible causes:\n  \
             1. OAuth client is deleted or disabled in Google Cloud Console\n  \
             2. Google Calendar API is not enabled for this project\n  \
             3. Your Google account is not authorized for this OAuth client\n  \
             4. Redirect URI mismatch - ensure the localhost redirect is authorized\n  \
             5. OAuth client is in testing mode and your account is not a test user",
            reason
        ))
        .with_provider("google")
    }
}

impl TokenProvider for GoogleFlow {
    fn name(&self) -> &'static str {
        "google"
    }

    fn load(&self) -> Option<Credential> {
        self.store.load(Provider::Google)
    }

    fn refresh<'a>(&'a self, cred: &'a Credential) -> BoxFuture<'a, HelperResult<Credential>> {
        Box::pin(async move {
            let result = match cred.refresh_token.as_deref() {
                Some(refresh_token) => self.oauth.refresh(refresh_token).await,
                None => Err(HelperError::authentication("no refresh token stored")
                    .with_provider("google")),
            };

            if result.is_err() {
                // A dead refresh token stays dead; drop the file so the next
                // attempt goes straight to the consent screen.
                if let Err(delete_err) = self.store.delete(Provider::Google) {
                    warn!("could not discard stale token file: {}", delete_err);
                }
            }

            result
        })
    }

    fn acquire(&self) -> BoxFuture<'_, HelperResult<Credential>> {
        Box::pin(self.acquire_interactive())
    }

    fn persist(&self, cred: &Credential) -> HelperResult<()> {
        self.store.save(Provider::Google, cred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::now_epoch;

    fn test_flow(store: TokenStore) -> GoogleFlow {
        GoogleFlow::new(
            GoogleClientConfig::new("id.apps.googleusercontent.com", "secret"),
            store,
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_client_config() {
        let store = TokenStore::new(std::env::temp_dir());
        let result = GoogleFlow::new(
            GoogleClientConfig::new("", ""),
            store,
            None,
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_reads_the_google_token_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(tmp.path());
        store
            .save(Provider::Google, &Credential::new("g-token", None, 3600))
            .unwrap();

        let flow = test_flow(store);
        let cred = flow.load().unwrap();
        assert_eq!(cred.access_token, "g-token");
    }

    #[tokio::test]
    async fn refresh_failure_discards_the_token_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(tmp.path());
        let mut cred = Credential::new("stale", None, 3600);
        cred.expires_at = now_epoch() - 100;
        store.save(Provider::Google, &cred).unwrap();

        let flow = test_flow(store.clone());
        // No refresh token stored, so refresh fails before any network I/O;
        // the failure path must still clear the file.
        assert!(flow.refresh(&cred).await.is_err());
        assert!(store.load(Provider::Google).is_none());
    }

    #[test]
    fn denied_error_carries_hint_list() {
        let err = GoogleFlow::denied_with_hints("authorization denied: access_denied");
        assert_eq!(err.code(), HelperErrorCode::AuthorizationDenied);
        assert!(err.message().contains("Google Cloud Console"));
        assert!(err.message().contains("test user"));
    }
}
