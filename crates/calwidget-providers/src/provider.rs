//! The TokenProvider abstraction.
//!
//! Both flows (Google, Nextcloud) expose the same four capabilities —
//! load a cached credential, refresh it silently, acquire a fresh one via
//! the browser, persist the result — and [`ensure_credential`] drives the
//! shared state machine over them. Everything downstream (calendar
//! discovery, event fetching) works from the resolved
//! `(server_url, access_token)` pair and never needs to know which provider
//! produced it.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info};

use crate::error::HelperResult;
use crate::store::Credential;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One provider's token lifecycle.
///
/// Implementations own their token file and their refresh-failure policy:
/// the Google flow discards the stored token file when a refresh fails
/// (forcing a full re-auth on any later run), while the Nextcloud flow
/// keeps the file and only forces a new code round-trip in the current run.
pub trait TokenProvider: Send + Sync {
    /// The provider name ("google" or "nextcloud").
    fn name(&self) -> &'static str;

    /// Loads the cached credential, if a usable token file exists.
    fn load(&self) -> Option<Credential>;

    /// Attempts a silent refresh of an expired credential.
    ///
    /// On failure the implementation applies its discard policy before
    /// returning the error; the driver then falls through to `acquire`.
    fn refresh<'a>(&'a self, cred: &'a Credential) -> BoxFuture<'a, HelperResult<Credential>>;

    /// Runs the interactive authorization flow for a brand-new credential.
    fn acquire(&self) -> BoxFuture<'_, HelperResult<Credential>>;

    /// Persists a freshly obtained credential.
    fn persist(&self, cred: &Credential) -> HelperResult<()>;
}

/// Returns a valid credential for the provider, walking the token state
/// machine: cached-and-valid wins; an expired credential with a refresh
/// token gets a silent refresh; anything else goes through the full
/// interactive flow. Refresh failures are recovered here, never surfaced.
pub async fn ensure_credential(provider: &dyn TokenProvider) -> HelperResult<Credential> {
    if let Some(cred) = provider.load() {
        if cred.is_valid() {
            debug!("{}: cached token still valid", provider.name());
            return Ok(cred);
        }

        if cred.refresh_token.is_some() {
            match provider.refresh(&cred).await {
                Ok(fresh) => {
                    provider.persist(&fresh)?;
                    info!("{}: refreshed expired token", provider.name());
                    return Ok(fresh);
                }
                Err(e) => {
                    debug!("{}: token refresh failed: {}", provider.name(), e);
                }
            }
        }
    }

    let fresh = provider.acquire().await?;
    provider.persist(&fresh)?;
    info!("{}: acquired new token", provider.name());
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HelperError;
    use crate::store::now_epoch;
    use std::sync::Mutex;

    /// A scripted provider that records which capabilities were exercised.
    struct ScriptedProvider {
        cached: Option<Credential>,
        refresh_ok: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedProvider {
        fn new(cached: Option<Credential>, refresh_ok: bool) -> Self {
            Self {
                cached,
                refresh_ok,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TokenProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn load(&self) -> Option<Credential> {
            self.record("load");
            self.cached.clone()
        }

        fn refresh<'a>(
            &'a self,
            _cred: &'a Credential,
        ) -> BoxFuture<'a, HelperResult<Credential>> {
            self.record("refresh");
            Box::pin(async move {
                if self.refresh_ok {
                    Ok(Credential::new("refreshed", Some("r2".to_string()), 3600))
                } else {
                    Err(HelperError::authentication("refresh endpoint returned 401"))
                }
            })
        }

        fn acquire(&self) -> BoxFuture<'_, HelperResult<Credential>> {
            self.record("acquire");
            Box::pin(async move { Ok(Credential::new("acquired", None, 3600)) })
        }

        fn persist(&self, _cred: &Credential) -> HelperResult<()> {
            self.record("persist");
            Ok(())
        }
    }

    fn expired_credential() -> Credential {
        let mut cred = Credential::new("stale", Some("refresh".to_string()), 3600);
        cred.expires_at = now_epoch() - 100;
        cred
    }

    #[tokio::test]
    async fn valid_cached_token_short_circuits() {
        let provider = ScriptedProvider::new(Some(Credential::new("live", None, 3600)), true);
        let cred = ensure_credential(&provider).await.unwrap();
        assert_eq!(cred.access_token, "live");
        assert_eq!(provider.calls(), vec!["load"]);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let provider = ScriptedProvider::new(Some(expired_credential()), true);
        let cred = ensure_credential(&provider).await.unwrap();
        assert_eq!(cred.access_token, "refreshed");
        assert_eq!(provider.calls(), vec!["load", "refresh", "persist"]);
    }

    #[tokio::test]
    async fn refresh_failure_falls_through_to_acquire() {
        // Scenario: cached token expired, refresh endpoint returns 401.
        // The flow must run a new authorization round-trip, not fail.
        let provider = ScriptedProvider::new(Some(expired_credential()), false);
        let cred = ensure_credential(&provider).await.unwrap();
        assert_eq!(cred.access_token, "acquired");
        assert_eq!(provider.calls(), vec!["load", "refresh", "acquire", "persist"]);
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_reacquires() {
        let mut cred = Credential::new("stale", None, 3600);
        cred.expires_at = now_epoch() - 100;
        let provider = ScriptedProvider::new(Some(cred), true);
        let result = ensure_credential(&provider).await.unwrap();
        assert_eq!(result.access_token, "acquired");
        assert_eq!(provider.calls(), vec!["load", "acquire", "persist"]);
    }

    #[tokio::test]
    async fn missing_token_goes_straight_to_acquire() {
        let provider = ScriptedProvider::new(None, true);
        let cred = ensure_credential(&provider).await.unwrap();
        assert_eq!(cred.access_token, "acquired");
        assert_eq!(provider.calls(), vec!["load", "acquire", "persist"]);
    }
}
