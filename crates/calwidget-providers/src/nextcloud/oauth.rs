//! Generic OAuth2 code flow against resolved Nextcloud endpoints.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::endpoints::ResolvedEndpoints;
use crate::error::{HelperError, HelperResult};
use crate::redact::redact_secrets;
use crate::store::Credential;

/// Scope requested from the Nextcloud OAuth2 app.
const CALENDARS_SCOPE: &str = "calendars";

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Query parameters the helper always controls on the authorize URL.
const MANDATORY_PARAMS: [&str; 4] = ["response_type", "client_id", "redirect_uri", "scope"];

/// Builds the authorization URL for the browser.
///
/// The supplied auth endpoint may already carry query parameters (some
/// setups paste a fully formed authorize link into the widget). Those are
/// kept, except that the mandatory parameters win on collision and any
/// pre-existing `redirect_uri` is always replaced by the locally computed
/// one.
pub fn build_authorize_url(
    auth_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
) -> HelperResult<String> {
    let mut url = Url::parse(auth_endpoint).map_err(|e| {
        HelperError::configuration(format!(
            "invalid authorization endpoint '{}': {}",
            auth_endpoint, e
        ))
    })?;

    let existing: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !MANDATORY_PARAMS.contains(&k.as_str()))
        .collect();

    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &existing {
            pairs.append_pair(key, value);
        }
        pairs
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", CALENDARS_SCOPE);
    }

    Ok(url.into())
}

/// Token exchange and refresh client for a Nextcloud instance.
#[derive(Debug)]
pub struct NextcloudOAuthClient {
    endpoints: ResolvedEndpoints,
    client_id: String,
    client_secret: String,
    http_client: reqwest::Client,
}

impl NextcloudOAuthClient {
    pub fn new(
        endpoints: ResolvedEndpoints,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            endpoints,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http_client,
        }
    }

    /// Returns the resolved endpoints this client talks to.
    pub fn endpoints(&self) -> &ResolvedEndpoints {
        &self.endpoints
    }

    /// Returns the authorize URL for the given redirect URI.
    pub fn authorize_url(&self, redirect_uri: &str) -> HelperResult<String> {
        build_authorize_url(&self.endpoints.auth_endpoint, &self.client_id, redirect_uri)
    }

    /// Exchanges an authorization code for a credential.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> HelperResult<Credential> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];

        let body = self.post_token_request(&params, "failed to get access token").await?;
        let credential = credential_from_body(&body)?;

        info!("obtained Nextcloud tokens");
        Ok(credential)
    }

    /// Refreshes an expired access token using the stored refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> HelperResult<Credential> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let body = self.post_token_request(&params, "token refresh failed").await?;
        let mut credential = credential_from_body(&body)?;

        // Some servers rotate the refresh token, some omit it; keep the old
        // one when the response has none.
        if credential.refresh_token.is_none() {
            credential.refresh_token = Some(refresh_token.to_string());
        }

        info!("refreshed Nextcloud access token");
        Ok(credential)
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        failure_prefix: &str,
    ) -> HelperResult<String> {
        debug!("POST {}", self.endpoints.token_endpoint);
        let response = self
            .http_client
            .post(&self.endpoints.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                HelperError::network(format!("{}: {}", failure_prefix, e))
                    .with_provider("nextcloud")
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            HelperError::network(format!("{}: failed to read response: {}", failure_prefix, e))
                .with_provider("nextcloud")
        })?;

        if status != reqwest::StatusCode::OK {
            return Err(HelperError::authentication(format!(
                "{} (status {}): {}",
                failure_prefix,
                status.as_u16(),
                redact_secrets(&body)
            ))
            .with_provider("nextcloud"));
        }

        Ok(body)
    }
}

fn credential_from_body(body: &str) -> HelperResult<Credential> {
    let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
        HelperError::invalid_response(format!("invalid token response: {}", e))
            .with_provider("nextcloud")
    })?;

    let mut credential = Credential::new(
        response.access_token,
        response.refresh_token,
        response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
    );
    credential.extra = response.extra;
    Ok(credential)
}

/// Response from the Nextcloud token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}
