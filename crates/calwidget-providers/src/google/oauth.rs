//! OAuth 2.0 code flow against Google's endpoints.
//!
//! The authorization request carries PKCE (RFC 7636) and a random `state`
//! parameter; the token endpoint is used for both the code exchange and
//! silent refreshes.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{HelperError, HelperResult};
use crate::redact::redact_secrets;
use crate::store::Credential;

/// Google OAuth endpoints.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Read-only calendar scope; the only one the helper ever requests.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// The PKCE code verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Token exchange and refresh client for Google.
#[derive(Debug)]
pub struct GoogleOAuthClient {
    client_id: String,
    client_secret: String,
    http_client: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http_client,
        }
    }

    /// Exchanges an authorization code for a credential.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> HelperResult<Credential> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let body = self.post_token_request(&params, "token exchange").await?;
        let response = parse_token_response(&body)?;

        info!("obtained Google tokens");
        Ok(credential_from(response, None))
    }

    /// Refreshes an expired access token.
    ///
    /// Google does not reissue the refresh token on refresh, so the old one
    /// is carried into the returned credential.
    pub async fn refresh(&self, refresh_token: &str) -> HelperResult<Credential> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let body = self.post_token_request(&params, "token refresh").await?;
        let response = parse_token_response(&body)?;

        info!("refreshed Google access token");
        Ok(credential_from(response, Some(refresh_token.to_string())))
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> HelperResult<String> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                HelperError::network(format!("{} request failed: {}", operation, e))
                    .with_provider("google")
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            HelperError::network(format!("failed to read {} response: {}", operation, e))
                .with_provider("google")
        })?;

        if !status.is_success() {
            return Err(HelperError::authentication(format!(
                "{} failed ({}): {}",
                operation,
                status,
                redact_secrets(&body)
            ))
            .with_provider("google"));
        }

        Ok(body)
    }
}

fn parse_token_response(body: &str) -> HelperResult<TokenResponse> {
    serde_json::from_str(body).map_err(|e| {
        HelperError::invalid_response(format!("invalid token response: {}", e))
            .with_provider("google")
    })
}

fn credential_from(response: TokenResponse, fallback_refresh: Option<String>) -> Credential {
    Credential::new(
        response.access_token,
        response.refresh_token.or(fallback_refresh),
        response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
    )
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// PKCE verifier/challenge pair plus the CSRF state parameter.
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = Self::generate_random(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::generate_random(16);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn generate_random(len: usize) -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Computes the SHA-256 challenge for a code verifier.
    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Builds the Google consent-screen URL.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(CALENDAR_SCOPE),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}
