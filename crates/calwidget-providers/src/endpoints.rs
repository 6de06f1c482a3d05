//! Nextcloud endpoint resolution.
//!
//! The widget hands the helper up to three URLs: an explicit server URL, an
//! authorization endpoint and a token endpoint. Any of them may be missing,
//! and the endpoints sometimes arrive aliased to `localhost` when a
//! mis-supplied redirect URI leaked into the wrong field. The resolver
//! derives one canonical base URL from whatever survives, preferring the
//! token endpoint, and fills in the stock Nextcloud OAuth2 paths for
//! anything left unset.

use url::Url;

/// Default authorize path on a Nextcloud instance.
const DEFAULT_AUTH_PATH: &str = "/index.php/apps/oauth2/authorize";
/// Default token path on a Nextcloud instance.
const DEFAULT_TOKEN_PATH: &str = "/index.php/apps/oauth2/api/v1/token";

/// The canonical endpoint set for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    /// Base server URL without trailing slash; empty when nothing usable
    /// was supplied.
    pub server_url: String,
    /// Authorization endpoint (supplied verbatim, or the default path on
    /// the resolved base). May carry query parameters.
    pub auth_endpoint: String,
    /// Token endpoint (supplied verbatim, or the default path).
    pub token_endpoint: String,
}

/// Derives the canonical endpoints from the three optional inputs.
///
/// Precedence for the base URL: the token endpoint's scheme+host, unless it
/// points at loopback; then the auth endpoint's, under the same rule; then
/// the explicit `server_url`, trimmed of its trailing slash. Loopback hosts
/// are rejected because they are artifacts of a redirect URI pasted into the
/// wrong field, not the real server.
pub fn resolve_endpoints(
    server_url: Option<&str>,
    auth_endpoint: Option<&str>,
    token_endpoint: Option<&str>,
) -> ResolvedEndpoints {
    let base = extract_base(token_endpoint)
        .or_else(|| extract_base(auth_endpoint))
        .unwrap_or_else(|| {
            server_url
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_default()
        });

    let auth = match auth_endpoint {
        Some(ep) if !ep.is_empty() => ep.to_string(),
        _ => format!("{}{}", base, DEFAULT_AUTH_PATH),
    };
    let token = match token_endpoint {
        Some(ep) if !ep.is_empty() => ep.to_string(),
        _ => format!("{}{}", base, DEFAULT_TOKEN_PATH),
    };

    ResolvedEndpoints {
        server_url: base,
        auth_endpoint: auth,
        token_endpoint: token,
    }
}

/// Extracts `scheme://host[:port]` from an endpoint URL, rejecting loopback
/// hosts and anything unparseable.
fn extract_base(endpoint: Option<&str>) -> Option<String> {
    let url = Url::parse(endpoint?).ok()?;
    let host = url.host_str()?;
    if is_loopback(host) {
        return None;
    }
    let mut base = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        base.push_str(&format!(":{}", port));
    }
    Some(base)
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}
