//! Secret redaction for diagnostics that echo provider responses.
//!
//! Token endpoints frequently reflect request parameters back in their error
//! bodies. Any such body must pass through [`redact_secrets`] before it is
//! embedded in an error message or log line.

use std::sync::OnceLock;

use regex::Regex;

const MASKED_KEYS: [&str; 3] = ["access_token", "refresh_token", "client_secret"];

fn patterns() -> &'static Vec<(Regex, String)> {
    static PATTERNS: OnceLock<Vec<(Regex, String)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        MASKED_KEYS
            .iter()
            .map(|key| {
                // Matches JSON pairs, form bodies and query fragments alike:
                // "access_token": "xyz", access_token=xyz, 'access_token': xyz
                let pattern =
                    format!(r#"(?i)["']?{key}["']?\s*[:=]\s*["']?[^"'\s&]+["']?"#);
                (
                    Regex::new(&pattern).expect("static redaction pattern"),
                    format!("{key}=***masked***"),
                )
            })
            .collect()
    })
}

/// Replaces any `access_token`, `refresh_token` or `client_secret` value in
/// `text` with `***masked***`, keeping the key name so the diagnostic stays
/// readable.
pub fn redact_secrets(text: &str) -> String {
    let mut out = text.to_string();
    for (regex, replacement) in patterns() {
        out = regex.replace_all(&out, replacement.as_str()).into_owned();
    }
    out
}
