//! The `--fetch-events` command.

use calwidget_providers::fetch_events;

use crate::error::{CliError, CliResult};
use crate::paths;

/// Fetches events for one calendar and prints `{"items": [...]}`.
pub async fn fetch(args: &[String]) -> CliResult<()> {
    let [server_url, calendar_id, access_token, time_min, time_max] = args else {
        return Err(CliError::Config(
            "usage: --fetch-events server_url calendar_id access_token time_min time_max"
                .to_string(),
        ));
    };

    let listing = fetch_events(
        server_url,
        calendar_id,
        access_token,
        time_min,
        time_max,
        paths::REQUEST_TIMEOUT,
    )
    .await?;

    let json = serde_json::to_string(&listing)
        .map_err(|e| CliError::Internal(format!("failed to serialize events: {}", e)))?;
    println!("{}", json);
    Ok(())
}
