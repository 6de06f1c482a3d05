//! Time-bounded event fetching via CalDAV REPORT.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Method;
use tracing::debug;

use crate::error::{HelperError, HelperResult};
use crate::ocs;
use crate::redact::redact_secrets;

use super::ics::{self, EventList};
use super::xml;

/// Fetches events from one calendar within a time window.
///
/// `calendar_id` is normally a `username/calendar` CalDAV path; a bare
/// calendar name gets the authenticated username prepended first (best
/// effort — an unresolvable username leaves the id as supplied).
/// `time_min`/`time_max` are ISO-8601 timestamps. Unlike discovery, a
/// failed REPORT is fatal here: there is no meaningful fallback for event
/// data.
pub async fn fetch_events(
    server_url: &str,
    calendar_id: &str,
    access_token: &str,
    time_min: &str,
    time_max: &str,
    timeout: Duration,
) -> HelperResult<EventList> {
    let start = compact_utc(time_min)?;
    let end = compact_utc(time_max)?;

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to create HTTP client");

    let server = server_url.trim_end_matches('/');
    let mut calendar_path = calendar_id.to_string();
    if !calendar_path.contains('/') {
        debug!("calendar id '{}' has no username, resolving one", calendar_path);
        if let Some(username) = ocs::fetch_username(&client, server, access_token).await {
            calendar_path = format!("{}/{}", username, calendar_path);
        }
    }

    let report_url = format!("{}/remote.php/dav/calendars/{}/", server, calendar_path);
    debug!("REPORT {}", report_url);

    let method = Method::from_bytes(b"REPORT")
        .map_err(|_| HelperError::internal("invalid HTTP method"))?;
    let response = client
        .request(method, &report_url)
        .bearer_auth(access_token)
        .header("Content-Type", "application/xml; charset=utf-8")
        .header("Depth", "1")
        .body(xml::calendar_query_body(&start, &end))
        .send()
        .await
        .map_err(|e| HelperError::network(format!("CalDAV request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| HelperError::network(format!("failed to read REPORT response: {}", e)))?;

    if status.as_u16() != 200 && status.as_u16() != 207 {
        let snippet: String = redact_secrets(&body).chars().take(500).collect();
        return Err(HelperError::network(format!(
            "CalDAV REPORT failed with status {}: {}",
            status.as_u16(),
            snippet
        )));
    }

    let items = xml::parse_report_calendar_data(&body)
        .iter()
        .flat_map(|payload| ics::scan_vevents(payload))
        .collect();

    Ok(EventList { items })
}

/// Converts an ISO-8601 timestamp to the CalDAV compact UTC form
/// (`YYYYMMDDTHHMMSSZ`). Zone-less inputs are taken as UTC.
pub fn compact_utc(iso: &str) -> HelperResult<String> {
    let utc = DateTime::parse_from_rfc3339(iso)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .map_err(|e| {
            HelperError::configuration(format!("invalid ISO-8601 timestamp '{}': {}", iso, e))
        })?;

    Ok(utc.format("%Y%m%dT%H%M%SZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_utc_handles_zulu() {
        assert_eq!(compact_utc("2025-03-01T10:00:00Z").unwrap(), "20250301T100000Z");
    }

    #[test]
    fn compact_utc_converts_offsets() {
        assert_eq!(
            compact_utc("2025-03-01T12:00:00+02:00").unwrap(),
            "20250301T100000Z"
        );
    }

    #[test]
    fn compact_utc_handles_fractional_seconds() {
        assert_eq!(
            compact_utc("2025-03-01T10:00:00.250Z").unwrap(),
            "20250301T100000Z"
        );
    }

    #[test]
    fn compact_utc_takes_naive_input_as_utc() {
        assert_eq!(compact_utc("2025-03-01T10:00:00").unwrap(), "20250301T100000Z");
    }

    #[test]
    fn compact_utc_rejects_garbage() {
        assert!(compact_utc("yesterday").is_err());
    }
}
