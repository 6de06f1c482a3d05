//! Calendar discovery.
//!
//! Works from the resolved `(server_url, access_token)` pair alone: an
//! empty server URL means the Google REST listing, anything else means the
//! Nextcloud REST listing with a CalDAV PROPFIND fallback. Whatever shape
//! the listing arrives in, the result is the same canonical
//! [`CalendarEntry`] schema, deduplicated and sorted. Discovery never
//! fails the run — when every attempt is exhausted the caller still gets
//! the synthetic default listing.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::calendar::{CalendarEntry, CalendarList, UNNAMED_CALENDAR, dedupe_and_sort, is_valid_id};
use crate::caldav::xml;
use crate::error::{HelperError, HelperResult};
use crate::ocs;
use crate::redact::redact_secrets;

/// Google Calendar API listing endpoint.
const GOOGLE_CALENDAR_LIST_URL: &str =
    "https://www.googleapis.com/calendar/v3/users/me/calendarList";

/// Resolves the account's calendar list.
pub async fn discover_calendars(
    server_url: &str,
    access_token: &str,
    timeout: Duration,
) -> CalendarList {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to create HTTP client");

    let result = if server_url.is_empty() {
        google_listing(&client, access_token).await
    } else {
        nextcloud_listing(&client, server_url, access_token).await
    };

    match result {
        Ok(items) if !items.is_empty() => {
            debug!("discovered {} calendars", items.len());
            CalendarList { items }
        }
        Ok(_) => {
            warn!("discovery produced no usable calendars, returning default");
            CalendarList::fallback_default()
        }
        Err(e) => {
            warn!("failed to fetch calendar list: {}", e);
            CalendarList::fallback_default()
        }
    }
}

async fn google_listing(
    client: &reqwest::Client,
    access_token: &str,
) -> HelperResult<Vec<CalendarEntry>> {
    let response = client
        .get(GOOGLE_CALENDAR_LIST_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| {
            HelperError::network(format!("calendar list request failed: {}", e))
                .with_provider("google")
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        HelperError::network(format!("failed to read calendar list: {}", e))
            .with_provider("google")
    })?;

    if !status.is_success() {
        let snippet: String = redact_secrets(&body).chars().take(200).collect();
        return Err(HelperError::network(format!(
            "calendar list request failed ({}): {}",
            status.as_u16(),
            snippet
        ))
        .with_provider("google"));
    }

    let list: GoogleCalendarList = serde_json::from_str(&body).map_err(|e| {
        HelperError::invalid_response(format!("unparseable calendar list: {}", e))
            .with_provider("google")
    })?;

    let entries = list
        .items
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| normalize_google_entry(entry, index))
        .collect();
    Ok(dedupe_and_sort(entries))
}

async fn nextcloud_listing(
    client: &reqwest::Client,
    server_url: &str,
    access_token: &str,
) -> HelperResult<Vec<CalendarEntry>> {
    let server = server_url.trim_end_matches('/');
    let api_url = format!("{}/apps/calendar/api/v1/calendars", server);
    debug!("calendar API URL: {}", api_url);

    let response = client
        .get(&api_url)
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| {
            HelperError::network(format!("calendar API request failed: {}", e))
                .with_provider("nextcloud")
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        debug!("calendar API returned {}, trying CalDAV", status.as_u16());
        return caldav_listing(client, server, access_token).await;
    }

    let body = response.text().await.map_err(|e| {
        HelperError::network(format!("failed to read calendar API response: {}", e))
            .with_provider("nextcloud")
    })?;
    let payload: Value = serde_json::from_str(&body).map_err(|e| {
        HelperError::invalid_response(format!("unparseable calendar API response: {}", e))
            .with_provider("nextcloud")
    })?;

    let calendars = unwrap_calendar_payload(&payload);
    if calendars.is_empty() {
        return Err(
            HelperError::invalid_response("no calendars found in API response")
                .with_provider("nextcloud"),
        );
    }

    let username = ocs::fetch_username(client, server, access_token).await;
    let entries = calendars
        .iter()
        .enumerate()
        .filter_map(|(index, cal)| normalize_rest_entry(cal, index, username.as_deref()))
        .collect();
    Ok(dedupe_and_sort(entries))
}

async fn caldav_listing(
    client: &reqwest::Client,
    server: &str,
    access_token: &str,
) -> HelperResult<Vec<CalendarEntry>> {
    // The username is needed for the collection path; without it the
    // listing is attempted against the calendars root.
    let username = ocs::fetch_username(client, server, access_token).await;
    let url = match &username {
        Some(user) => format!("{}/remote.php/dav/calendars/{}/", server, user),
        None => format!("{}/remote.php/dav/calendars/", server),
    };
    debug!("PROPFIND {}", url);

    let method = Method::from_bytes(b"PROPFIND")
        .map_err(|_| HelperError::internal("invalid HTTP method"))?;
    let response = client
        .request(method, &url)
        .bearer_auth(access_token)
        .header("Depth", "1")
        .header("Content-Type", "application/xml")
        .body(xml::propfind_calendars_body())
        .send()
        .await
        .map_err(|e| {
            HelperError::network(format!("CalDAV request failed: {}", e))
                .with_provider("nextcloud")
        })?;

    let status = response.status().as_u16();
    if status != 200 && status != 207 {
        return Err(HelperError::network(format!(
            "CalDAV request failed with status {}",
            status
        ))
        .with_provider("nextcloud"));
    }

    let body = response.text().await.map_err(|e| {
        HelperError::network(format!("failed to read CalDAV response: {}", e))
            .with_provider("nextcloud")
    })?;

    let scanned = xml::scan_propfind_listing(&body);
    if scanned.is_empty() {
        return Err(
            HelperError::invalid_response("no calendars found in CalDAV response")
                .with_provider("nextcloud"),
        );
    }

    let mut entries: Vec<CalendarEntry> = Vec::new();
    for calendar in scanned {
        if !is_valid_id(&calendar.id) {
            warn!("skipping invalid calendar id '{}'", calendar.id);
            continue;
        }
        let summary = calendar
            .display_name
            .unwrap_or_else(|| calendar.id.clone());
        entries.push(CalendarEntry {
            primary: entries.is_empty(),
            id: calendar.id,
            summary,
        });
    }
    Ok(dedupe_and_sort(entries))
}

/// Pulls the calendar array out of whichever envelope the server used:
/// `{ocs: {data: [...]}}`, `{data: [...]}` or a bare array.
fn unwrap_calendar_payload(payload: &Value) -> Vec<Value> {
    if let Some(array) = payload.as_array() {
        return array.clone();
    }
    if let Some(array) = payload
        .get("ocs")
        .and_then(|ocs| ocs.get("data"))
        .and_then(Value::as_array)
    {
        return array.clone();
    }
    if let Some(array) = payload.get("data").and_then(Value::as_array) {
        return array.clone();
    }
    Vec::new()
}

/// Normalizes one raw Nextcloud REST entry into the canonical schema.
///
/// The id is derived preferentially from a CalDAV-style URL (keeping the
/// `username/calendar` suffix), then from an explicit identifier field, and
/// as a last resort from the entry's position in the listing.
fn normalize_rest_entry(cal: &Value, index: usize, username: Option<&str>) -> Option<CalendarEntry> {
    let mut id = username.and_then(|user| extract_calendar_path(cal, user));

    if id.is_none() {
        id = dav_url(cal)
            .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
    }

    let id = id
        .or_else(|| string_field(cal, &["id", "calendarId"]))
        .unwrap_or_else(|| index.to_string());

    if !is_valid_id(&id) {
        warn!("calendar {} has invalid id '{}', skipping", index, id);
        return None;
    }

    let summary = string_field(cal, &["displayname", "name", "title"])
        .unwrap_or_else(|| UNNAMED_CALENDAR.to_string());

    Some(CalendarEntry {
        id,
        summary,
        primary: index == 0,
    })
}

/// Extracts the `username/calendar` suffix from the entry's DAV URL, or
/// rebuilds it from the username and an identifier field.
fn extract_calendar_path(cal: &Value, username: &str) -> Option<String> {
    if let Some(url) = dav_url(cal)
        && let Some((_, suffix)) = url.split_once("/remote.php/dav/calendars/")
    {
        let path = suffix.trim_end_matches('/');
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    let name = string_field(cal, &["id", "calendarId", "name"])?;
    Some(format!("{}/{}", username, name))
}

fn dav_url(cal: &Value) -> Option<&str> {
    cal.get("dav")
        .and_then(|dav| dav.get("url"))
        .and_then(Value::as_str)
        .or_else(|| cal.get("url").and_then(Value::as_str))
}

/// Returns the first present field as a non-empty string; numeric ids are
/// rendered as decimal.
fn string_field(cal: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match cal.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn normalize_google_entry(entry: GoogleCalendarEntry, index: usize) -> Option<CalendarEntry> {
    let id = entry
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| index.to_string());
    if !is_valid_id(&id) {
        warn!("calendar {} has invalid id '{}', skipping", index, id);
        return None;
    }

    Some(CalendarEntry {
        id,
        summary: entry
            .summary
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNNAMED_CALENDAR.to_string()),
        primary: entry.primary,
    })
}

/// Response from the Google calendarList endpoint.
#[derive(Debug, Deserialize)]
struct GoogleCalendarList {
    #[serde(default)]
    items: Vec<GoogleCalendarEntry>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEntry {
    id: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    primary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_ocs_envelope() {
        let payload = json!({"ocs": {"meta": {}, "data": [{"id": "a"}, {"id": "b"}]}});
        assert_eq!(unwrap_calendar_payload(&payload).len(), 2);
    }

    #[test]
    fn unwraps_data_envelope_and_bare_array() {
        assert_eq!(
            unwrap_calendar_payload(&json!({"data": [{"id": "a"}]})).len(),
            1
        );
        assert_eq!(unwrap_calendar_payload(&json!([{"id": "a"}])).len(), 1);
        assert!(unwrap_calendar_payload(&json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn rest_entry_prefers_dav_url_suffix() {
        let cal = json!({
            "id": 42,
            "displayname": "Personal",
            "dav": {"url": "https://cloud.example.com/remote.php/dav/calendars/jane/personal/"}
        });

        let entry = normalize_rest_entry(&cal, 0, Some("jane")).unwrap();
        assert_eq!(entry.id, "jane/personal");
        assert_eq!(entry.summary, "Personal");
        assert!(entry.primary);
    }

    #[test]
    fn rest_entry_flat_url_field_works_too() {
        let cal = json!({
            "url": "https://cloud.example.com/remote.php/dav/calendars/jane/work/",
            "displayname": "Work"
        });

        let entry = normalize_rest_entry(&cal, 1, Some("jane")).unwrap();
        assert_eq!(entry.id, "jane/work");
        assert!(!entry.primary);
    }

    #[test]
    fn rest_entry_rebuilds_path_from_username_and_id() {
        let cal = json!({"id": "holidays", "displayname": "Holidays"});
        let entry = normalize_rest_entry(&cal, 2, Some("jane")).unwrap();
        assert_eq!(entry.id, "jane/holidays");
    }

    #[test]
    fn rest_entry_numeric_id_is_rendered() {
        let cal = json!({"id": 7, "displayname": "Seven"});
        let entry = normalize_rest_entry(&cal, 0, Some("jane")).unwrap();
        assert_eq!(entry.id, "jane/7");
    }

    #[test]
    fn rest_entry_without_username_takes_last_url_segment() {
        let cal = json!({
            "url": "https://cloud.example.com/remote.php/dav/calendars/jane/team/",
            "displayname": "Team"
        });
        let entry = normalize_rest_entry(&cal, 0, None).unwrap();
        assert_eq!(entry.id, "team");
    }

    #[test]
    fn rest_entry_positional_index_is_last_resort() {
        let cal = json!({"displayname": "Mystery"});
        let entry = normalize_rest_entry(&cal, 3, None).unwrap();
        assert_eq!(entry.id, "3");
    }

    #[test]
    fn rest_entry_summary_fallback_chain() {
        let named = json!({"id": "a", "name": "From name"});
        assert_eq!(
            normalize_rest_entry(&named, 0, None).unwrap().summary,
            "From name"
        );

        let titled = json!({"id": "b", "title": "From title"});
        assert_eq!(
            normalize_rest_entry(&titled, 0, None).unwrap().summary,
            "From title"
        );

        let bare = json!({"id": "c"});
        assert_eq!(
            normalize_rest_entry(&bare, 0, None).unwrap().summary,
            UNNAMED_CALENDAR
        );
    }

    #[test]
    fn rest_entry_invalid_id_is_dropped() {
        let cal = json!({"id": "<"});
        assert!(normalize_rest_entry(&cal, 0, None).is_none());
    }

    #[test]
    fn google_entries_map_onto_canonical_schema() {
        let list: GoogleCalendarList = serde_json::from_value(json!({
            "kind": "calendar#calendarList",
            "items": [
                {"id": "work@example.com", "summary": "Work"},
                {"id": "primary-id", "summary": "Jane Doe", "primary": true},
                {"id": "", "summary": "Broken"}
            ]
        }))
        .unwrap();

        let entries: Vec<CalendarEntry> = list
            .items
            .into_iter()
            .enumerate()
            .filter_map(|(i, e)| normalize_google_entry(e, i))
            .collect();
        let sorted = dedupe_and_sort(entries);

        // Empty id falls back to the positional index rather than dropping.
        assert_eq!(sorted.len(), 3);
        assert_eq!(sorted[0].id, "primary-id");
        assert!(sorted[0].primary);
        assert_eq!(sorted[1].id, "2");
        assert_eq!(sorted[2].summary, "Work");
    }
}
