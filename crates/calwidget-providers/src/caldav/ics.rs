//! Line-oriented VEVENT scanning.
//!
//! The helper deliberately does not run a full iCalendar parser: event
//! fields are passed through to the widget as the raw value strings the
//! server sent, with no timezone normalization. The scan tracks
//! `BEGIN:VEVENT`/`END:VEVENT` boundaries and captures four properties by
//! line prefix.

use serde::{Deserialize, Serialize};

/// One event as captured from a `calendar-data` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Raw DTSTART value (everything after the first colon).
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// The JSON payload printed on stdout by the event fetcher.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventList {
    pub items: Vec<EventRecord>,
}

#[derive(Default)]
struct PartialEvent {
    start: Option<String>,
    end: Option<String>,
    summary: Option<String>,
    location: Option<String>,
}

/// Scans raw iCalendar text for VEVENT blocks.
///
/// Events without a non-empty DTSTART are dropped; everything captured is
/// kept verbatim.
pub fn scan_vevents(ical: &str) -> Vec<EventRecord> {
    let mut events = Vec::new();
    let mut current = PartialEvent::default();

    for raw_line in ical.lines() {
        let line = raw_line.trim();

        if line.starts_with("BEGIN:VEVENT") {
            current = PartialEvent::default();
        } else if line.starts_with("DTSTART") {
            current.start = property_value(line);
        } else if line.starts_with("DTEND") {
            current.end = property_value(line);
        } else if line.starts_with("SUMMARY") {
            current.summary = Some(property_value(line).unwrap_or_else(|| "No Title".to_string()));
        } else if line.starts_with("LOCATION") {
            current.location = Some(property_value(line).unwrap_or_default());
        } else if line.starts_with("END:VEVENT") {
            if let Some(start) = current.start.take()
                && !start.is_empty()
            {
                events.push(EventRecord {
                    start,
                    end: current.end.take(),
                    summary: current.summary.take(),
                    location: current.location.take(),
                });
            }
            current = PartialEvent::default();
        }
    }

    events
}

/// Returns the value after the first colon, covering parameterized
/// properties like `DTSTART;TZID=Europe/Paris:20250301T100000`.
fn property_value(line: &str) -> Option<String> {
    line.split_once(':').map(|(_, value)| value.to_string())
}
