//! Canonical calendar-list schema.
//!
//! All three listing shapes (Google REST, Nextcloud REST, raw CalDAV
//! PROPFIND) are normalized into [`CalendarEntry`] records; the widget only
//! ever sees this schema.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One calendar in the normalized listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// Opaque provider-specific identifier (a `username/calendar` CalDAV
    /// path for Nextcloud, a calendar id for Google).
    pub id: String,
    pub summary: String,
    pub primary: bool,
}

/// The JSON payload printed on stdout.
#[derive(Debug, Serialize, Deserialize)]
pub struct CalendarList {
    pub items: Vec<CalendarEntry>,
}

impl CalendarList {
    /// The synthetic listing returned when every discovery attempt failed,
    /// so the widget always has something to configure against.
    pub fn fallback_default() -> Self {
        Self {
            items: vec![CalendarEntry {
                id: "default".to_string(),
                summary: "Default Calendar".to_string(),
                primary: true,
            }],
        }
    }
}

/// Summary used when no display field was present on a raw entry.
pub const UNNAMED_CALENDAR: &str = "Unnamed Calendar";

/// Returns true if a derived calendar id is usable.
///
/// Empty ids and the stray angle-bracket placeholders a lenient XML scan
/// can produce are dropped with a warning rather than failing the run.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id != "<" && id != ">"
}

/// Deduplicates by id (first occurrence wins) and sorts the listing:
/// the primary entry first, the rest alphabetical by case-insensitive
/// summary. Idempotent: normalizing an already-normalized list is a no-op.
pub fn dedupe_and_sort(entries: Vec<CalendarEntry>) -> Vec<CalendarEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut items: Vec<CalendarEntry> = entries
        .into_iter()
        .filter(|entry| {
            if !is_valid_id(&entry.id) {
                warn!("skipping calendar with invalid id '{}'", entry.id);
                return false;
            }
            seen.insert(entry.id.clone())
        })
        .collect();

    items.sort_by_key(|entry| (!entry.primary, entry.summary.to_lowercase()));
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, summary: &str, primary: bool) -> CalendarEntry {
        CalendarEntry {
            id: id.to_string(),
            summary: summary.to_string(),
            primary,
        }
    }

    #[test]
    fn primary_sorts_first_then_alphabetical() {
        let sorted = dedupe_and_sort(vec![
            entry("user/zebra", "Zebra", false),
            entry("user/work", "work", false),
            entry("user/personal", "Personal", true),
            entry("user/birthdays", "Birthdays", false),
        ]);

        let summaries: Vec<&str> = sorted.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Personal", "Birthdays", "work", "Zebra"]);
        assert!(sorted[0].primary);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let sorted = dedupe_and_sort(vec![
            entry("user/work", "Work", true),
            entry("user/work", "Work (duplicate)", false),
            entry("user/home", "Home", false),
        ]);

        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].summary, "Work");
    }

    #[test]
    fn invalid_ids_are_dropped() {
        let sorted = dedupe_and_sort(vec![
            entry("", "Empty", false),
            entry("<", "Placeholder", false),
            entry("user/real", "Real", false),
        ]);

        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].id, "user/real");
    }

    #[test]
    fn normalization_is_idempotent() {
        let input = vec![
            entry("user/b", "Beta", false),
            entry("user/a", "alpha", true),
            entry("user/c", "Charlie", false),
        ];

        let once = dedupe_and_sort(input);
        let twice = dedupe_and_sort(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn fallback_listing_shape() {
        let listing = CalendarList::fallback_default();
        let json = serde_json::to_string(&listing).unwrap();
        assert_eq!(
            json,
            r#"{"items":[{"id":"default","summary":"Default Calendar","primary":true}]}"#
        );
    }
}
