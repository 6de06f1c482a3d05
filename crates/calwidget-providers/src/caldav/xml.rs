//! XML bodies and response scanning for WebDAV operations.
//!
//! Two different parsing strategies live here on purpose. REPORT responses
//! are walked with quick-xml because `calendar-data` payloads arrive as
//! text or CDATA and need entity unescaping. The depth-1 PROPFIND listing
//! is scanned positionally with regular expressions instead: real servers
//! disagree on namespace prefixes and element layout, and the listing only
//! needs calendar paths matched up with display names in document order.
//! Callers never see either strategy, only the narrow functions below.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use regex::Regex;

/// DAV namespace.
const DAV_NS: &str = "DAV:";
/// CalDAV namespace.
const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// One calendar scanned out of a PROPFIND listing, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropfindCalendar {
    /// The calendar path segment (the part after the username).
    pub id: String,
    /// The positionally matched display name, if one was present.
    pub display_name: Option<String>,
}

/// Generates the PROPFIND body for calendar discovery (displayname,
/// resourcetype, calendar-description).
pub fn propfind_calendars_body() -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut propfind = BytesStart::new("d:propfind");
    propfind.push_attribute(("xmlns:d", DAV_NS));
    propfind.push_attribute(("xmlns:c", CALDAV_NS));
    writer.write_event(Event::Start(propfind)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .unwrap();
    write_empty_element(&mut writer, "d:displayname");
    write_empty_element(&mut writer, "c:calendar-description");
    write_empty_element(&mut writer, "d:resourcetype");
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("d:propfind")))
        .unwrap();

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).unwrap()
}

/// Generates a calendar-query REPORT body with a VEVENT time-range filter.
///
/// `start` and `end` must already be in compact UTC form (`YYYYMMDDTHHMMSSZ`).
pub fn calendar_query_body(start: &str, end: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut query = BytesStart::new("c:calendar-query");
    query.push_attribute(("xmlns:d", DAV_NS));
    query.push_attribute(("xmlns:c", CALDAV_NS));
    writer.write_event(Event::Start(query)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .unwrap();
    write_empty_element(&mut writer, "d:getetag");
    write_empty_element(&mut writer, "c:calendar-data");
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("c:filter")))
        .unwrap();

    let mut vcal_filter = BytesStart::new("c:comp-filter");
    vcal_filter.push_attribute(("name", "VCALENDAR"));
    writer.write_event(Event::Start(vcal_filter)).unwrap();

    let mut vevent_filter = BytesStart::new("c:comp-filter");
    vevent_filter.push_attribute(("name", "VEVENT"));
    writer.write_event(Event::Start(vevent_filter)).unwrap();

    let mut time_range = BytesStart::new("c:time-range");
    time_range.push_attribute(("start", start));
    time_range.push_attribute(("end", end));
    writer.write_event(Event::Empty(time_range)).unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("c:comp-filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:comp-filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:calendar-query")))
        .unwrap();

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).unwrap()
}

/// Extracts the raw iCalendar payloads from a REPORT multistatus response.
pub fn parse_report_calendar_data(xml: &str) -> Vec<String> {
    let mut payloads = Vec::new();

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_calendar_data = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "calendar-data" {
                    in_calendar_data = true;
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "calendar-data" {
                    in_calendar_data = false;
                }
            }
            Ok(Event::Text(e)) if in_calendar_data => {
                let text = e.unescape().unwrap_or_default().to_string();
                if !text.is_empty() {
                    payloads.push(text);
                }
            }
            Ok(Event::CData(e)) if in_calendar_data => {
                payloads.push(String::from_utf8_lossy(&e).to_string());
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    payloads
}

/// Scans a depth-1 PROPFIND listing for calendar paths and display names.
///
/// Paths and names are matched positionally in document order, the way the
/// listing lays them out: one displayname per calendar entry. A missing,
/// empty or placeholder display name falls back to the calendar id.
pub fn scan_propfind_listing(xml: &str) -> Vec<PropfindCalendar> {
    let path_re = Regex::new(r"calendars/[^/]+/([^/]+)/").expect("static pattern");
    let name_re =
        Regex::new(r"<(?:[A-Za-z][\w.-]*:)?displayname>([^<]+)</").expect("static pattern");

    let display_names: Vec<&str> = name_re
        .captures_iter(xml)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    path_re
        .captures_iter(xml)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .enumerate()
        .map(|(i, id)| {
            let display_name = display_names
                .get(i)
                .map(|name| name.trim())
                .filter(|name| !name.is_empty() && *name != "<" && *name != ">")
                .map(str::to_string);
            PropfindCalendar { id, display_name }
        })
        .collect()
}

fn write_empty_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) {
    writer
        .write_event(Event::Empty(BytesStart::new(name)))
        .unwrap();
}

/// Extracts the local name from a potentially namespaced element name.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propfind_body_lists_wanted_properties() {
        let body = propfind_calendars_body();
        assert!(body.contains("propfind"));
        assert!(body.contains("displayname"));
        assert!(body.contains("calendar-description"));
        assert!(body.contains("resourcetype"));
    }

    #[test]
    fn calendar_query_body_embeds_time_range() {
        let body = calendar_query_body("20250201T000000Z", "20250228T235959Z");
        assert!(body.contains("calendar-query"));
        assert!(body.contains("VCALENDAR"));
        assert!(body.contains("VEVENT"));
        assert!(body.contains(r#"start="20250201T000000Z""#));
        assert!(body.contains(r#"end="20250228T235959Z""#));
    }

    #[test]
    fn report_response_yields_calendar_data() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/remote.php/dav/calendars/jane/personal/event1.ics</href>
    <propstat>
      <prop>
        <getetag>"abc123"</getetag>
        <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
SUMMARY:Team Meeting
END:VEVENT
END:VCALENDAR</C:calendar-data>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

        let payloads = parse_report_calendar_data(xml);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("Team Meeting"));
    }

    #[test]
    fn report_response_handles_cdata() {
        let xml = r#"<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response><propstat><prop>
    <C:calendar-data><![CDATA[BEGIN:VEVENT
SUMMARY:From CDATA
END:VEVENT]]></C:calendar-data>
  </prop></propstat></response>
</multistatus>"#;

        let payloads = parse_report_calendar_data(xml);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("From CDATA"));
    }

    #[test]
    fn propfind_scan_pairs_paths_and_names_positionally() {
        let xml = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/dav/calendars/jane/personal/</d:href>
    <d:propstat><d:prop><d:displayname>Personal</d:displayname></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/calendars/jane/work/</d:href>
    <d:propstat><d:prop><d:displayname>Work</d:displayname></d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

        let calendars = scan_propfind_listing(xml);
        assert_eq!(calendars.len(), 2);
        assert_eq!(calendars[0].id, "personal");
        assert_eq!(calendars[0].display_name.as_deref(), Some("Personal"));
        assert_eq!(calendars[1].id, "work");
        assert_eq!(calendars[1].display_name.as_deref(), Some("Work"));
    }

    #[test]
    fn propfind_scan_tolerates_unprefixed_elements() {
        let xml = r#"<multistatus xmlns="DAV:">
  <response>
    <href>/remote.php/dav/calendars/jane/holidays/</href>
    <propstat><prop><displayname>Holidays</displayname></prop></propstat>
  </response>
</multistatus>"#;

        let calendars = scan_propfind_listing(xml);
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].id, "holidays");
        assert_eq!(calendars[0].display_name.as_deref(), Some("Holidays"));
    }

    #[test]
    fn propfind_scan_missing_displayname_falls_back_to_none() {
        let xml = r#"<multistatus xmlns="DAV:">
  <response><href>/remote.php/dav/calendars/jane/personal/</href></response>
</multistatus>"#;

        let calendars = scan_propfind_listing(xml);
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].id, "personal");
        assert!(calendars[0].display_name.is_none());
    }
}
