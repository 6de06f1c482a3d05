//! Provider library for the calwidget OAuth helper.
//!
//! The helper authenticates the calendar widget against one of two
//! providers and reports the account's calendars in one canonical schema:
//!
//! ```text
//! ┌─────────────────┐      ┌──────────────────────┐
//! │  Google OAuth2  │      │  Nextcloud OAuth2    │
//! │  (installed app)│      │  (+ CalDAV fallback) │
//! └────────┬────────┘      └──────────┬───────────┘
//!          │                          │
//!          │       TokenProvider      │
//!          └───────────┬──────────────┘
//!                      ▼
//!            (server_url, access_token)
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//!   calendar discovery       event fetching
//!   {id, summary, primary}   {start, end, summary, location}
//! ```
//!
//! Both flows implement [`TokenProvider`]; [`ensure_credential`] drives the
//! load → validate → refresh → acquire state machine over either one. The
//! stages downstream of authentication only ever see the resolved
//! `(server_url, access_token)` pair.

pub mod calendar;
pub mod caldav;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod google;
pub mod listener;
pub mod nextcloud;
pub mod ocs;
pub mod port;
pub mod provider;
pub mod redact;
pub mod store;

// Re-export main types at crate root
pub use calendar::{CalendarEntry, CalendarList};
pub use caldav::{EventList, EventRecord, fetch_events};
pub use discovery::discover_calendars;
pub use endpoints::{ResolvedEndpoints, resolve_endpoints};
pub use error::{HelperError, HelperErrorCode, HelperResult};
pub use provider::{BoxFuture, TokenProvider, ensure_credential};
pub use store::{Credential, Provider, TokenStore};
