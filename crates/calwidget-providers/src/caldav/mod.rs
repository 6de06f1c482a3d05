//! CalDAV access: request bodies, response scanning, event fetching.

pub mod events;
pub mod ics;
pub mod xml;

pub use events::fetch_events;
pub use ics::{EventList, EventRecord};
