//! Well-known context type names.
//!
//! Constants to prevent typos; any non-empty string is a valid type.

pub const CONTACT: &str = "fdc3.contact";
pub const CONTACT_LIST: &str = "fdc3.contactList";
pub const COUNTRY: &str = "fdc3.country";
pub const INSTRUMENT: &str = "fdc3.instrument";
pub const INSTRUMENT_LIST: &str = "fdc3.instrumentList";
pub const ORGANIZATION: &str = "fdc3.organization";
pub const PORTFOLIO: &str = "fdc3.portfolio";
pub const POSITION: &str = "fdc3.position";
