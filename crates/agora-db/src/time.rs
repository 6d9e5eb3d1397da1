//! Timestamp formatting shared by every table.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! precision, so comparing the text columns orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format `dt` in the storage representation.
pub fn format(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The current time in the storage representation.
pub fn now() -> String {
    format(Utc::now())
}
