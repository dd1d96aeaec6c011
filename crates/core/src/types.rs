/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Alert identifiers are milliseconds since the Unix epoch at creation,
/// bumped forward when two alerts share a millisecond.
pub type AlertId = i64;
