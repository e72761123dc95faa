/// Boards are identified by the BaaS row UUID, carried as text.
pub type BoardId = String;

/// Canvas object identity, stored as opaque metadata on the object.
pub type ObjectId = String;

/// Authenticated user id (the JWT `sub` claim).
pub type UserId = String;

/// Lock timestamps are epoch milliseconds, matching the browser clock format.
pub type EpochMillis = i64;

/// All server-side timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}
