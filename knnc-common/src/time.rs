//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds since the Unix epoch, used to stamp exported report file names
pub fn unix_seconds() -> i64 {
    now().timestamp()
}
