//! Opaque pagination cursor for the collection feed.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far back the first run starts reading the feed.
pub const BOOTSTRAP_LOOKBACK_HOURS: i64 = 1;

/// Pagination token handed out by the collection endpoint.
///
/// The API encodes a timestamp in it, but nothing here depends on that except
/// [`Cursor::bootstrap_at`], which forges the very first one, and
/// [`Cursor::timestamp`], which is only used for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Cursor pointing one hour before now.
    pub fn bootstrap() -> Self {
        Self::bootstrap_at(Utc::now())
    }

    /// Cursor pointing [`BOOTSTRAP_LOOKBACK_HOURS`] before `now`.
    pub fn bootstrap_at(now: DateTime<Utc>) -> Self {
        let start = now - Duration::hours(BOOTSTRAP_LOOKBACK_HOURS);
        let encoded = start.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
        Self(BASE64.encode(encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Best-effort decode of the timestamp carried by the cursor.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let bytes = BASE64.decode(&self.0).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}
