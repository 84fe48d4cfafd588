//! Common types shared by the cache, resolver and stats aggregator

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc, Weekday};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Layout of every timestamp persisted in a cache record.
///
/// The quotes around `T` are literal, e.g. `2024-03-01'T'12:00:00Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d'T'%H:%M:%SZ";

/// Version reported when the tags fallback yields no usable tag
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Request counts keyed by `"<iso_year>-<iso_week>"`, oldest bucket first
pub type WeeklyStats = IndexMap<String, u64>;

/// A forge project. Used verbatim as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey {
    pub owner: String,
    pub repo: String,
}

impl ProjectKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses an `owner/repo` path.
    ///
    /// Returns `None` unless the path has exactly two non-empty segments.
    pub fn parse(path: &str) -> Option<Self> {
        let mut segments = path.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Some(Self::new(owner, repo))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Cached information about a single project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Last HTTP status observed from the forge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Time of the last successful forge round-trip
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    /// Time of the last stats aggregation
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub stats_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: WeeklyStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_versions: Option<Vec<String>>,
}

/// An ISO year/week pair used to bucket request counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekBucket {
    pub year: i32,
    pub week: u32,
}

impl WeekBucket {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// Returns the ISO week containing `time`.
    pub fn containing(time: DateTime<Utc>) -> Self {
        let iso = time.iso_week();
        Self::new(iso.year(), iso.week())
    }

    /// Parses a `"year-week"` key.
    pub fn parse(key: &str) -> Option<Self> {
        let (year, week) = key.split_once('-')?;
        Some(Self::new(year.parse().ok()?, week.parse().ok()?))
    }

    /// Returns the first instant counted in this bucket.
    ///
    /// For a valid ISO week this is its Monday. Anything else (such as the
    /// week-0 stats epoch) falls back to January 1st offset by `week - 1` weeks.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        let date = NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).or_else(|| {
            NaiveDate::from_ymd_opt(self.year, 1, 1)?
                .checked_add_signed(TimeDelta::weeks(i64::from(self.week) - 1))
        })?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

impl fmt::Display for WeekBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.week)
    }
}

/// Current UTC time truncated to whole seconds, the precision of cache records
pub fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Serde adapter for optional timestamps in [`TIMESTAMP_FORMAT`].
///
/// Unparsable values read as missing, which makes the entry stale.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.collect_str(&time.format(TIMESTAMP_FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|s| {
            NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        }))
    }
}
