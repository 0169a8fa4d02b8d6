//! # Time
//!
//! `Timestamp` is a UTC instant truncated to whole microseconds, the
//! resolution of PostgreSQL `timestamptz`, so values survive a database
//! round trip unchanged. The serialized form is RFC 3339 with the `Z` suffix;
//! fractional digits appear only when the sub-second part is nonzero
//! (`2026-01-15T12:00:00Z`, `2026-01-15T12:00:00.250Z`). Timezone-aware
//! inputs are normalized to UTC on the lenient path and rejected on the
//! strict one.
//!
//! Components never call `Utc::now()` directly. They hold a [`Clock`], so TTL
//! expiry and retention cutoffs can be driven deterministically in tests via
//! [`ManualClock`]. Wall-clock adjustments on the host are not compensated,
//! except by [`MonotonicClock`], which never repeats or goes backwards.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC-only timestamp with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "DateTime<Utc>")]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// From a `DateTime<Utc>`, truncating to microseconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(6))
    }

    /// Parse an RFC 3339 string that carries the `Z` suffix.
    ///
    /// # Errors
    ///
    /// Rejects explicit offsets (including `+00:00`) and malformed input.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::Timestamp(format!(
                "{s:?} must use the Z suffix"
            )));
        }
        Self::parse_lenient(s)
    }

    /// Parse any RFC 3339 string, converting the offset to UTC.
    pub fn parse_lenient(s: &str) -> Result<Self, ValidationError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| ValidationError::Timestamp(format!("{s:?}: {e}")))?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// From Unix epoch seconds.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| ValidationError::Timestamp(format!("epoch {secs} out of range")))
    }

    /// The inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// `self + d`, or `None` on overflow.
    pub fn checked_add(&self, d: Duration) -> Option<Self> {
        self.0.checked_add_signed(d).map(Self::from_utc)
    }

    /// `self - d`, or `None` on overflow.
    pub fn checked_sub(&self, d: Duration) -> Option<Self> {
        self.0.checked_sub_signed(d).map(Self::from_utc)
    }

    /// The smallest representable instant after `self`.
    pub fn successor(&self) -> Self {
        self.checked_add(Duration::microseconds(1)).unwrap_or(*self)
    }

    /// ISO 8601 with `Z`, e.g. `2026-01-15T12:00:00Z`.
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current UTC instant.
    fn now(&self) -> Timestamp;
}

/// The host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward. Saturates at the current instant on overflow.
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add(d) {
            *now = next;
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, ts: Timestamp) {
        *self.now.lock() = ts;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Wraps a clock so that successive readings strictly increase. A reading
/// that does not move past the previous one is bumped to its successor.
#[derive(Debug)]
pub struct MonotonicClock {
    inner: Arc<dyn Clock>,
    last: Mutex<Option<Timestamp>>,
}

impl MonotonicClock {
    pub fn new(inner: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let now = self.inner.now();
        let mut last = self.last.lock();
        let next = match *last {
            Some(prev) if now <= prev => prev.successor(),
            _ => now,
        };
        *last = Some(next);
        next
    }
}
