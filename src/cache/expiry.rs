//! Expiry Record Module
//!
//! Fixed-size expiration metadata stored next to every cached value, and the
//! rules deciding when an entry stops being live.
//!
//! All timestamps and durations are ticks: 100-nanosecond units counted from
//! the Unix epoch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Encoded size of an [`ExpiryRecord`] in bytes
pub const EXPIRY_RECORD_LEN: usize = 24;

/// Sentinel for an unset deadline or sliding window
pub const NOT_SET: i64 = -1;

const NANOS_PER_TICK: u128 = 100;
const TICKS_PER_SECOND: i64 = 10_000_000;

// == Expiration Options ==
/// Per-entry expiration settings; any subset may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirationOptions {
    /// Fixed wall-clock deadline
    pub absolute_deadline: Option<DateTime<Utc>>,
    /// Deadline expressed as a duration from the time of the write
    pub relative_to_now: Option<Duration>,
    /// Window that restarts on every successful read
    pub sliding: Option<Duration>,
}

impl ExpirationOptions {
    /// Options for an entry that never expires.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_absolute_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.absolute_deadline = Some(deadline);
        self
    }

    pub fn with_relative_to_now(mut self, ttl: Duration) -> Self {
        self.relative_to_now = Some(ttl);
        self
    }

    pub fn with_sliding(mut self, window: Duration) -> Self {
        self.sliding = Some(window);
        self
    }
}

// == Expiry Record ==
/// Expiration metadata for one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryRecord {
    /// Time of creation or of the last successful read
    pub last_accessed_ticks: i64,
    /// Sliding window length, or [`NOT_SET`]
    pub sliding_offset_ticks: i64,
    /// Absolute deadline, or [`NOT_SET`]
    pub absolute_deadline_ticks: i64,
}

impl Default for ExpiryRecord {
    fn default() -> Self {
        Self {
            last_accessed_ticks: NOT_SET,
            sliding_offset_ticks: NOT_SET,
            absolute_deadline_ticks: NOT_SET,
        }
    }
}

impl ExpiryRecord {
    // == Constructor ==
    /// Resolves `options` against `now` into a record.
    ///
    /// When both an absolute deadline and a relative duration are given the
    /// earlier of the two wins. The sliding window is kept as-is either way.
    ///
    /// Deadlines before the epoch are stored as 0 so none of them can land on
    /// [`NOT_SET`]; they are already in the past either way.
    pub fn from_options(options: &ExpirationOptions, now: i64) -> Self {
        let absolute = options.absolute_deadline.map(datetime_to_ticks);
        let relative = options
            .relative_to_now
            .map(|ttl| now.saturating_add(duration_to_ticks(ttl)));

        let absolute_deadline_ticks = absolute
            .into_iter()
            .chain(relative)
            .min()
            .map(|deadline| deadline.max(0))
            .unwrap_or(NOT_SET);

        Self {
            last_accessed_ticks: now,
            sliding_offset_ticks: options.sliding.map(duration_to_ticks).unwrap_or(NOT_SET),
            absolute_deadline_ticks,
        }
    }

    // == Decode ==
    /// Parses a record from exactly [`EXPIRY_RECORD_LEN`] little-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; EXPIRY_RECORD_LEN] =
            bytes.try_into().map_err(|_| CacheError::Format {
                expected: EXPIRY_RECORD_LEN,
                actual: bytes.len(),
            })?;

        let field = |offset: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[offset..offset + 8]);
            i64::from_le_bytes(raw)
        };

        Ok(Self {
            last_accessed_ticks: field(0),
            sliding_offset_ticks: field(8),
            absolute_deadline_ticks: field(16),
        })
    }

    // == Encode ==
    pub fn to_bytes(&self) -> [u8; EXPIRY_RECORD_LEN] {
        let mut out = [0u8; EXPIRY_RECORD_LEN];
        out[0..8].copy_from_slice(&self.last_accessed_ticks.to_le_bytes());
        out[8..16].copy_from_slice(&self.sliding_offset_ticks.to_le_bytes());
        out[16..24].copy_from_slice(&self.absolute_deadline_ticks.to_le_bytes());
        out
    }

    // == Is Expired ==
    /// Checks the record against `now`.
    ///
    /// A resolved absolute deadline is authoritative and the sliding window is
    /// ignored. Without one, the sliding window measured from the last access
    /// applies. With neither, the entry never expires.
    pub fn is_expired(&self, now: i64) -> bool {
        if self.absolute_deadline_ticks != NOT_SET {
            return now > self.absolute_deadline_ticks;
        }

        if self.sliding_offset_ticks != NOT_SET {
            return now
                > self
                    .last_accessed_ticks
                    .saturating_add(self.sliding_offset_ticks);
        }

        false
    }

    /// Returns a copy with the access time moved to `now`.
    pub fn touched(&self, now: i64) -> Self {
        Self {
            last_accessed_ticks: now,
            ..*self
        }
    }

    /// The instant after which the record is expired, if any bound applies.
    pub fn deadline_ticks(&self) -> Option<i64> {
        if self.absolute_deadline_ticks != NOT_SET {
            Some(self.absolute_deadline_ticks)
        } else if self.sliding_offset_ticks != NOT_SET {
            Some(
                self.last_accessed_ticks
                    .saturating_add(self.sliding_offset_ticks),
            )
        } else {
            None
        }
    }
}

// == Tick Conversions ==
/// Current UTC time in ticks.
pub fn now_ticks() -> i64 {
    datetime_to_ticks(Utc::now())
}

pub fn datetime_to_ticks(at: DateTime<Utc>) -> i64 {
    at.timestamp()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(i64::from(at.timestamp_subsec_nanos()) / NANOS_PER_TICK as i64)
}

/// Converts a duration to ticks, saturating at `i64::MAX`.
pub fn duration_to_ticks(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos() / NANOS_PER_TICK).unwrap_or(i64::MAX)
}
