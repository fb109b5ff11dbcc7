//! TTL Index
//!
//! Every write made with a positive TTL appends one `(key, expires_at, version)`
//! entry to an auxiliary list. The expiry sweeper sorts that list and drains the
//! entries whose instant has passed, so a sweep never has to walk the whole
//! keyspace.
//!
//! ## Ordering
//!
//! ```text
//!   [ never ][ never ][ t=3 ][ t=5 ][ t=5 ][ t=9 ][ t=12 ]
//!   └── skipped ────┘└── passed (now = 6) ──┘└── future ──┘
//! ```
//!
//! Entries without an expiration sort first, timed entries follow in ascending
//! order. After sorting, the passed entries form one contiguous run, and the
//! first future entry ends the scan.
//!
//! ## Stale Entries
//!
//! The index is append-only outside of a sweep: overwriting or deleting a key does
//! not remove its entries. Each entry carries the write version that produced it,
//! and the engine only evicts a key when the stored version still matches.

use std::time::{Duration, Instant};

/// Time-to-live requested by a write.
///
/// This is the strongly typed form of the signed TTL the text protocol carries:
/// zero means "no expiration", negative means "delete instead of writing",
/// positive means "expire after this long".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Keep the key forever. Clears any expiration the key had before.
    #[default]
    Persist,
    /// Remove the key instead of writing it.
    Delete,
    /// Expire the key once this much time has passed.
    Expire(Duration),
}

impl Ttl {
    /// Builds a TTL from a signed number of seconds.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Ttl::Persist,
            s if s < 0 => Ttl::Delete,
            s => Ttl::Expire(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Returns the absolute expiration for a write performed at `now`.
    ///
    /// A duration too large to be represented as an `Instant` never expires.
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        match self {
            Ttl::Expire(duration) => now.checked_add(*duration),
            Ttl::Persist | Ttl::Delete => None,
        }
    }
}

/// One record of the TTL index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TtlEntry {
    /// Key the write targeted
    pub key: String,
    /// When the write expires (None = never)
    pub expires_at: Option<Instant>,
    /// Version stamped on the stored value by the same write
    pub version: u64,
}

/// Append-only list of expirations, compacted by [`TtlIndex::drain_expired`].
#[derive(Debug, Default)]
pub(crate) struct TtlIndex {
    entries: Vec<TtlEntry>,
}

impl TtlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TtlEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorts never-expiring entries first, then timed entries ascending.
    ///
    /// `Option<Instant>` orders `None` below every `Some`, which is exactly the
    /// required layout. The sort is stable.
    pub fn sort(&mut self) {
        self.entries.sort_by_key(|entry| entry.expires_at);
    }

    /// Removes and returns every entry whose expiration is at or before `now`.
    ///
    /// The never-expiring prefix and the future suffix stay in the index.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<TtlEntry> {
        self.sort();

        let start = self
            .entries
            .partition_point(|entry| entry.expires_at.is_none());
        let passed = self.entries[start..]
            .partition_point(|entry| entry.expires_at.is_some_and(|at| at <= now));

        self.entries.drain(start..start + passed).collect()
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[TtlEntry] {
        &self.entries
    }
}
