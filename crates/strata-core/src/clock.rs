//! Hybrid logical clock.
//!
//! Versions pack physical milliseconds in the upper 44 bits and a logical
//! counter in the lower 20 bits, so plain integer order is the clock order.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use time::OffsetDateTime;

///
/// Version
///
/// Hybrid logical clock timestamp. Every committed mutation of one store
/// carries a distinct, strictly increasing version.
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const LOGICAL_BITS: u32 = 20;
    pub const LOGICAL_MASK: u64 = (1 << Self::LOGICAL_BITS) - 1;
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn from_parts(physical_millis: u64, logical: u32) -> Self {
        Self((physical_millis << Self::LOGICAL_BITS) | (logical as u64 & Self::LOGICAL_MASK))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Physical wall-clock component in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn physical_millis(self) -> u64 {
        self.0 >> Self::LOGICAL_BITS
    }

    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub const fn logical(self) -> u32 {
        (self.0 & Self::LOGICAL_MASK) as u32
    }

    /// The version immediately preceding this one.
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Approximate wall-clock time encoded in the version.
    #[must_use]
    pub fn timestamp(self) -> Option<OffsetDateTime> {
        let nanos = i128::from(self.physical_millis()) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }

    /// True when the physical component lies within `within` of `now_millis`.
    #[must_use]
    pub const fn is_recent(self, now_millis: u64, within: Duration) -> bool {
        let physical = self.physical_millis();
        #[expect(clippy::cast_possible_truncation)]
        let window = within.as_millis() as u64;

        physical <= now_millis.saturating_add(1) && now_millis.saturating_sub(physical) <= window
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical_millis(), self.logical())
    }
}

///
/// TimeSource
///

pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> u64;
}

///
/// SystemTimeSource
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[expect(clippy::cast_possible_truncation)]
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

///
/// ManualTimeSource
/// Externally driven time, for deterministic tests and replays.
///

#[derive(Debug, Default)]
pub struct ManualTimeSource(AtomicU64);

impl ManualTimeSource {
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self(AtomicU64::new(millis))
    }

    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        #[expect(clippy::cast_possible_truncation)]
        let by = by.as_millis() as u64;
        self.0.fetch_add(by, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

///
/// HlcClock
///
/// Thread-safe monotonic version generator. Within one physical millisecond
/// the logical counter increments; when it saturates the clock borrows the
/// next millisecond instead of repeating a version.
///

pub struct HlcClock {
    time: Arc<dyn TimeSource>,
    last: Mutex<Version>,
}

impl HlcClock {
    #[must_use]
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            time,
            last: Mutex::new(Version::ZERO),
        }
    }

    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }

    /// Issue the next version.
    pub fn now(&self) -> Version {
        let physical = self.time.now_millis();
        let mut last = self.last.lock();
        let next = Self::advance(*last, physical);
        *last = next;

        next
    }

    /// Merge a version produced elsewhere and issue a version strictly
    /// greater than both it and everything issued locally.
    pub fn observe(&self, remote: Version) -> Version {
        let physical = self.time.now_millis();
        let mut last = self.last.lock();
        let floor = (*last).max(remote);
        let next = Self::advance(floor, physical);
        *last = next;

        next
    }

    /// Most recently issued version.
    #[must_use]
    pub fn last(&self) -> Version {
        *self.last.lock()
    }

    #[must_use]
    pub fn now_millis(&self) -> u64 {
        self.time.now_millis()
    }

    fn advance(last: Version, physical: u64) -> Version {
        if physical > last.physical_millis() {
            return Version::from_parts(physical, 0);
        }

        let logical = u64::from(last.logical());
        if logical < Version::LOGICAL_MASK {
            Version::from_raw(last.raw() + 1)
        } else {
            Version::from_parts(last.physical_millis() + 1, 0)
        }
    }
}

impl fmt::Debug for HlcClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HlcClock")
            .field("last", &self.last())
            .finish_non_exhaustive()
    }
}

///
/// TESTS
///
