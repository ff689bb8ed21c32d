// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Moments, TTLs and wall-clock stamps.
use core::ops::Add;
use core::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// The number of milliseconds in a second.
pub const MILLIS: u64 = 1_000;

/// A moment in time, taken from the monotonic clock.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Moment {
    inner: Instant,
}

impl Add<Duration> for Moment {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Moment { inner: self.inner + rhs }
    }
}

impl Moment {
    /// Compute the delta between `self - earlier` and return it as
    /// milliseconds. A moment earlier than `earlier` yields 0.
    pub fn delta_as_millis(&self, earlier: Moment) -> u64 {
        let delta = self.inner.saturating_duration_since(earlier.inner);
        delta.as_secs() * MILLIS + u64::from(delta.subsec_millis())
    }

    pub fn now() -> Self {
        Self { inner: Instant::now() }
    }
}

impl Default for Moment {
    fn default() -> Self {
        Self::now()
    }
}

/// The Time To Live in milliseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ttl(u64);

impl Ttl {
    pub fn as_seconds(&self) -> u64 {
        self.0 / MILLIS
    }

    pub fn as_milliseconds(&self) -> u64 {
        self.0
    }

    /// Is `last_hit` expired?
    pub fn is_expired(&self, last_hit: Moment, now: Moment) -> bool {
        now.delta_as_millis(last_hit) >= self.0
    }

    /// Create a new TTL based on seconds.
    pub const fn new_seconds(seconds: u64) -> Self {
        Ttl(seconds * MILLIS)
    }
}

/// Seconds since the UNIX epoch, as stamped on audit events.
///
/// A clock set before the epoch stamps 0 rather than failing the
/// verdict path.
pub fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
