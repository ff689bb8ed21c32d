// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use alloc::string::String;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod cmd;
pub mod conn;
pub mod ip;
pub mod rule;

pub use cmd::*;
pub use conn::*;
pub use ip::*;
pub use rule::*;

/// The overall version of the API. Anytime an API is added, removed,
/// or modified, this number should increment. It allows an
/// administrative client to verify that it speaks the same dialect as
/// the engine it is talking to.
pub const API_VERSION: u64 = 1;

bitflags! {
    /// The direction a packet travels relative to the protected
    /// (internal) network.
    ///
    /// `OUT` is internal to external, `IN` is external to internal.
    /// Rules carry a mask of directions, so `ANY` is simply both bits
    /// and a packet on an unmonitored path carries no bits at all.
    #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
    #[serde(transparent)]
    pub struct Direction: u8 {
        const IN = 0x01;
        const OUT = 0x02;
        const ANY = Self::IN.bits() | Self::OUT.bits();
    }
}

impl Direction {
    /// A packet that is on neither monitored path.
    pub const NONE: Self = Self::empty();

    /// Return the opposite direction of a single direction. `ANY` and
    /// `NONE` are their own opposites.
    pub fn flip(self) -> Self {
        if self == Self::IN {
            Self::OUT
        } else if self == Self::OUT {
            Self::IN
        } else {
            self
        }
    }

    /// Does this mask share at least one direction with `other`?
    pub fn overlaps(self, other: Self) -> bool {
        self.intersects(other)
    }
}

impl core::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::IN),
            "out" => Ok(Direction::OUT),
            "any" => Ok(Direction::ANY),
            _ => Err(format!("invalid direction: {s}")),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dirstr = if *self == Direction::IN {
            "in"
        } else if *self == Direction::OUT {
            "out"
        } else if *self == Direction::ANY {
            "any"
        } else {
            "none"
        };

        write!(f, "{dirstr}")
    }
}
