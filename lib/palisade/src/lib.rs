// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Palisade: a stateful IPv4 packet filter engine.
//!
//! The engine classifies each frame handed to it, runs it through an
//! ordered rule table, tracks the shape of every TCP connection it
//! lets through, and transparently redirects HTTP and FTP flows to
//! local proxies by rewriting headers in place. The entry point is
//! [`engine::firewall::Firewall::inspect`].

#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

extern crate alloc;

pub use palisade_api as api;

pub mod cfg;
pub mod ddi;
pub mod engine;
#[cfg(feature = "std")]
pub mod print;
pub mod provider;
