// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The packet filtering engine.
//!
//! Leaves first: [`headers`] and [`checksum`] deal in raw bytes,
//! [`packet`] turns a frame into a classified view, [`predicate`] and
//! [`rule`] make the stateless decision, [`tcp_state`] and
//! [`conn_table`] make the stateful one, and [`proxy`] redirects
//! selected flows. [`firewall`] ties them together behind a single
//! context object.

pub mod audit;
pub mod checksum;
pub mod conn_table;
pub mod firewall;
pub mod headers;
pub mod packet;
pub mod predicate;
pub mod proxy;
pub mod rule;
pub mod tcp_state;
