// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Administrative commands and their responses.

use super::conn::ConnDump;
use super::conn::ConnId;
use super::rule::Rule;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// Marker for commands which return nothing on success.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct NoResp {
    pub unused: u64,
}

/// Replace the entire rule table with `rules`.
///
/// The batch is all or nothing: if any rule is invalid the table is
/// left inactive and empty.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SetRulesReq {
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DumpRulesResp {
    pub active: bool,
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DumpConnsResp {
    pub conns: Vec<ConnDump>,
}

/// Sent by a proxy once it has bound its server-facing socket:
/// `client` is the redirected client and `proxy_port` the local port
/// the proxy will use toward the server.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct SetProxyPortReq {
    pub client: ConnId,
    pub proxy_port: u16,
}

/// The server the proxy should connect to on behalf of the client.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SetProxyPortResp {
    pub server: ConnId,
}

/// Pre-authorize the next connection opened for `client`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ReserveFtpDataReq {
    pub client: ConnId,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PalisadeError {
    BadConfig(String),
    BadProxyPort(u16),
    BadRule { index: usize, reason: String },
    MaxCapacity(u64),
    NoProxyConn(ConnId),
    TooManyRules { count: usize, max: usize },
}

impl Display for PalisadeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadConfig(msg) => write!(f, "bad config: {msg}"),
            Self::BadProxyPort(port) => write!(f, "bad proxy port: {port}"),
            Self::BadRule { index, reason } => {
                write!(f, "bad rule at index {index}: {reason}")
            }
            Self::MaxCapacity(limit) => {
                write!(f, "table at max capacity: {limit}")
            }
            Self::NoProxyConn(client) => {
                write!(f, "no proxied connection for client {client}")
            }
            Self::TooManyRules { count, max } => {
                write!(f, "too many rules: {count} > {max}")
            }
        }
    }
}

#[cfg(any(feature = "std", test))]
impl std::error::Error for PalisadeError {}
