// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;
use core::result;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// The loopback network, `127.0.0.0/8`.
pub const LOOPBACK_NET: IpPrefix =
    IpPrefix { ip: Ipv4Addr::from_const([127, 0, 0, 0]), prefix_len: 8 };

/// An IPv4 address.
///
/// The bytes are stored in network order; conversions to and from
/// `u32` produce the host-order value used for prefix arithmetic.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Ipv4Addr {
    inner: [u8; 4],
}

impl Ipv4Addr {
    pub const ANY_ADDR: Self = Self { inner: [0; 4] };

    /// Return the bytes of the address.
    #[inline]
    pub fn bytes(&self) -> [u8; 4] {
        self.inner
    }

    pub const fn from_const(bytes: [u8; 4]) -> Self {
        Self { inner: bytes }
    }

    pub fn is_loopback(&self) -> bool {
        LOOPBACK_NET.contains(*self)
    }
}

impl From<core::net::Ipv4Addr> for Ipv4Addr {
    fn from(ip4: core::net::Ipv4Addr) -> Self {
        Self { inner: ip4.octets() }
    }
}

impl From<Ipv4Addr> for core::net::Ipv4Addr {
    fn from(ip4: Ipv4Addr) -> Self {
        Self::from(ip4.inner)
    }
}

impl From<Ipv4Addr> for u32 {
    fn from(ip: Ipv4Addr) -> u32 {
        u32::from_be_bytes(ip.bytes())
    }
}

impl From<u32> for Ipv4Addr {
    fn from(val: u32) -> Self {
        Self { inner: val.to_be_bytes() }
    }
}

impl From<[u8; 4]> for Ipv4Addr {
    fn from(bytes: [u8; 4]) -> Self {
        Self { inner: bytes }
    }
}

impl FromStr for Ipv4Addr {
    type Err = String;

    fn from_str(val: &str) -> result::Result<Self, Self::Err> {
        let octets: Vec<u8> = val
            .split('.')
            .map(|s| s.parse().map_err(|e| format!("{e}")))
            .collect::<result::Result<Vec<u8>, _>>()?;

        if octets.len() != 4 {
            return Err(format!("malformed ip: {val}"));
        }

        Ok(Self { inner: [octets[0], octets[1], octets[2], octets[3]] })
    }
}

impl Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.inner[0], self.inner[1], self.inner[2], self.inner[3],
        )
    }
}

// There's no reason to view an Ipv4Addr as its raw array, so just
// present it in a human-friendly manner.
impl Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Addr {{ inner: {self} }}")
    }
}

/// The largest valid IPv4 prefix length.
pub const IPV4_MAX_PREFIX: u8 = 32;

/// An address paired with a prefix length, as carried by a rule.
///
/// Unlike a normalised CIDR the address is kept exactly as given; the
/// host bits are simply ignored when matching. A prefix length of 0
/// means "any address".
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IpPrefix {
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
}

impl IpPrefix {
    pub const ANY: Self = Self { ip: Ipv4Addr::ANY_ADDR, prefix_len: 0 };

    pub fn new(ip: Ipv4Addr, prefix_len: u8) -> result::Result<Self, String> {
        if prefix_len > IPV4_MAX_PREFIX {
            return Err(format!("bad prefix length: {prefix_len}"));
        }

        Ok(Self { ip, prefix_len })
    }

    /// A prefix matching exactly one host.
    pub fn host(ip: Ipv4Addr) -> Self {
        Self { ip, prefix_len: IPV4_MAX_PREFIX }
    }

    pub fn is_any(&self) -> bool {
        self.prefix_len == 0
    }

    /// Is `ip` covered by this prefix?
    ///
    /// A prefix length of 0 matches every address. A prefix length
    /// outside the valid range never matches.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        match self.prefix_len {
            0 => true,
            len @ 1..=IPV4_MAX_PREFIX => {
                let host_bits = IPV4_MAX_PREFIX - len;
                let pkt = u32::from(ip) >> host_bits;
                let rule = u32::from(self.ip) >> host_bits;
                pkt == rule
            }
            _ => false,
        }
    }
}

impl FromStr for IpPrefix {
    type Err = String;

    /// Convert a string like "any", "10.0.0.5" or "10.0.0.0/8" into an
    /// `IpPrefix`.
    fn from_str(val: &str) -> result::Result<Self, Self::Err> {
        if val.eq_ignore_ascii_case("any") {
            return Ok(Self::ANY);
        }

        let (ip_s, prefix_s) = match val.split_once('/') {
            Some(v) => v,
            None => (val, "32"),
        };

        let ip = match ip_s.parse() {
            Ok(v) => v,
            Err(e) => return Err(format!("bad IP: {e}")),
        };

        let raw = match prefix_s.parse::<u8>() {
            Ok(v) => v,
            Err(e) => {
                return Err(format!("bad prefix length: {e}"));
            }
        };

        IpPrefix::new(ip, raw)
    }
}

impl Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_any() {
            return write!(f, "any");
        }

        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

impl From<Ipv4Addr> for IpPrefix {
    fn from(ip: Ipv4Addr) -> Self {
        Self::host(ip)
    }
}
