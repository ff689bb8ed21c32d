// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Predicates used for `Rule` matching.

use crate::api::AckMask;
use crate::api::Direction;
use crate::api::IpPrefix;
use crate::api::Ipv4Addr;
use crate::api::PORT_ABOVE_1023;
use crate::api::PORT_ANY;

/// The highest port that is not "above 1023".
const PORT_PRIVILEGED_MAX: u16 = PORT_ABOVE_1023 - 1;

/// Does `pkt_ip` fall under `rule_ip/prefix_len`?
///
/// A prefix length of 0 matches every address, whatever the rule's
/// address is. An out of range prefix length never matches.
pub fn ip_matches(pkt_ip: Ipv4Addr, rule_ip: Ipv4Addr, prefix_len: u8) -> bool {
    IpPrefix { ip: rule_ip, prefix_len }.contains(pkt_ip)
}

/// Does `pkt_port` satisfy the rule's port value?
///
/// [`PORT_ANY`] matches every port and [`PORT_ABOVE_1023`] matches
/// every port from 1024 up; any other value must be equal.
pub fn port_matches(pkt_port: u16, rule_port: u16) -> bool {
    match rule_port {
        PORT_ANY => true,
        PORT_ABOVE_1023 => pkt_port > PORT_PRIVILEGED_MAX,
        exact => pkt_port == exact,
    }
}

pub fn dir_matches(pkt_dir: Direction, rule_dir: Direction) -> bool {
    pkt_dir.overlaps(rule_dir)
}

pub fn ack_matches(pkt_ack: AckMask, rule_ack: AckMask) -> bool {
    pkt_ack.intersects(rule_ack)
}
