// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The static rule table and its matcher.
//!
//! The table is an ordered list: the first rule that matches a packet
//! decides its fate. A table is either wholly loaded or inactive, and
//! an inactive table accepts everything. Loading a batch is all or
//! nothing; one bad rule deactivates the table rather than leaving a
//! partial rule set in place.

use super::packet::Packet;
use super::packet::PacketType;
use super::predicate::ack_matches;
use super::predicate::dir_matches;
use super::predicate::ip_matches;
use super::predicate::port_matches;
use crate::api::AckMask;
use crate::api::Action;
use crate::api::Direction;
use crate::api::IPV4_MAX_PREFIX;
use crate::api::PORT_ABOVE_1023;
use crate::api::PalisadeError;
use crate::api::Reason;
use crate::api::Rule;
use alloc::string::ToString;
use alloc::vec::Vec;
use thiserror::Error;

/// The largest number of rules a table can ever hold: a rule's index
/// must fit in a [`Reason::Rule`].
pub const RULE_TABLE_LIMIT: usize = u8::MAX as usize + 1;

/// Why a single rule is invalid.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum RuleError {
    #[error("direction mask is empty or has unknown bits: {0:#x}")]
    BadDirection(u8),

    #[error("{which} prefix length {len} is larger than 32")]
    BadPrefix { which: &'static str, len: u8 },

    #[error("{which} port {port} is neither 0..=1023 nor 1024 (above 1023)")]
    BadPort { which: &'static str, port: u16 },

    #[error("ack mask is empty or has unknown bits: {0:#x}")]
    BadAck(u8),
}

impl RuleError {
    /// Attach the position of the offending rule within its batch.
    pub fn at(self, index: usize) -> PalisadeError {
        PalisadeError::BadRule { index, reason: self.to_string() }
    }
}

/// Check the invariants the rule's types cannot express.
pub fn validate_rule(rule: &Rule) -> Result<(), RuleError> {
    if rule.direction.is_empty() || !Direction::ANY.contains(rule.direction) {
        return Err(RuleError::BadDirection(rule.direction.bits()));
    }

    for (which, prefix) in [("source", &rule.src), ("destination", &rule.dst)]
    {
        if prefix.prefix_len > IPV4_MAX_PREFIX {
            return Err(RuleError::BadPrefix { which, len: prefix.prefix_len });
        }
    }

    for (which, port) in
        [("source", rule.src_port), ("destination", rule.dst_port)]
    {
        if port > PORT_ABOVE_1023 {
            return Err(RuleError::BadPort { which, port });
        }
    }

    if rule.ack.is_empty() || !AckMask::ANY.contains(rule.ack) {
        return Err(RuleError::BadAck(rule.ack.bits()));
    }

    Ok(())
}

#[derive(Debug)]
pub struct RuleTable {
    active: bool,
    rules: Vec<Rule>,
    max_rules: usize,
}

impl RuleTable {
    /// A new table, inactive until its first successful load.
    pub fn new(max_rules: usize) -> Self {
        Self {
            active: false,
            rules: Vec::new(),
            max_rules: max_rules.min(RULE_TABLE_LIMIT),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn max_rules(&self) -> usize {
        self.max_rules
    }

    /// The rules in match order. An inactive table has none.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Replace the whole table with `rules`.
    ///
    /// # Errors
    ///
    /// If the batch is too large or any rule in it is invalid, the
    /// table is left inactive and empty and the first problem found is
    /// returned.
    pub fn set(&mut self, rules: Vec<Rule>) -> Result<(), PalisadeError> {
        let res = self.check_batch(&rules);
        match res {
            Ok(()) => {
                self.rules = rules;
                self.active = true;
            }

            Err(_) => self.deactivate(),
        }
        res
    }

    pub fn deactivate(&mut self) {
        self.rules.clear();
        self.active = false;
    }

    fn check_batch(&self, rules: &[Rule]) -> Result<(), PalisadeError> {
        if rules.len() > self.max_rules {
            return Err(PalisadeError::TooManyRules {
                count: rules.len(),
                max: self.max_rules,
            });
        }

        for (i, rule) in rules.iter().enumerate() {
            validate_rule(rule).map_err(|e| e.at(i))?;
        }

        Ok(())
    }
}

/// Does `rule` match `pkt`?
pub fn rule_matches(rule: &Rule, pkt: &Packet<'_>) -> bool {
    if !dir_matches(pkt.direction, rule.direction)
        || !ip_matches(pkt.src_ip, rule.src.ip, rule.src.prefix_len)
        || !ip_matches(pkt.dst_ip, rule.dst.ip, rule.dst.prefix_len)
        || !rule.protocol.matches(pkt.protocol)
    {
        return false;
    }

    match pkt.ptype {
        PacketType::Tcp => {
            port_matches(pkt.src_port, rule.src_port)
                && port_matches(pkt.dst_port, rule.dst_port)
                && ack_matches(pkt.ack, rule.ack)
        }

        PacketType::Udp => {
            port_matches(pkt.src_port, rule.src_port)
                && port_matches(pkt.dst_port, rule.dst_port)
        }

        _ => true,
    }
}

/// Run `pkt` through `table`: the stateless verdict.
///
/// An inactive table accepts with [`Reason::FwInactive`]. Otherwise
/// the first matching rule decides, and its index is the reason. A
/// packet no rule matches is dropped with [`Reason::NoMatchingRule`].
pub fn evaluate(pkt: &Packet<'_>, table: &RuleTable) -> (Action, Reason) {
    if !table.is_active() {
        return (Action::Accept, Reason::FwInactive);
    }

    table
        .rules()
        .iter()
        .enumerate()
        .find(|(_, rule)| rule_matches(rule, pkt))
        .map(|(idx, rule)| (rule.action, Reason::Rule(idx as u8)))
        .unwrap_or((Action::Drop, Reason::NoMatchingRule))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Ipv4Addr;
    use crate::api::PORT_ANY;
    use crate::api::RuleName;
    use crate::api::RuleProto;
    use crate::cfg::FirewallCfg;
    use crate::engine::headers::TcpFlags;
    use crate::engine::headers::emit;
    use crate::engine::packet::HookStage;
    use crate::engine::packet::IfacePath;

    const OUT: IfacePath<'static> = IfacePath {
        ingress: Some("enp0s8"),
        egress: Some("enp0s9"),
    };

    fn rule(name: &str, dir: Direction, action: Action) -> Rule {
        Rule::any(RuleName::new(name).unwrap(), dir, action)
    }

    fn http_out() -> Rule {
        rule("http_out", Direction::OUT, Action::Accept)
            .with_dst(Ipv4Addr::from([93, 184, 216, 34]), 32)
            .with_proto(RuleProto::TCP)
            .with_ports(PORT_ANY, 80)
    }

    fn eval_frame(frame: &mut [u8], table: &RuleTable) -> (Action, Reason) {
        let cfg = FirewallCfg::default();
        let pkt =
            Packet::classify(frame, HookStage::PreRouting, &OUT, &cfg).unwrap();
        evaluate(&pkt, table)
    }

    fn syn() -> alloc::vec::Vec<u8> {
        emit::tcp(
            Ipv4Addr::from([10, 0, 0, 5]),
            53211,
            Ipv4Addr::from([93, 184, 216, 34]),
            80,
            TcpFlags::SYN,
        )
    }

    #[test]
    fn inactive_accepts() {
        let table = RuleTable::new(50);
        assert!(!table.is_active());
        assert_eq!(
            eval_frame(&mut syn(), &table),
            (Action::Accept, Reason::FwInactive)
        );
    }

    #[test]
    fn first_match_wins() {
        let broad = rule("all_out", Direction::OUT, Action::Accept);
        let narrow = http_out().with_ack(AckMask::NO);
        let narrow = Rule { action: Action::Drop, ..narrow };

        let mut table = RuleTable::new(50);
        table.set(vec![broad.clone(), narrow.clone()]).unwrap();
        assert_eq!(
            eval_frame(&mut syn(), &table),
            (Action::Accept, Reason::Rule(0))
        );

        table.set(vec![narrow, broad]).unwrap();
        assert_eq!(
            eval_frame(&mut syn(), &table),
            (Action::Drop, Reason::Rule(0))
        );
    }

    #[test]
    fn no_match_drops() {
        let mut table = RuleTable::new(50);
        table.set(vec![http_out()]).unwrap();

        let mut dns = emit::udp(
            Ipv4Addr::from([10, 0, 0, 5]),
            5353,
            Ipv4Addr::from([8, 8, 8, 8]),
            53,
        );
        assert_eq!(
            eval_frame(&mut dns, &table),
            (Action::Drop, Reason::NoMatchingRule)
        );

        let mut empty = RuleTable::new(50);
        empty.set(vec![]).unwrap();
        assert!(empty.is_active());
        assert_eq!(
            eval_frame(&mut syn(), &empty),
            (Action::Drop, Reason::NoMatchingRule)
        );
    }

    #[test]
    fn protocol_specific_checks() {
        // ICMP ignores ports, UDP ignores the ack mask, TCP needs both.
        let tight = rule("tight", Direction::ANY, Action::Accept)
            .with_ports(PORT_ABOVE_1023, 22)
            .with_ack(AckMask::YES);
        let mut table = RuleTable::new(50);
        table.set(vec![tight]).unwrap();

        let client = Ipv4Addr::from([10, 0, 0, 5]);
        let server = Ipv4Addr::from([93, 184, 216, 34]);

        let mut ping = emit::icmp(client, server);
        assert_eq!(eval_frame(&mut ping, &table).0, Action::Accept);

        let mut udp = emit::udp(client, 40000, server, 22);
        assert_eq!(eval_frame(&mut udp, &table).0, Action::Accept);

        let mut tcp = emit::tcp(client, 40000, server, 22, TcpFlags::SYN);
        assert_eq!(
            eval_frame(&mut tcp, &table),
            (Action::Drop, Reason::NoMatchingRule)
        );

        let mut tcp = emit::tcp(client, 40000, server, 22, TcpFlags::ACK);
        assert_eq!(
            eval_frame(&mut tcp, &table),
            (Action::Accept, Reason::Rule(0))
        );
    }

    #[test]
    fn bad_batch_deactivates() {
        let mut table = RuleTable::new(50);
        table.set(vec![http_out()]).unwrap();
        assert!(table.is_active());

        let bad = http_out().with_ports(2048, 80);
        let err = table.set(vec![http_out(), bad]).unwrap_err();
        assert!(matches!(err, PalisadeError::BadRule { index: 1, .. }));
        assert!(!table.is_active());
        assert!(table.rules().is_empty());

        let too_many = vec![http_out(); 51];
        assert_eq!(
            table.set(too_many).unwrap_err(),
            PalisadeError::TooManyRules { count: 51, max: 50 }
        );
        assert!(!table.is_active());
    }

    #[test]
    fn rule_validation() {
        assert!(validate_rule(&http_out()).is_ok());

        let r = rule("r", Direction::NONE, Action::Drop);
        assert_eq!(validate_rule(&r), Err(RuleError::BadDirection(0)));

        let r = http_out().with_src(Ipv4Addr::from([10, 0, 0, 0]), 40);
        assert_eq!(
            validate_rule(&r),
            Err(RuleError::BadPrefix { which: "source", len: 40 })
        );

        let r = http_out().with_ports(PORT_ABOVE_1023, 1025);
        assert_eq!(
            validate_rule(&r),
            Err(RuleError::BadPort { which: "destination", port: 1025 })
        );

        let r = http_out().with_ack(AckMask::empty());
        assert_eq!(validate_rule(&r), Err(RuleError::BadAck(0)));
    }
}
