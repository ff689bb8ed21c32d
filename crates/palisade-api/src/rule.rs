// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Static filtering rules and the reasons attached to a verdict.

use super::Direction;
use super::ip::IpPrefix;
use super::ip::Ipv4Addr;
use alloc::string::String;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Display;
use core::result;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// Rule port value meaning "any port".
pub const PORT_ANY: u16 = 0;

/// Rule port value meaning "any port above 1023".
pub const PORT_ABOVE_1023: u16 = 1024;

/// The longest rule name, in bytes.
pub const RULE_NAME_MAX: usize = 20;

/// The IP protocol of an inspected packet.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Protocol {
    ICMP,
    TCP,
    UDP,
    Unknown(u8),
}

pub const PROTO_ICMP: u8 = 0x1;
pub const PROTO_TCP: u8 = 0x6;
pub const PROTO_UDP: u8 = 0x11;

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::ICMP => write!(f, "ICMP"),
            Protocol::TCP => write!(f, "TCP"),
            Protocol::UDP => write!(f, "UDP"),
            Protocol::Unknown(proto) => write!(f, "Unknown: {proto}"),
        }
    }
}

impl From<u8> for Protocol {
    fn from(proto: u8) -> Self {
        match proto {
            PROTO_ICMP => Protocol::ICMP,
            PROTO_TCP => Protocol::TCP,
            PROTO_UDP => Protocol::UDP,
            proto => Protocol::Unknown(proto),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(proto: Protocol) -> u8 {
        match proto {
            Protocol::ICMP => PROTO_ICMP,
            Protocol::TCP => PROTO_TCP,
            Protocol::UDP => PROTO_UDP,
            Protocol::Unknown(v) => v,
        }
    }
}

/// The protocol a rule applies to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RuleProto {
    ICMP = 1,
    TCP = 6,
    UDP = 17,
    Any = 143,
}

impl RuleProto {
    pub fn matches(&self, proto: Protocol) -> bool {
        match self {
            Self::Any => true,
            Self::ICMP => proto == Protocol::ICMP,
            Self::TCP => proto == Protocol::TCP,
            Self::UDP => proto == Protocol::UDP,
        }
    }
}

impl TryFrom<u8> for RuleProto {
    type Error = String;

    fn try_from(raw: u8) -> result::Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::ICMP),
            6 => Ok(Self::TCP),
            17 => Ok(Self::UDP),
            143 => Ok(Self::Any),
            _ => Err(format!("invalid rule protocol: {raw}")),
        }
    }
}

impl FromStr for RuleProto {
    type Err = String;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" => Ok(Self::ICMP),
            "tcp" => Ok(Self::TCP),
            "udp" => Ok(Self::UDP),
            "any" => Ok(Self::Any),
            _ => Err(format!("invalid protocol: {s}")),
        }
    }
}

impl Display for RuleProto {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::ICMP => "icmp",
            Self::TCP => "tcp",
            Self::UDP => "udp",
            Self::Any => "any",
        };
        write!(f, "{s}")
    }
}

bitflags! {
    /// The state of the ACK flag, as a mask.
    ///
    /// A packet carries exactly one of `NO`/`YES`; a rule may carry
    /// either or both (`ANY`).
    #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
    #[serde(transparent)]
    pub struct AckMask: u8 {
        const NO = 0x01;
        const YES = 0x02;
        const ANY = Self::NO.bits() | Self::YES.bits();
    }
}

impl AckMask {
    pub fn from_flag(ack: bool) -> Self {
        if ack { Self::YES } else { Self::NO }
    }
}

impl FromStr for AckMask {
    type Err = String;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no" => Ok(Self::NO),
            "yes" => Ok(Self::YES),
            "any" => Ok(Self::ANY),
            _ => Err(format!("invalid ack: {s}")),
        }
    }
}

impl Display for AckMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = if *self == Self::NO {
            "no"
        } else if *self == Self::YES {
            "yes"
        } else if *self == Self::ANY {
            "any"
        } else {
            "none"
        };
        write!(f, "{s}")
    }
}

/// What to do with a packet.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Action {
    Accept,
    Drop,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "drop" => Ok(Self::Drop),
            _ => Err(format!("invalid action: {s}")),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Accept => "accept",
            Self::Drop => "drop",
        };
        write!(f, "{s}")
    }
}

/// The reason attached to an audited verdict.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Reason {
    /// The rule table is inactive; everything is accepted.
    FwInactive,
    NoMatchingRule,
    XmasPacket,
    TcpStreamEnforce,
    FtpDataSession,
    TcpProxy,
    /// The rule at this index decided the verdict.
    Rule(u8),
}

impl Reason {
    /// The stable numeric code of this reason. Rule indices are
    /// non-negative, every other reason is a distinct negative power
    /// of two.
    pub fn code(&self) -> i32 {
        match self {
            Self::FwInactive => -1,
            Self::NoMatchingRule => -2,
            Self::XmasPacket => -4,
            Self::TcpStreamEnforce => -8,
            Self::FtpDataSession => -16,
            Self::TcpProxy => -32,
            Self::Rule(idx) => i32::from(*idx),
        }
    }
}

impl TryFrom<i32> for Reason {
    type Error = String;

    fn try_from(code: i32) -> result::Result<Self, Self::Error> {
        match code {
            -1 => Ok(Self::FwInactive),
            -2 => Ok(Self::NoMatchingRule),
            -4 => Ok(Self::XmasPacket),
            -8 => Ok(Self::TcpStreamEnforce),
            -16 => Ok(Self::FtpDataSession),
            -32 => Ok(Self::TcpProxy),
            idx @ 0..=255 => Ok(Self::Rule(idx as u8)),
            _ => Err(format!("invalid reason code: {code}")),
        }
    }
}

impl Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::FwInactive => write!(f, "REASON_FW_INACTIVE"),
            Self::NoMatchingRule => write!(f, "REASON_NO_MATCHING_RULE"),
            Self::XmasPacket => write!(f, "REASON_XMAS_PACKET"),
            Self::TcpStreamEnforce => write!(f, "REASON_TCP_STREAM_ENFORCE"),
            Self::FtpDataSession => write!(f, "REASON_FTP_DATA_SESSION"),
            Self::TcpProxy => write!(f, "REASON_TCP_PROXY"),
            Self::Rule(idx) => write!(f, "{idx}"),
        }
    }
}

/// A bounded rule name.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleName(String);

impl RuleName {
    pub fn new(name: &str) -> result::Result<Self, String> {
        if name.is_empty() {
            return Err(String::from("empty rule name"));
        }

        if name.len() > RULE_NAME_MAX {
            return Err(format!(
                "rule name longer than {RULE_NAME_MAX} bytes: {name}"
            ));
        }

        Ok(Self(String::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RuleName {
    type Error = String;

    fn try_from(name: String) -> result::Result<Self, Self::Error> {
        Self::new(&name)
    }
}

impl From<RuleName> for String {
    fn from(name: RuleName) -> String {
        name.0
    }
}

impl Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single static access-control rule.
///
/// Ports use the raw encoding: [`PORT_ANY`] for any port,
/// [`PORT_ABOVE_1023`] for any port above 1023, otherwise an exact
/// port in `0..=1023`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Rule {
    pub name: RuleName,
    pub direction: Direction,
    pub src: IpPrefix,
    pub dst: IpPrefix,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: RuleProto,
    pub ack: AckMask,
    pub action: Action,
}

impl Rule {
    /// A rule which matches every packet in `direction` and applies
    /// `action` to it. Useful as the base of a more specific rule.
    pub fn any(name: RuleName, direction: Direction, action: Action) -> Self {
        Self {
            name,
            direction,
            src: IpPrefix::ANY,
            dst: IpPrefix::ANY,
            src_port: PORT_ANY,
            dst_port: PORT_ANY,
            protocol: RuleProto::Any,
            ack: AckMask::ANY,
            action,
        }
    }

    pub fn with_dst(mut self, ip: Ipv4Addr, prefix_len: u8) -> Self {
        self.dst = IpPrefix { ip, prefix_len };
        self
    }

    pub fn with_src(mut self, ip: Ipv4Addr, prefix_len: u8) -> Self {
        self.src = IpPrefix { ip, prefix_len };
        self
    }

    pub fn with_proto(mut self, protocol: RuleProto) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    pub fn with_ack(mut self, ack: AckMask) -> Self {
        self.ack = ack;
        self
    }
}

pub fn port_string(port: u16) -> String {
    match port {
        PORT_ANY => String::from("any"),
        PORT_ABOVE_1023 => String::from(">1023"),
        p => format!("{p}"),
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            self.name,
            self.direction,
            self.src,
            self.dst,
            self.protocol,
            port_string(self.src_port),
            port_string(self.dst_port),
            self.ack,
            self.action,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn reason_codes() {
        for r in [
            Reason::FwInactive,
            Reason::NoMatchingRule,
            Reason::XmasPacket,
            Reason::TcpStreamEnforce,
            Reason::FtpDataSession,
            Reason::TcpProxy,
            Reason::Rule(0),
            Reason::Rule(49),
        ] {
            assert_eq!(Reason::try_from(r.code()).unwrap(), r);
        }
        assert!(Reason::try_from(-3).is_err());
        assert!(Reason::try_from(256).is_err());
    }

    #[test]
    fn rule_name_bounds() {
        assert!(RuleName::new("loopback").is_ok());
        assert!(RuleName::new("exactly_twenty_chars").is_ok());
        assert!(RuleName::new("twenty_one_characters").is_err());
        assert!(RuleName::new("").is_err());
    }

    #[test]
    fn display_rule() {
        let rule = Rule::any(
            RuleName::new("http_out").unwrap(),
            Direction::OUT,
            Action::Accept,
        )
        .with_dst(Ipv4Addr::from([93, 184, 216, 34]), 32)
        .with_proto(RuleProto::TCP)
        .with_ports(PORT_ABOVE_1023, 80);

        assert_eq!(
            rule.to_string(),
            "http_out out any 93.184.216.34/32 tcp >1023 80 any accept"
        );
    }

    #[test]
    fn proto_match() {
        assert!(RuleProto::Any.matches(Protocol::Unknown(47)));
        assert!(RuleProto::TCP.matches(Protocol::from(6)));
        assert!(!RuleProto::UDP.matches(Protocol::TCP));
        assert_eq!(RuleProto::try_from(143).unwrap(), RuleProto::Any);
        assert!(RuleProto::try_from(2).is_err());
    }
}
