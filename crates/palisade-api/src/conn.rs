// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Tracked connections as seen from the outside.

use super::Action;
use super::Protocol;
use super::Reason;
use super::ip::Ipv4Addr;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// Port value of a [`ConnId`] that matches any port.
pub const ID_PORT_ANY: u16 = 0;

/// One endpoint of a connection.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub struct ConnId {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl ConnId {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Do these two endpoints refer to the same host and port?
    ///
    /// The addresses must be equal. A port of [`ID_PORT_ANY`] on either
    /// side matches any port on the other.
    pub fn matches(&self, other: &ConnId) -> bool {
        self.ip == other.ip
            && (self.port == other.port
                || self.port == ID_PORT_ANY
                || other.port == ID_PORT_ANY)
    }
}

impl Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The role a connection plays.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConnType {
    /// A regular filtered connection.
    Plain,
    /// An HTTP connection redirected to the local HTTP proxy.
    ProxyHttp,
    /// An FTP control connection redirected to the local FTP proxy.
    ProxyFtpControl,
    /// An FTP data connection pre-authorized by its control channel.
    FtpData,
}

impl ConnType {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::ProxyHttp | Self::ProxyFtpControl)
    }
}

impl Display for ConnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Plain => "plain",
            Self::ProxyHttp => "proxy-http",
            Self::ProxyFtpControl => "proxy-ftp",
            Self::FtpData => "ftp-data",
        };
        write!(f, "{s}")
    }
}

/// The handshake-shape state of a tracked TCP connection.
///
/// "Side A" is the half that sent the first FIN, "side B" the other
/// half. Both the simultaneous and the sequential close walk through
/// these states without needing a separate "who closed first" flag.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TcpStatus {
    PreSyn,
    Syn,
    SynAck,
    Established,
    Fin1,
    SideAAck,
    SideAFin2,
    SideBFin2,
    SideBAck,
}

impl Display for TcpStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::PreSyn => "PRE_SYN",
            Self::Syn => "SYN",
            Self::SynAck => "SYN_ACK",
            Self::Established => "ESTABLISHED",
            Self::Fin1 => "FIN_1",
            Self::SideAAck => "A_ACK",
            Self::SideAFin2 => "A_FIN_2",
            Self::SideBFin2 => "B_FIN_2",
            Self::SideBAck => "B_ACK",
        };
        write!(f, "{s}")
    }
}

/// A coarse view of a connection's state, for display.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PublicState {
    Expecting,
    Initiating,
    Ongoing,
    Closing,
    Proxy,
}

impl PublicState {
    pub fn new(conn_type: ConnType, status: TcpStatus) -> Self {
        if conn_type.is_proxy() {
            return Self::Proxy;
        }

        match status {
            TcpStatus::PreSyn => Self::Expecting,
            TcpStatus::Syn | TcpStatus::SynAck => Self::Initiating,
            TcpStatus::Established => Self::Ongoing,
            TcpStatus::Fin1
            | TcpStatus::SideAAck
            | TcpStatus::SideAFin2
            | TcpStatus::SideBFin2
            | TcpStatus::SideBAck => Self::Closing,
        }
    }
}

impl Display for PublicState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Expecting => "EXPECTING",
            Self::Initiating => "INITIATING",
            Self::Ongoing => "ONGOING",
            Self::Closing => "CLOSING",
            Self::Proxy => "PROXY",
        };
        write!(f, "{s}")
    }
}

/// A snapshot of one tracked connection.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConnDump {
    pub internal_id: ConnId,
    pub external_id: ConnId,
    pub conn_type: ConnType,
    pub status: TcpStatus,
    pub public_state: PublicState,
    pub proxy_port: Option<u16>,
}

/// The flow tuple of an inspected packet, as recorded for audit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct FlowTuple {
    pub protocol: Protocol,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl Display for FlowTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.protocol,
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
        )
    }
}

/// One audited verdict.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AuditEvent {
    /// Seconds since the UNIX epoch.
    pub timestamp: u64,
    pub flow: FlowTuple,
    pub action: Action,
    pub reason: Reason,
}

impl Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.timestamp, self.flow, self.action, self.reason
        )
    }
}
