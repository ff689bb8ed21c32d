// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The classified view of one inspected frame.
//!
//! A [`Packet`] is built fresh for every call to the engine and lives
//! only as long as that call. It carries the header fields the engine
//! decides on, already converted to host values, plus the mutable
//! frame it was parsed from so that the proxy router can rewrite it in
//! place.

use super::checksum::repair_checksums;
use super::headers::FrameError;
use super::headers::MutableFrameView;
use super::headers::TcpFlags;
use crate::api::AckMask;
use crate::api::ConnId;
use crate::api::Direction;
use crate::api::FlowTuple;
use crate::api::Ipv4Addr;
use crate::api::Protocol;
use crate::cfg::FirewallCfg;
use core::fmt;

/// The semantic type of a packet, decided once by the classifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketType {
    Icmp,
    Udp,
    Tcp,
    /// Source or destination is in `127.0.0.0/8`.
    Loopback,
    /// Destined to one of the firewall's own addresses.
    FirewallOwned,
    OtherProtocol,
}

impl PacketType {
    /// Packets of this type are accepted without inspection or audit.
    pub fn is_exempt(&self) -> bool {
        matches!(
            self,
            Self::Loopback | Self::FirewallOwned | Self::OtherProtocol
        )
    }
}

/// Where in the host's packet path the frame was intercepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookStage {
    /// Arriving at the host, before the routing decision.
    PreRouting,
    /// Generated by the host itself, i.e. by a local proxy.
    LocalOut,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PreRouting => write!(f, "pre-routing"),
            Self::LocalOut => write!(f, "local-out"),
        }
    }
}

/// The interfaces a frame is travelling between. Either side may be
/// unknown: a locally generated frame has no ingress interface.
#[derive(Clone, Copy, Debug, Default)]
pub struct IfacePath<'s> {
    pub ingress: Option<&'s str>,
    pub egress: Option<&'s str>,
}

impl<'s> IfacePath<'s> {
    pub fn new(ingress: Option<&'s str>, egress: Option<&'s str>) -> Self {
        Self { ingress, egress }
    }

    /// Infer the direction relative to the protected network.
    ///
    /// Leaving through the external interface, or arriving on the
    /// internal one, is `OUT`. The mirror image is `IN`. A frame that
    /// touches neither is on an unmonitored path.
    pub fn direction(&self, cfg: &FirewallCfg) -> Direction {
        let is = |iface: Option<&str>, name: &str| iface == Some(name);

        if is(self.egress, &cfg.ext_iface) || is(self.ingress, &cfg.int_iface)
        {
            return Direction::OUT;
        }

        if is(self.egress, &cfg.int_iface) || is(self.ingress, &cfg.ext_iface)
        {
            return Direction::IN;
        }

        Direction::NONE
    }
}

/// Header rewrites applied by the proxy router. Fields left as `None`
/// are untouched.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Rewrite {
    pub src_ip: Option<Ipv4Addr>,
    pub src_port: Option<u16>,
    pub dst_ip: Option<Ipv4Addr>,
    pub dst_port: Option<u16>,
}

pub struct Packet<'a> {
    pub direction: Direction,
    pub hook: HookStage,
    pub ptype: PacketType,
    pub protocol: Protocol,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// The state of the ACK flag; always `NO` for anything but TCP.
    pub ack: AckMask,
    pub tcp_flags: TcpFlags,
    frame: MutableFrameView<'a>,
}

impl<'a> Packet<'a> {
    /// Parse and classify `frame`.
    ///
    /// # Errors
    ///
    /// A frame with a malformed IPv4 header, or a TCP/UDP frame whose
    /// transport header is malformed, cannot be classified. The caller
    /// must fail closed.
    pub fn classify(
        frame: &'a mut [u8],
        hook: HookStage,
        path: &IfacePath<'_>,
        cfg: &FirewallCfg,
    ) -> Result<Self, FrameError> {
        let frame = MutableFrameView::new(frame)?;
        let ip = frame.ip()?;
        let src_ip = ip.src();
        let dst_ip = ip.dst();
        let protocol = ip.protocol();

        let mut pkt = Packet {
            direction: path.direction(cfg),
            hook,
            ptype: PacketType::OtherProtocol,
            protocol,
            src_ip,
            dst_ip,
            src_port: 0,
            dst_port: 0,
            ack: AckMask::NO,
            tcp_flags: TcpFlags::empty(),
            frame,
        };

        if src_ip.is_loopback() || dst_ip.is_loopback() {
            pkt.ptype = PacketType::Loopback;
            return Ok(pkt);
        }

        if cfg.is_own_addr(dst_ip) {
            pkt.ptype = PacketType::FirewallOwned;
            return Ok(pkt);
        }

        match protocol {
            Protocol::ICMP => pkt.ptype = PacketType::Icmp,

            Protocol::TCP => {
                let tcp = pkt.frame.tcp()?;
                pkt.src_port = tcp.src_port();
                pkt.dst_port = tcp.dst_port();
                pkt.tcp_flags = tcp.flags();
                pkt.ack =
                    AckMask::from_flag(pkt.tcp_flags.contains(TcpFlags::ACK));
                pkt.ptype = PacketType::Tcp;
            }

            Protocol::UDP => {
                let udp = pkt.frame.udp()?;
                pkt.src_port = udp.src_port();
                pkt.dst_port = udp.dst_port();
                pkt.ptype = PacketType::Udp;
            }

            Protocol::Unknown(_) => (),
        }

        Ok(pkt)
    }

    /// A "Christmas tree" segment: FIN, URG and PSH all lit.
    pub fn is_xmas(&self) -> bool {
        self.ptype == PacketType::Tcp
            && self
                .tcp_flags
                .contains(TcpFlags::FIN | TcpFlags::URG | TcpFlags::PSH)
    }

    /// The first segment of a handshake: SYN without ACK.
    pub fn is_syn(&self) -> bool {
        self.ptype == PacketType::Tcp
            && self.tcp_flags.contains(TcpFlags::SYN)
            && !self.tcp_flags.contains(TcpFlags::ACK)
    }

    /// The `(internal, external)` endpoints of this packet.
    ///
    /// For an outbound packet the source is internal; for an inbound
    /// packet it is the destination. A packet on an unmonitored path
    /// has no internal side.
    pub fn ids(&self) -> Option<(ConnId, ConnId)> {
        let src = ConnId::new(self.src_ip, self.src_port);
        let dst = ConnId::new(self.dst_ip, self.dst_port);

        if self.direction == Direction::OUT {
            Some((src, dst))
        } else if self.direction == Direction::IN {
            Some((dst, src))
        } else {
            None
        }
    }

    pub fn flow(&self) -> FlowTuple {
        FlowTuple {
            protocol: self.protocol,
            src_ip: self.src_ip,
            src_port: self.src_port,
            dst_ip: self.dst_ip,
            dst_port: self.dst_port,
        }
    }

    pub fn frame(&self) -> &MutableFrameView<'a> {
        &self.frame
    }

    /// Rewrite the frame's addresses and ports and repair its
    /// checksums. The parsed fields are updated to match.
    pub fn rewrite(&mut self, rw: Rewrite) -> Result<(), FrameError> {
        if let Some(ip) = rw.src_ip {
            self.frame.set_src_ip(ip)?;
            self.src_ip = ip;
        }

        if let Some(port) = rw.src_port {
            self.frame.set_src_port(port)?;
            self.src_port = port;
        }

        if let Some(ip) = rw.dst_ip {
            self.frame.set_dst_ip(ip)?;
            self.dst_ip = ip;
        }

        if let Some(port) = rw.dst_port {
            self.frame.set_dst_port(port)?;
            self.dst_port = port;
        }

        repair_checksums(&mut self.frame)
    }
}

impl fmt::Debug for Packet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Packet")
            .field("direction", &self.direction)
            .field("hook", &self.hook)
            .field("ptype", &self.ptype)
            .field("flow", &self.flow())
            .field("tcp_flags", &self.tcp_flags)
            .finish_non_exhaustive()
    }
}
