// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Transparent proxy redirection.
//!
//! An outbound HTTP or FTP control connection is split in two: the
//! client talks to a local proxy listening on the firewall's internal
//! address, and the proxy talks to the server from a local port of its
//! choosing. Neither end is aware of the split. Four legs are
//! rewritten:
//!
//! ```text
//!                c2p                         p2s
//!   client  ------------>  [ proxy ]  ------------>  server
//!           <------------             <------------
//!                p2c                         s2p
//! ```
//!
//! * c2p: pre-routing, outbound. Destination becomes the internal
//!   address and the proxy's listening port.
//!
//! * s2p: pre-routing, inbound. Destination becomes the external
//!   address, so the host delivers it to the proxy's server socket.
//!
//! * p2s: local-out, outbound. Source address becomes the client's.
//!
//! * p2c: local-out, inbound. Source becomes the server's address and
//!   port.
//!
//! The client legs are found by the client's endpoint, the server legs
//! by the proxy's local port. The local port is only known once the
//! proxy registers it with [`ProxyRouter::set_proxy_port`].
//!
//! The router also holds FTP data reservations: one-shot grants which
//! let the next SYN of a given endpoint through without a rule.

use super::conn_table::ConnHandle;
use super::conn_table::ConnTable;
use super::conn_table::Connection;
use super::headers::FrameError;
use super::packet::HookStage;
use super::packet::Packet;
use super::packet::PacketType;
use super::packet::Rewrite;
use crate::api::ConnId;
use crate::api::ConnType;
use crate::api::Direction;
use crate::api::Ipv4Addr;
use crate::api::PalisadeError;
use crate::cfg::FTP_PORT;
use crate::cfg::FirewallCfg;
use crate::cfg::HTTP_PORT;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

const PORT_MAP_SZ: usize = u16::MAX as usize + 1;

/// Which of the four redirected legs a packet travelled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Leg {
    ClientToProxy,
    ServerToProxy,
    ProxyToServer,
    ProxyToClient,
}

impl Leg {
    /// Does this leg carry the client's side of the connection?
    pub fn is_client_side(&self) -> bool {
        matches!(self, Self::ClientToProxy | Self::ProxyToClient)
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::ClientToProxy => "c2p",
            Self::ServerToProxy => "s2p",
            Self::ProxyToServer => "p2s",
            Self::ProxyToClient => "p2c",
        };
        write!(f, "{s}")
    }
}

/// A packet the router rewrote.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Routed {
    pub leg: Leg,
    pub handle: ConnHandle,
}

pub struct ProxyRouter {
    int_addr: Ipv4Addr,
    ext_addr: Ipv4Addr,
    http_proxy_port: u16,
    ftp_proxy_port: u16,
    // Indexed by the proxy's local port.
    ports: Box<[Option<ConnHandle>]>,
    reservations: Vec<ConnId>,
    max_reservations: usize,
}

impl ProxyRouter {
    pub fn new(cfg: &FirewallCfg) -> Self {
        Self {
            int_addr: cfg.int_addr,
            ext_addr: cfg.ext_addr,
            http_proxy_port: cfg.http_proxy_port,
            ftp_proxy_port: cfg.ftp_proxy_port,
            ports: alloc::vec![None; PORT_MAP_SZ].into_boxed_slice(),
            reservations: Vec::new(),
            max_reservations: cfg.max_conns,
        }
    }

    /// The port the local proxy for `conn_type` listens on.
    fn listen_port(&self, conn_type: ConnType) -> Option<u16> {
        match conn_type {
            ConnType::ProxyHttp => Some(self.http_proxy_port),
            ConnType::ProxyFtpControl => Some(self.ftp_proxy_port),
            ConnType::Plain | ConnType::FtpData => None,
        }
    }

    fn to_proxy(&self, listen_port: u16) -> Rewrite {
        Rewrite {
            dst_ip: Some(self.int_addr),
            dst_port: Some(listen_port),
            ..Default::default()
        }
    }

    fn by_port<'c>(
        &self,
        port: u16,
        conns: &'c ConnTable,
    ) -> Option<&'c Connection> {
        self.port_owner(port).and_then(|h| conns.get(h))
    }

    /// Mark `conn` as proxied if `pkt` opens an HTTP or FTP control
    /// connection, and redirect the SYN to the local proxy.
    ///
    /// Returns whether the connection is now proxied.
    pub fn setup(
        &self,
        pkt: &mut Packet<'_>,
        conn: &mut Connection,
    ) -> Result<bool, FrameError> {
        if pkt.hook != HookStage::PreRouting
            || pkt.direction != Direction::OUT
            || !pkt.is_syn()
        {
            return Ok(false);
        }

        let conn_type = match pkt.dst_port {
            HTTP_PORT => ConnType::ProxyHttp,
            FTP_PORT => ConnType::ProxyFtpControl,
            _ => return Ok(false),
        };

        let Some(port) = self.listen_port(conn_type) else {
            return Ok(false);
        };

        pkt.rewrite(self.to_proxy(port))?;
        conn.conn_type = conn_type;
        Ok(true)
    }

    /// Rewrite `pkt` if it travels one of the proxied legs.
    ///
    /// A packet which correlates to no proxied connection is left
    /// untouched and `None` is returned; it is subject to normal
    /// filtering.
    pub fn route(
        &self,
        pkt: &mut Packet<'_>,
        conns: &mut ConnTable,
    ) -> Result<Option<Routed>, FrameError> {
        if pkt.ptype != PacketType::Tcp {
            return Ok(None);
        }

        let out = pkt.direction == Direction::OUT;
        let inb = pkt.direction == Direction::IN;
        let leg = match pkt.hook {
            HookStage::PreRouting if out => Leg::ClientToProxy,
            HookStage::PreRouting if inb => Leg::ServerToProxy,
            HookStage::LocalOut if out => Leg::ProxyToServer,
            HookStage::LocalOut if inb => Leg::ProxyToClient,
            _ => return Ok(None),
        };

        let src = ConnId::new(pkt.src_ip, pkt.src_port);
        let dst = ConnId::new(pkt.dst_ip, pkt.dst_port);

        let found = match leg {
            Leg::ClientToProxy => conns.lookup_proxied(&src).and_then(|c| {
                let port = self.listen_port(c.conn_type)?;
                Some((c.handle(), self.to_proxy(port)))
            }),

            Leg::ServerToProxy => self
                .by_port(pkt.dst_port, conns)
                .filter(|c| c.external_id.matches(&src))
                .map(|c| {
                    let rw = Rewrite {
                        dst_ip: Some(self.ext_addr),
                        ..Default::default()
                    };
                    (c.handle(), rw)
                }),

            Leg::ProxyToServer => self
                .by_port(pkt.src_port, conns)
                .filter(|c| c.external_id.matches(&dst))
                .map(|c| {
                    let rw = Rewrite {
                        src_ip: Some(c.internal_id.ip),
                        ..Default::default()
                    };
                    (c.handle(), rw)
                }),

            Leg::ProxyToClient => conns
                .lookup_proxied(&dst)
                .filter(|c| self.listen_port(c.conn_type) == Some(src.port))
                .map(|c| {
                    let rw = Rewrite {
                        src_ip: Some(c.external_id.ip),
                        src_port: Some(c.external_id.port),
                        ..Default::default()
                    };
                    (c.handle(), rw)
                }),
        };

        let Some((handle, rw)) = found else {
            return Ok(None);
        };

        pkt.rewrite(rw)?;
        Ok(Some(Routed { leg, handle }))
    }

    /// Record the local port the proxy uses toward the server on behalf
    /// of `client`, and return that server.
    pub fn set_proxy_port(
        &mut self,
        conns: &mut ConnTable,
        client: &ConnId,
        proxy_port: u16,
    ) -> Result<ConnId, PalisadeError> {
        if proxy_port == 0 {
            return Err(PalisadeError::BadProxyPort(proxy_port));
        }

        let conn = conns
            .lookup_proxied(client)
            .ok_or(PalisadeError::NoProxyConn(*client))?;

        self.purge(conn);
        conn.proxy_port = Some(proxy_port);
        self.ports[usize::from(proxy_port)] = Some(conn.handle());
        Ok(conn.external_id)
    }

    /// Drop any local port entry that refers to `conn`.
    pub fn purge(&mut self, conn: &Connection) {
        if let Some(port) = conn.proxy_port {
            let slot = &mut self.ports[usize::from(port)];
            if *slot == Some(conn.handle()) {
                *slot = None;
            }
        }
    }

    /// Let the next SYN of `client` through without a rule.
    pub fn reserve(&mut self, client: ConnId) -> Result<(), PalisadeError> {
        if self.reservations.len() >= self.max_reservations {
            return Err(PalisadeError::MaxCapacity(
                self.max_reservations as u64,
            ));
        }

        self.reservations.push(client);
        Ok(())
    }

    /// Consume a reservation matching `id`, if there is one.
    pub fn is_reserved(&mut self, id: &ConnId) -> bool {
        match self.reservations.iter().position(|r| r.matches(id)) {
            Some(idx) => {
                self.reservations.swap_remove(idx);
                true
            }

            None => false,
        }
    }

    /// The connection that owns local port `port`, if any.
    pub fn port_owner(&self, port: u16) -> Option<ConnHandle> {
        self.ports[usize::from(port)]
    }

    pub fn num_reservations(&self) -> usize {
        self.reservations.len()
    }

    pub fn clear(&mut self) {
        self.ports.iter_mut().for_each(|slot| *slot = None);
        self.reservations.clear();
    }
}
