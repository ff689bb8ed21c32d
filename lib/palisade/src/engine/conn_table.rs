// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The connection table.
//!
//! Connections are keyed by their `(internal, external)` endpoint
//! pair rather than by the wire-visible 5-tuple, so that a packet
//! finds its connection whichever way it travels. Because an endpoint
//! may carry the wildcard port, lookup is a scan rather than a map
//! probe. Every connection also gets a [`ConnHandle`] which stays
//! valid for its lifetime; the proxy router refers to connections by
//! handle only.

use super::headers::TcpFlags;
use super::packet::Packet;
use super::tcp_state::Enforce;
use super::tcp_state::TcpState;
use crate::api::ConnDump;
use crate::api::ConnId;
use crate::api::ConnType;
use crate::api::Direction;
use crate::api::PalisadeError;
use crate::api::PublicState;
use crate::ddi::time::Moment;
use crate::ddi::time::Ttl;
use alloc::vec::Vec;
use core::fmt;

/// A stable name for a tracked connection.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConnHandle(u64);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Connection {
    handle: ConnHandle,
    pub internal_id: ConnId,
    pub external_id: ConnId,
    pub conn_type: ConnType,
    /// The local port a proxy uses toward the server, once the proxy
    /// has registered it.
    pub proxy_port: Option<u16>,
    state: TcpState,
    // The client's side of a proxied connection has finished.
    client_closed: bool,
    last_hit: Moment,
}

impl Connection {
    pub fn handle(&self) -> ConnHandle {
        self.handle
    }

    pub fn state(&self) -> &TcpState {
        &self.state
    }

    pub fn last_hit(&self) -> Moment {
        self.last_hit
    }

    pub fn client_closed(&self) -> bool {
        self.client_closed
    }

    /// Record that the client's side has closed or reset. The proxy's
    /// side toward the server may still be open.
    pub fn close_client(&mut self) {
        self.client_closed = true;
    }

    /// Run a segment through this connection's state machine. Any
    /// segment that is not rejected counts as activity.
    pub fn enforce(&mut self, flags: TcpFlags, dir: Direction) -> Enforce {
        let res = self.state.enforce(flags, dir);
        if res != Enforce::Reject {
            self.last_hit = Moment::now();
        }
        res
    }

    pub fn dump(&self) -> ConnDump {
        let status = self.state.status();
        ConnDump {
            internal_id: self.internal_id,
            external_id: self.external_id,
            conn_type: self.conn_type,
            status,
            public_state: PublicState::new(self.conn_type, status),
            proxy_port: self.proxy_port,
        }
    }

    fn is_expired(&self, now: Moment, ttl: Ttl) -> bool {
        ttl.is_expired(self.last_hit, now)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} <-> {} ({})",
            self.handle,
            self.conn_type,
            self.internal_id,
            self.external_id,
            self.state,
        )
    }
}

#[derive(Debug)]
pub struct ConnTable {
    conns: Vec<Connection>,
    next_handle: u64,
    limit: usize,
}

impl ConnTable {
    pub fn new(limit: usize) -> Self {
        Self { conns: Vec::new(), next_handle: 0, limit }
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.conns.iter()
    }

    /// Find the connection `pkt` belongs to.
    pub fn lookup(&mut self, pkt: &Packet<'_>) -> Option<&mut Connection> {
        let (int, ext) = pkt.ids()?;
        self.lookup_ids(&int, &ext)
    }

    /// Find the connection between `int` and `ext`, honoring the
    /// wildcard port on either side.
    pub fn lookup_ids(
        &mut self,
        int: &ConnId,
        ext: &ConnId,
    ) -> Option<&mut Connection> {
        self.conns.iter_mut().find(|c| {
            c.internal_id.matches(int) && c.external_id.matches(ext)
        })
    }

    /// Find the proxied connection opened by `client`.
    pub fn lookup_proxied(
        &mut self,
        client: &ConnId,
    ) -> Option<&mut Connection> {
        self.conns
            .iter_mut()
            .find(|c| c.conn_type.is_proxy() && c.internal_id.matches(client))
    }

    pub fn get(&self, handle: ConnHandle) -> Option<&Connection> {
        self.conns.iter().find(|c| c.handle == handle)
    }

    pub fn get_mut(&mut self, handle: ConnHandle) -> Option<&mut Connection> {
        self.conns.iter_mut().find(|c| c.handle == handle)
    }

    /// Start tracking a connection between `int` and `ext`.
    ///
    /// The new connection is in `PreSyn` and accepts a SYN from either
    /// side; the caller runs the opening SYN through it.
    ///
    /// # Errors
    ///
    /// If the table is at max capacity, an error is returned and no
    /// modification is made to the table.
    pub fn insert(
        &mut self,
        int: ConnId,
        ext: ConnId,
        conn_type: ConnType,
    ) -> Result<&mut Connection, PalisadeError> {
        if self.conns.len() >= self.limit {
            return Err(PalisadeError::MaxCapacity(self.limit as u64));
        }

        let handle = ConnHandle(self.next_handle);
        self.next_handle += 1;
        self.conns.push(Connection {
            handle,
            internal_id: int,
            external_id: ext,
            conn_type,
            proxy_port: None,
            state: TcpState::new(),
            last_hit: Moment::now(),
            client_closed: false,
        });

        let last = self.conns.len() - 1;
        Ok(&mut self.conns[last])
    }

    pub fn remove(&mut self, handle: ConnHandle) -> Option<Connection> {
        let idx = self.conns.iter().position(|c| c.handle == handle)?;
        Some(self.conns.swap_remove(idx))
    }

    pub fn clear(&mut self) {
        self.conns.clear();
    }

    /// Remove every connection idle for `ttl` or longer as of `now`,
    /// returning what was removed.
    pub fn expire(&mut self, now: Moment, ttl: Ttl) -> Vec<Connection> {
        let mut expired = Vec::new();
        let mut i = 0;

        while i < self.conns.len() {
            if self.conns[i].is_expired(now, ttl) {
                expired.push(self.conns.swap_remove(i));
            } else {
                i += 1;
            }
        }

        expired
    }

    pub fn dump(&self) -> Vec<ConnDump> {
        self.conns.iter().map(Connection::dump).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Ipv4Addr;
    use crate::api::TcpStatus;
    use crate::cfg::FirewallCfg;
    use crate::engine::headers::emit;
    use crate::engine::packet::HookStage;
    use crate::engine::packet::IfacePath;
    use core::time::Duration;

    fn client() -> ConnId {
        ConnId::new(Ipv4Addr::from([10, 0, 0, 5]), 53211)
    }

    fn server() -> ConnId {
        ConnId::new(Ipv4Addr::from([93, 184, 216, 34]), 80)
    }

    #[test]
    fn insert_and_lookup_both_ways() {
        let cfg = FirewallCfg::default();
        let mut ct = ConnTable::new(8);
        let handle = ct
            .insert(client(), server(), ConnType::Plain)
            .unwrap()
            .handle();
        assert_eq!(ct.len(), 1);
        let status = ct.get(handle).unwrap().state().status();
        assert_eq!(status, TcpStatus::PreSyn);

        let (c, s) = (client(), server());
        let mut out = emit::tcp(c.ip, c.port, s.ip, s.port, TcpFlags::SYN);
        let path = IfacePath::new(Some("enp0s8"), Some("enp0s9"));
        let pkt =
            Packet::classify(&mut out, HookStage::PreRouting, &path, &cfg)
                .unwrap();
        let conn = ct.lookup(&pkt).unwrap();
        assert_eq!(conn.handle(), handle);
        let res = conn.enforce(pkt.tcp_flags, pkt.direction);
        assert_eq!(res, Enforce::Accept);
        assert_eq!(conn.state().status(), TcpStatus::Syn);

        let flags = TcpFlags::SYN | TcpFlags::ACK;
        let mut back = emit::tcp(s.ip, s.port, c.ip, c.port, flags);
        let path = IfacePath::new(Some("enp0s9"), Some("enp0s8"));
        let pkt =
            Packet::classify(&mut back, HookStage::PreRouting, &path, &cfg)
                .unwrap();
        assert_eq!(ct.lookup(&pkt).unwrap().handle(), handle);

        // No direction, no internal side: nothing to find.
        let mut lost = emit::tcp(c.ip, c.port, s.ip, s.port, TcpFlags::ACK);
        let pkt = Packet::classify(
            &mut lost,
            HookStage::PreRouting,
            &IfacePath::default(),
            &cfg,
        )
        .unwrap();
        assert!(ct.lookup(&pkt).is_none());
    }

    #[test]
    fn wildcard_port_lookup() {
        let mut ct = ConnTable::new(8);
        let wild = ConnId::new(client().ip, 0);
        ct.insert(wild, server(), ConnType::FtpData).unwrap();

        assert!(ct.lookup_ids(&client(), &server()).is_some());
        let other = ConnId::new(client().ip, 40000);
        assert!(ct.lookup_ids(&other, &server()).is_some());

        // A non-wildcard mismatch never matches.
        let elsewhere = ConnId::new(server().ip, 81);
        assert!(ct.lookup_ids(&client(), &elsewhere).is_none());
        let host = ConnId::new(Ipv4Addr::from([10, 0, 0, 6]), 53211);
        assert!(ct.lookup_ids(&host, &server()).is_none());
    }

    #[test]
    fn proxied_lookup_ignores_plain() {
        let mut ct = ConnTable::new(8);
        ct.insert(client(), server(), ConnType::Plain).unwrap();
        assert!(ct.lookup_proxied(&client()).is_none());

        let ftp = ConnId::new(server().ip, 21);
        let h = ct
            .insert(client(), ftp, ConnType::ProxyFtpControl)
            .unwrap()
            .handle();
        assert_eq!(ct.lookup_proxied(&client()).unwrap().handle(), h);
    }

    #[test]
    fn capacity() {
        let mut ct = ConnTable::new(2);
        ct.insert(client(), server(), ConnType::Plain).unwrap();
        let h = ct
            .insert(client(), ConnId::new(server().ip, 443), ConnType::Plain)
            .unwrap()
            .handle();
        assert_eq!(
            ct.insert(client(), server(), ConnType::Plain).unwrap_err(),
            PalisadeError::MaxCapacity(2)
        );
        assert_eq!(ct.len(), 2);

        assert!(ct.remove(h).is_some());
        assert!(ct.remove(h).is_none());
        ct.insert(client(), server(), ConnType::Plain).unwrap();
        ct.clear();
        assert!(ct.is_empty());
    }

    #[test]
    fn handles_are_not_reused() {
        let mut ct = ConnTable::new(4);
        let add = |ct: &mut ConnTable| {
            ct.insert(client(), server(), ConnType::Plain).unwrap().handle()
        };
        let a = add(&mut ct);
        ct.remove(a);
        let b = add(&mut ct);
        assert_ne!(a, b);
        assert!(ct.get(a).is_none());
    }

    #[test]
    fn expire_idle() {
        let mut ct = ConnTable::new(4);
        let h = ct
            .insert(client(), server(), ConnType::Plain)
            .unwrap()
            .handle();
        let ttl = Ttl::new_seconds(60);
        let now = Moment::now();

        assert!(ct.expire(now, ttl).is_empty());
        assert_eq!(ct.len(), 1);

        let gone = ct.expire(now + Duration::new(61, 0), ttl);
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].handle(), h);
        assert!(ct.is_empty());
    }

    #[test]
    fn dump_public_state() {
        let mut ct = ConnTable::new(4);
        let conn = ct.insert(client(), server(), ConnType::Plain).unwrap();
        conn.enforce(TcpFlags::SYN, Direction::OUT);

        let dump = ct.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].internal_id, client());
        assert_eq!(dump[0].status, TcpStatus::Syn);
        assert_eq!(dump[0].public_state, PublicState::Initiating);
    }
}
