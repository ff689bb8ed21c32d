// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The firewall context.
//!
//! A [`Firewall`] owns all long-lived engine state: the rule table,
//! the connection table and the proxy router. It is built once and
//! shared by reference with whatever delivers packets to
//! [`Firewall::inspect`] and with the administrative side.
//!
//! ### Locking
//!
//! The rule table is read on the packet path and replaced rarely, so
//! it sits behind a reader-writer lock. Connections and proxy state
//! change on nearly every TCP segment and share a single mutex. When
//! both are needed the state mutex is taken first.
//!
//! ### Verdicts
//!
//! Every call to `inspect` yields a [`Verdict`]; nothing escapes as an
//! error. A frame which cannot be parsed, or cannot be rewritten, is
//! dropped without audit.
//!
//! ### Inactive rule table
//!
//! While no rule table is active every untracked TCP segment is
//! accepted with [`Reason::FwInactive`], SYN or not, and no connection
//! is created. This departs deliberately from the handling of
//! untracked segments with an active table, where a non-SYN is dropped
//! with [`Reason::TcpStreamEnforce`]. Once a table is loaded, flows let
//! through while inactive are untracked and their segments are dropped
//! as usual.

use super::audit;
use super::audit::AuditSink;
use super::conn_table::ConnHandle;
use super::conn_table::ConnTable;
use super::conn_table::Connection;
use super::headers::FrameError;
use super::packet::HookStage;
use super::packet::IfacePath;
use super::packet::Packet;
use super::packet::PacketType;
use super::proxy::ProxyRouter;
use super::proxy::Routed;
use super::rule::RuleTable;
use super::rule::evaluate;
use super::tcp_state::Enforce;
use crate::api::Action;
use crate::api::ConnId;
use crate::api::ConnType;
use crate::api::Direction;
use crate::api::DumpConnsResp;
use crate::api::DumpRulesResp;
use crate::api::NoResp;
use crate::api::PalisadeError;
use crate::api::Reason;
use crate::api::ReserveFtpDataReq;
use crate::api::SetProxyPortReq;
use crate::api::SetProxyPortResp;
use crate::api::SetRulesReq;
use crate::cfg::FirewallCfg;
use crate::ddi::sync::KMutex;
use crate::ddi::sync::KRwLock;
use crate::ddi::time::Moment;
use crate::ddi::time::Ttl;
use crate::provider::LogLevel;
use crate::provider::Providers;
use alloc::boxed::Box;

/// The outcome of inspecting one frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Verdict {
    pub action: Action,
    /// The audited reason, or `None` if the frame was not audited.
    pub reason: Option<Reason>,
    /// The frame was rewritten in place; its checksums are already
    /// repaired.
    pub modified: bool,
}

impl Verdict {
    /// Accept without inspection or audit.
    fn pass() -> Self {
        Self { action: Action::Accept, reason: None, modified: false }
    }

    /// Drop a frame that cannot be handled.
    fn malformed() -> Self {
        Self { action: Action::Drop, reason: None, modified: false }
    }

    fn audited(action: Action, reason: Reason) -> Self {
        Self { action, reason: Some(reason), modified: false }
    }

    fn proxied(action: Action, reason: Reason) -> Self {
        Self { action, reason: Some(reason), modified: true }
    }
}

struct State {
    conns: ConnTable,
    proxy: ProxyRouter,
}

pub struct Firewall {
    cfg: FirewallCfg,
    providers: Providers,
    audit: Box<dyn AuditSink>,
    rules: KRwLock<RuleTable>,
    state: KMutex<State>,
}

impl Firewall {
    pub fn new(
        cfg: FirewallCfg,
        providers: Providers,
        audit: Box<dyn AuditSink>,
    ) -> Result<Self, PalisadeError> {
        cfg.validate()?;

        let state = State {
            conns: ConnTable::new(cfg.max_conns),
            proxy: ProxyRouter::new(&cfg),
        };

        let fw = Self {
            rules: KRwLock::new(RuleTable::new(cfg.max_rules)),
            state: KMutex::new(state),
            cfg,
            providers,
            audit,
        };

        fw.log(
            LogLevel::Note,
            &format!(
                "firewall up: internal {} ({}), external {} ({})",
                fw.cfg.int_iface,
                fw.cfg.int_addr,
                fw.cfg.ext_iface,
                fw.cfg.ext_addr,
            ),
        );
        Ok(fw)
    }

    pub fn cfg(&self) -> &FirewallCfg {
        &self.cfg
    }

    fn log(&self, level: LogLevel, msg: &str) {
        self.providers.log.log(level, msg);
    }

    /// Inspect one IPv4 frame seen at `hook` while travelling along
    /// `path`, rewriting it in place if it belongs to a proxied flow.
    pub fn inspect(
        &self,
        frame: &mut [u8],
        hook: HookStage,
        path: &IfacePath<'_>,
    ) -> Verdict {
        let mut pkt = match Packet::classify(frame, hook, path, &self.cfg) {
            Ok(pkt) => pkt,
            Err(_) => return Verdict::malformed(),
        };

        if pkt.ptype.is_exempt() || pkt.direction == Direction::NONE {
            return Verdict::pass();
        }

        // Audit the flow as it arrived, not as it was rewritten.
        let flow = pkt.flow();

        let verdict = match self.decide(&mut pkt) {
            Ok(verdict) => verdict,
            Err(_) => return Verdict::malformed(),
        };

        if let Some(reason) = verdict.reason {
            self.audit.record(&audit::event(flow, verdict.action, reason));
        }

        verdict
    }

    fn decide(&self, pkt: &mut Packet<'_>) -> Result<Verdict, FrameError> {
        if pkt.ptype != PacketType::Tcp {
            if pkt.hook == HookStage::LocalOut {
                return Ok(Verdict::pass());
            }

            let (action, reason) = evaluate(pkt, &self.rules.read());
            return Ok(Verdict::audited(action, reason));
        }

        if pkt.is_xmas() {
            return Ok(Verdict::audited(Action::Drop, Reason::XmasPacket));
        }

        let mut state = self.state.lock();
        let State { conns, proxy } = &mut *state;

        self.reap_closed_proxy(pkt, conns, proxy);

        if let Some(routed) = proxy.route(pkt, conns)? {
            return Ok(self.track_proxied(pkt, conns, routed));
        }

        // The host's own traffic is only ever rewritten, never filtered.
        if pkt.hook == HookStage::LocalOut {
            return Ok(Verdict::pass());
        }

        if let Some(conn) = conns.lookup(pkt) {
            let conn_type = conn.conn_type;
            let handle = conn.handle();
            let res = conn.enforce(pkt.tcp_flags, pkt.direction);

            let reason = match conn_type {
                ConnType::FtpData => Reason::FtpDataSession,
                _ => Reason::TcpStreamEnforce,
            };

            return Ok(match res {
                Enforce::Accept => Verdict::audited(Action::Accept, reason),

                Enforce::Reject => {
                    Verdict::audited(Action::Drop, Reason::TcpStreamEnforce)
                }

                Enforce::Ended => {
                    self.end_conn(conns, proxy, handle);
                    Verdict::audited(Action::Accept, reason)
                }
            });
        }

        self.open(pkt, conns, proxy)
    }

    // A client SYN from the endpoint of a proxied connection whose
    // client side already closed opens a new connection.
    fn reap_closed_proxy(
        &self,
        pkt: &Packet<'_>,
        conns: &mut ConnTable,
        proxy: &mut ProxyRouter,
    ) {
        if pkt.hook != HookStage::PreRouting
            || pkt.direction != Direction::OUT
            || !pkt.is_syn()
        {
            return;
        }

        let client = ConnId::new(pkt.src_ip, pkt.src_port);
        let closed = conns
            .lookup_proxied(&client)
            .filter(|c| c.client_closed())
            .map(|c| c.handle());

        if let Some(handle) = closed {
            self.end_conn(conns, proxy, handle);
        }
    }

    // A client leg runs through the connection's state machine; the
    // server legs belong to the proxy's own socket.
    fn track_proxied(
        &self,
        pkt: &Packet<'_>,
        conns: &mut ConnTable,
        routed: Routed,
    ) -> Verdict {
        let accept = Verdict::proxied(Action::Accept, Reason::TcpProxy);
        if !routed.leg.is_client_side() {
            return accept;
        }

        let Some(conn) = conns.get_mut(routed.handle) else {
            return accept;
        };

        // Nothing follows the end of the client's side.
        if conn.client_closed() {
            return Verdict::proxied(Action::Drop, Reason::TcpStreamEnforce);
        }

        match conn.enforce(pkt.tcp_flags, pkt.direction) {
            Enforce::Accept => accept,

            Enforce::Reject => {
                Verdict::proxied(Action::Drop, Reason::TcpStreamEnforce)
            }

            // The proxy still has to close its server side. The
            // connection stays until the client reuses its endpoint
            // or the connection ages out.
            Enforce::Ended => {
                conn.close_client();
                self.log(
                    LogLevel::Note,
                    &format!("client side closed: {conn}"),
                );
                accept
            }
        }
    }

    // No connection yet: only a SYN may open one.
    fn open(
        &self,
        pkt: &mut Packet<'_>,
        conns: &mut ConnTable,
        proxy: &mut ProxyRouter,
    ) -> Result<Verdict, FrameError> {
        let Some((int, ext)) = pkt.ids() else {
            return Ok(Verdict::pass());
        };

        let rules = self.rules.read();
        if !rules.is_active() {
            return Ok(Verdict::audited(Action::Accept, Reason::FwInactive));
        }

        if !pkt.is_syn() {
            return Ok(Verdict::audited(Action::Drop, Reason::TcpStreamEnforce));
        }

        if proxy.is_reserved(&int) {
            let verdict =
                match self.track(conns, pkt, int, ext, ConnType::FtpData) {
                    Some(_) => Verdict::audited(
                        Action::Accept,
                        Reason::FtpDataSession,
                    ),
                    None => Verdict::audited(
                        Action::Drop,
                        Reason::TcpStreamEnforce,
                    ),
                };
            return Ok(verdict);
        }

        let (action, reason) = evaluate(pkt, &rules);
        drop(rules);

        if action == Action::Drop {
            return Ok(Verdict::audited(action, reason));
        }

        let Some(conn) = self.track(conns, pkt, int, ext, ConnType::Plain)
        else {
            return Ok(Verdict::audited(Action::Drop, Reason::TcpStreamEnforce));
        };

        let modified = proxy.setup(pkt, conn)?;
        Ok(Verdict { action, reason: Some(reason), modified })
    }

    // Insert a connection and run the opening SYN through it.
    fn track<'c>(
        &self,
        conns: &'c mut ConnTable,
        pkt: &Packet<'_>,
        int: ConnId,
        ext: ConnId,
        conn_type: ConnType,
    ) -> Option<&'c mut Connection> {
        match conns.insert(int, ext, conn_type) {
            Ok(conn) => {
                conn.enforce(pkt.tcp_flags, pkt.direction);
                Some(conn)
            }

            Err(e) => {
                self.log(
                    LogLevel::Warn,
                    &format!("cannot track {int} <-> {ext}: {e}"),
                );
                None
            }
        }
    }

    fn end_conn(
        &self,
        conns: &mut ConnTable,
        proxy: &mut ProxyRouter,
        handle: ConnHandle,
    ) {
        if let Some(conn) = conns.remove(handle) {
            proxy.purge(&conn);
            self.log(LogLevel::Note, &format!("connection ended: {conn}"));
        }
    }

    /// Replace the rule table.
    ///
    /// # Errors
    ///
    /// The batch is all or nothing. If it is rejected the table is
    /// left inactive and empty.
    pub fn set_rules(
        &self,
        req: SetRulesReq,
    ) -> Result<NoResp, PalisadeError> {
        let count = req.rules.len();
        let res = self.rules.write().set(req.rules);

        match &res {
            Ok(()) => {
                self.log(LogLevel::Note, &format!("loaded {count} rules"))
            }

            Err(e) => self.log(
                LogLevel::Warn,
                &format!("rejected batch of {count} rules: {e}"),
            ),
        }

        res.map(|_| NoResp::default())
    }

    pub fn dump_rules(&self) -> DumpRulesResp {
        let table = self.rules.read();
        DumpRulesResp {
            active: table.is_active(),
            rules: table.rules().to_vec(),
        }
    }

    pub fn dump_conns(&self) -> DumpConnsResp {
        DumpConnsResp { conns: self.state.lock().conns.dump() }
    }

    /// Tell the firewall which local port a proxy uses toward the
    /// server for `req.client`, and learn which server that is.
    pub fn set_proxy_port(
        &self,
        req: &SetProxyPortReq,
    ) -> Result<SetProxyPortResp, PalisadeError> {
        let mut state = self.state.lock();
        let State { conns, proxy } = &mut *state;

        match proxy.set_proxy_port(conns, &req.client, req.proxy_port) {
            Ok(server) => Ok(SetProxyPortResp { server }),

            Err(e) => {
                self.log(
                    LogLevel::Warn,
                    &format!(
                        "set proxy port {} for {}: {e}",
                        req.proxy_port, req.client
                    ),
                );
                Err(e)
            }
        }
    }

    /// Let the next SYN of `req.client` through as an FTP data
    /// connection.
    pub fn reserve_ftp_data(
        &self,
        req: &ReserveFtpDataReq,
    ) -> Result<NoResp, PalisadeError> {
        self.state.lock().proxy.reserve(req.client)?;
        Ok(NoResp::default())
    }

    /// Forget every connection, proxy port and reservation.
    pub fn clear_conns(&self) {
        let mut state = self.state.lock();
        let dropped = state.conns.len();
        state.conns.clear();
        state.proxy.clear();
        drop(state);

        self.log(
            LogLevel::Note,
            &format!("cleared connection table ({dropped} connections)"),
        );
    }

    /// Remove connections idle for `ttl` or longer as of `now`, and
    /// return how many were removed.
    pub fn expire_conns(&self, now: Moment, ttl: Ttl) -> usize {
        let mut state = self.state.lock();
        let State { conns, proxy } = &mut *state;

        let expired = conns.expire(now, ttl);
        for conn in &expired {
            proxy.purge(conn);
        }
        drop(state);

        if !expired.is_empty() {
            self.log(
                LogLevel::Note,
                &format!("expired {} idle connections", expired.len()),
            );
        }

        expired.len()
    }
}
