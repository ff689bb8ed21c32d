// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for integration tests.

#![allow(dead_code)]

pub use palisade::api::*;
pub use palisade::cfg::FirewallCfg;
pub use palisade::ddi::sync::KMutex;
pub use palisade::engine::audit::AuditSink;
pub use palisade::engine::checksum::checksums_valid;
pub use palisade::engine::firewall::Firewall;
pub use palisade::engine::firewall::Verdict;
pub use palisade::engine::headers::MutableFrameView;
pub use palisade::engine::headers::TcpFlags;
pub use palisade::engine::headers::emit;
pub use palisade::engine::packet::HookStage;
pub use palisade::engine::packet::IfacePath;
pub use palisade::provider::Providers;
use std::sync::Arc;

pub const CLIENT_IP: Ipv4Addr = Ipv4Addr::from_const([10, 0, 0, 5]);
pub const CLIENT_PORT: u16 = 53211;
pub const SERVER_IP: Ipv4Addr = Ipv4Addr::from_const([93, 184, 216, 34]);
pub const PROXY_SRC_PORT: u16 = 40001;

pub const SYN: TcpFlags = TcpFlags::SYN;
pub const SYN_ACK: TcpFlags = TcpFlags::SYN.union(TcpFlags::ACK);
pub const ACK: TcpFlags = TcpFlags::ACK;
pub const FIN_ACK: TcpFlags = TcpFlags::FIN.union(TcpFlags::ACK);
pub const XMAS: TcpFlags =
    TcpFlags::FIN.union(TcpFlags::URG).union(TcpFlags::PSH);

/// Internal to external, as routed by the host.
pub const OUT: IfacePath<'static> =
    IfacePath { ingress: Some("enp0s8"), egress: Some("enp0s9") };

/// External to internal, as routed by the host.
pub const IN: IfacePath<'static> =
    IfacePath { ingress: Some("enp0s9"), egress: Some("enp0s8") };

/// Sent by a local process toward the outside world.
pub const LOCAL_OUT: IfacePath<'static> =
    IfacePath { ingress: None, egress: Some("enp0s9") };

/// Sent by a local process toward the protected network.
pub const LOCAL_IN: IfacePath<'static> =
    IfacePath { ingress: None, egress: Some("enp0s8") };

/// An audit sink which keeps every event for later inspection.
#[derive(Clone, Default)]
pub struct RecordingAudit(Arc<KMutex<Vec<AuditEvent>>>);

impl RecordingAudit {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn last(&self) -> Option<AuditEvent> {
        self.0.lock().last().copied()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, ev: &AuditEvent) {
        self.0.lock().push(*ev);
    }
}

pub struct FwTest {
    pub fw: Firewall,
    pub audit: RecordingAudit,
}

impl FwTest {
    /// Run a TCP segment through the firewall.
    pub fn tcp(
        &self,
        hook: HookStage,
        path: &IfacePath<'_>,
        src: (Ipv4Addr, u16),
        dst: (Ipv4Addr, u16),
        flags: TcpFlags,
    ) -> (Verdict, Vec<u8>) {
        let mut frame = emit::tcp(src.0, src.1, dst.0, dst.1, flags);
        let v = self.fw.inspect(&mut frame, hook, path);
        (v, frame)
    }

    /// A segment from the client to the server, before routing.
    pub fn c2s(&self, flags: TcpFlags) -> Verdict {
        self.tcp(
            HookStage::PreRouting,
            &OUT,
            (CLIENT_IP, CLIENT_PORT),
            (SERVER_IP, 80),
            flags,
        )
        .0
    }

    /// A segment from the server to the client, before routing.
    pub fn s2c(&self, flags: TcpFlags) -> Verdict {
        self.tcp(
            HookStage::PreRouting,
            &IN,
            (SERVER_IP, 80),
            (CLIENT_IP, CLIENT_PORT),
            flags,
        )
        .0
    }

    pub fn num_conns(&self) -> usize {
        self.fw.dump_conns().conns.len()
    }
}

/// The TCP endpoints a frame carries on the wire, after asserting its
/// checksums.
pub fn wire_ids(frame: &mut [u8]) -> (ConnId, ConnId) {
    let view = MutableFrameView::new(frame).unwrap();
    assert!(checksums_valid(&view), "bad checksum");
    let ip = view.ip().unwrap();
    let tcp = view.tcp().unwrap();
    (
        ConnId::new(ip.src(), tcp.src_port()),
        ConnId::new(ip.dst(), tcp.dst_port()),
    )
}

pub fn client() -> ConnId {
    ConnId::new(CLIENT_IP, CLIENT_PORT)
}

pub fn server(port: u16) -> ConnId {
    ConnId::new(SERVER_IP, port)
}

pub fn rule(name: &str, dir: Direction, action: Action) -> Rule {
    Rule::any(RuleName::new(name).unwrap(), dir, action)
}

/// A firewall with `cfg`, loaded with `rules` if there are any.
pub fn fw_setup_cfg(cfg: FirewallCfg, rules: Vec<Rule>) -> FwTest {
    let audit = RecordingAudit::default();
    let fw =
        Firewall::new(cfg, Providers::println(), Box::new(audit.clone()))
            .unwrap();

    if !rules.is_empty() {
        fw.set_rules(SetRulesReq { rules }).unwrap();
    }

    FwTest { fw, audit }
}

pub fn fw_setup(rules: Vec<Rule>) -> FwTest {
    fw_setup_cfg(FirewallCfg::default(), rules)
}

/// A firewall which accepts everything in both directions.
pub fn fw_open() -> FwTest {
    fw_setup(vec![rule("all", Direction::ANY, Action::Accept)])
}

/// Assert the action and audited reason of a verdict.
#[macro_export]
macro_rules! expect_verdict {
    ($v:expr, $action:expr, $reason:expr) => {
        let v = &$v;
        assert_eq!(v.action, $action, "unexpected action: {:?}", v);
        assert_eq!(v.reason, Some($reason), "unexpected reason: {:?}", v);
    };
}

/// Assert that a frame was passed through without audit.
#[macro_export]
macro_rules! expect_pass {
    ($v:expr) => {
        let v = &$v;
        assert_eq!(v.action, Action::Accept, "unexpected action: {:?}", v);
        assert_eq!(v.reason, None, "unexpected audit: {:?}", v);
        assert!(!v.modified);
    };
}
