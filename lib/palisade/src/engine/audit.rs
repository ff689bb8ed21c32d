// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The audit seam.
//!
//! Every verdict the engine actually decides is recorded to an
//! [`AuditSink`]. Packets accepted without inspection (loopback,
//! firewall-owned, foreign protocols, unmonitored paths) are not.
//! Storage and aggregation of events belong to the sink.

use crate::api::Action;
use crate::api::AuditEvent;
use crate::api::FlowTuple;
use crate::api::Reason;
use crate::ddi::time::unix_seconds;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use alloc::boxed::Box;

/// A destination for audited verdicts.
///
/// `record` is called on the verdict path. It must not block and it
/// cannot fail.
pub trait AuditSink: Send + Sync {
    fn record(&self, ev: &AuditEvent);
}

/// Discard every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _ev: &AuditEvent) {}
}

/// Write every event as a log line.
pub struct LogAudit {
    log: Box<dyn LogProvider>,
}

impl LogAudit {
    pub fn new(log: Box<dyn LogProvider>) -> Self {
        Self { log }
    }
}

impl AuditSink for LogAudit {
    fn record(&self, ev: &AuditEvent) {
        let level = match ev.action {
            Action::Accept => LogLevel::Note,
            Action::Drop => LogLevel::Warn,
        };
        self.log.log(level, &format!("audit: {ev}"));
    }
}

/// Stamp the verdict for `flow` with the current wall-clock time.
pub fn event(flow: FlowTuple, action: Action, reason: Reason) -> AuditEvent {
    AuditEvent { timestamp: unix_seconds(), flow, action, reason }
}
