// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Basic TCP state machine.
//!
//! The machine follows the shape of the handshake and of the
//! teardown, nothing more: it does not look at sequence numbers or
//! payload. Each state also records which direction the next legal
//! segment must travel in.
//!
//! Teardown is tracked from the point of view of the first FIN. "Side
//! A" states are reached when the peer acknowledges that FIN before
//! (or together with) sending its own; "side B" states are reached
//! when the peer's FIN arrives alone. Either way the flow ends on the
//! final ACK.

use super::headers::TcpFlags;
use crate::api::Direction;
use crate::api::TcpStatus;
use core::fmt;
use core::fmt::Display;

/// The result of running a segment through the machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Enforce {
    /// The segment is legal; the state may have advanced.
    Accept,
    /// The segment is illegal for the current state or direction. The
    /// state is unchanged.
    Reject,
    /// The segment completes the teardown, or resets the flow. The
    /// connection should be removed.
    Ended,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TcpState {
    status: TcpStatus,
    expected_direction: Direction,
}

impl Default for TcpState {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} expect {}", self.status, self.expected_direction)
    }
}

impl TcpState {
    /// A flow which has not yet seen its SYN. The SYN may come from
    /// either side.
    pub fn new() -> Self {
        Self { status: TcpStatus::PreSyn, expected_direction: Direction::ANY }
    }

    /// A flow whose first SYN will arrive travelling in `dir`.
    pub fn expecting(dir: Direction) -> Self {
        Self { status: TcpStatus::PreSyn, expected_direction: dir }
    }

    pub fn status(&self) -> TcpStatus {
        self.status
    }

    pub fn expected_direction(&self) -> Direction {
        self.expected_direction
    }

    fn advance(&mut self, status: TcpStatus, expect: Direction) -> Enforce {
        self.status = status;
        self.expected_direction = expect;
        Enforce::Accept
    }

    /// Run one segment with `flags`, travelling in `dir`, through the
    /// machine.
    pub fn enforce(&mut self, flags: TcpFlags, dir: Direction) -> Enforce {
        use TcpStatus::*;

        if flags.contains(TcpFlags::RST) {
            return Enforce::Ended;
        }

        if !dir.overlaps(self.expected_direction) {
            return Enforce::Reject;
        }

        let syn = flags.contains(TcpFlags::SYN);
        let ack = flags.contains(TcpFlags::ACK);
        let fin = flags.contains(TcpFlags::FIN);

        match self.status {
            PreSyn if syn && !ack => self.advance(Syn, dir.flip()),

            Syn if syn && ack => self.advance(SynAck, dir.flip()),

            SynAck if ack => self.advance(Established, Direction::ANY),

            Established if fin => self.advance(Fin1, dir.flip()),

            // Data and acks on an open connection pass as they are.
            Established => Enforce::Accept,

            // Both FINs crossed: the peer's FIN carries the ACK of ours.
            Fin1 if fin && ack => self.advance(SideAFin2, dir.flip()),

            // The peer acked our FIN; its own FIN travels the same way.
            Fin1 if ack => self.advance(SideAAck, dir),

            Fin1 if fin => self.advance(SideBFin2, Direction::ANY),

            SideAAck if fin => self.advance(SideAFin2, dir.flip()),

            SideBFin2 if ack => self.advance(SideBAck, dir.flip()),

            SideAFin2 | SideBAck if ack => Enforce::Ended,

            _ => Enforce::Reject,
        }
    }
}
