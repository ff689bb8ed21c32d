// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Raw IPv4, TCP and UDP header layouts.
//!
//! The engine never copies a frame: it overlays these layouts on the
//! caller's buffer with `zerocopy`, reads what it needs, and writes
//! rewritten fields straight back. Every multi-byte field is kept as
//! a byte array in network order so the layouts are unaligned and can
//! sit at any offset.
//!
//! The only way to mutate a frame is through a [`MutableFrameView`],
//! which validates the IPv4 header once up front so that every later
//! access only has to bounds check the transport header.

use crate::api::Ipv4Addr;
use crate::api::PROTO_TCP;
use crate::api::PROTO_UDP;
use crate::api::Protocol;
use bitflags::bitflags;
use core::fmt;
use core::mem::size_of;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const IPV4_VERSION: u8 = 4;
pub const IPV4_HDR_SZ: usize = size_of::<Ipv4HdrRaw>();
pub const TCP_HDR_SZ: usize = size_of::<TcpHdrRaw>();
pub const UDP_HDR_SZ: usize = size_of::<UdpHdrRaw>();

const IPV4_IHL_MASK: u8 = 0x0F;
const TCP_HDR_OFFSET_MASK: u8 = 0xF0;
const TCP_HDR_OFFSET_SHIFT: u8 = 4;

/// A frame the engine cannot make sense of.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum FrameError {
    #[error("frame truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("not an IPv4 header: version {0}")]
    BadVersion(u8),

    #[error("bad IPv4 header length: {0} words")]
    BadHeaderLen(u8),

    #[error("bad IPv4 total length: {0}")]
    BadTotalLen(u16),

    #[error("bad TCP data offset: {0} words")]
    BadTcpOffset(u8),

    #[error("not a TCP segment: protocol {0}")]
    NotTcp(u8),
}

bitflags! {
    /// The standard TCP flags. We don't bother with the experimental
    /// NS flag.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
        const ECE = 0x40;
        const CWR = 0x80;
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

#[repr(C)]
#[derive(
    Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: [u8; 2],
    pub ident: [u8; 2],
    pub frag_and_flags: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub csum: [u8; 2],
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Ipv4HdrRaw {
    pub fn version(&self) -> u8 {
        self.ver_hdr_len >> 4
    }

    /// The header length in bytes, options included.
    pub fn hdr_len(&self) -> usize {
        usize::from(self.ver_hdr_len & IPV4_IHL_MASK) * 4
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes(self.total_len)
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.proto)
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src)
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst)
    }
}

impl Default for Ipv4HdrRaw {
    fn default() -> Self {
        Ipv4HdrRaw {
            ver_hdr_len: 0x45,
            dscp_ecn: 0x0,
            total_len: [0x0; 2],
            ident: [0x0; 2],
            frag_and_flags: [0x40, 0x0],
            ttl: 64,
            proto: u8::from(Protocol::Unknown(255)),
            csum: [0x0; 2],
            src: [0x0; 4],
            dst: [0x0; 4],
        }
    }
}

#[repr(C)]
#[derive(
    Clone,
    Debug,
    Default,
    FromBytes,
    Immutable,
    IntoBytes,
    KnownLayout,
    Unaligned,
)]
pub struct TcpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub seq: [u8; 4],
    pub ack: [u8; 4],
    pub offset: u8,
    pub flags: u8,
    pub win: [u8; 2],
    pub csum: [u8; 2],
    pub urg: [u8; 2],
}

impl TcpHdrRaw {
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.dst_port)
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_bits_retain(self.flags)
    }

    /// The header length in bytes, options included.
    pub fn hdr_len(&self) -> usize {
        usize::from((self.offset & TCP_HDR_OFFSET_MASK) >> TCP_HDR_OFFSET_SHIFT)
            * 4
    }

    pub fn set_hdr_len(&mut self, len: usize) {
        self.offset = ((len / 4) as u8) << TCP_HDR_OFFSET_SHIFT;
    }
}

#[repr(C)]
#[derive(
    Clone,
    Debug,
    Default,
    FromBytes,
    Immutable,
    IntoBytes,
    KnownLayout,
    Unaligned,
)]
pub struct UdpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub len: [u8; 2],
    pub csum: [u8; 2],
}

impl UdpHdrRaw {
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.dst_port)
    }
}

/// A validated IPv4 frame that may be rewritten in place.
///
/// The view covers exactly `total_len` bytes of the caller's buffer;
/// any trailing padding is left alone.
#[derive(Debug)]
pub struct MutableFrameView<'a> {
    bytes: &'a mut [u8],
    ip_hdr_len: usize,
    proto: u8,
}

impl<'a> MutableFrameView<'a> {
    pub fn new(frame: &'a mut [u8]) -> Result<Self, FrameError> {
        let have = frame.len();
        let (ip, _) = Ipv4HdrRaw::ref_from_prefix(&*frame)
            .map_err(|_| FrameError::Truncated { need: IPV4_HDR_SZ, have })?;

        if ip.version() != IPV4_VERSION {
            return Err(FrameError::BadVersion(ip.version()));
        }

        let ip_hdr_len = ip.hdr_len();
        if ip_hdr_len < IPV4_HDR_SZ || ip_hdr_len > have {
            return Err(FrameError::BadHeaderLen(
                ip.ver_hdr_len & IPV4_IHL_MASK,
            ));
        }

        let total_len = usize::from(ip.total_len());
        if total_len < ip_hdr_len || total_len > have {
            return Err(FrameError::BadTotalLen(ip.total_len()));
        }

        let proto = ip.proto;
        let (bytes, _) = frame.split_at_mut(total_len);
        Ok(Self { bytes, ip_hdr_len, proto })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn ip_hdr_len(&self) -> usize {
        self.ip_hdr_len
    }

    pub fn proto(&self) -> u8 {
        self.proto
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn ip(&self) -> Result<&Ipv4HdrRaw, FrameError> {
        let have = self.bytes.len();
        Ipv4HdrRaw::ref_from_prefix(&*self.bytes)
            .map(|(hdr, _)| hdr)
            .map_err(|_| FrameError::Truncated { need: IPV4_HDR_SZ, have })
    }

    pub fn ip_mut(&mut self) -> Result<&mut Ipv4HdrRaw, FrameError> {
        let have = self.bytes.len();
        Ipv4HdrRaw::mut_from_prefix(&mut *self.bytes)
            .map(|(hdr, _)| hdr)
            .map_err(|_| FrameError::Truncated { need: IPV4_HDR_SZ, have })
    }

    /// The transport header and payload.
    pub fn l4(&self) -> &[u8] {
        &self.bytes[self.ip_hdr_len..]
    }

    /// Split the frame into its IPv4 header and its transport bytes.
    pub fn split_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        self.bytes.split_at_mut(self.ip_hdr_len)
    }

    pub fn tcp(&self) -> Result<&TcpHdrRaw, FrameError> {
        if self.proto != PROTO_TCP {
            return Err(FrameError::NotTcp(self.proto));
        }

        let l4 = self.l4();
        let have = l4.len();
        let (tcp, _) = TcpHdrRaw::ref_from_prefix(l4)
            .map_err(|_| FrameError::Truncated { need: TCP_HDR_SZ, have })?;

        let hdr_len = tcp.hdr_len();
        if hdr_len < TCP_HDR_SZ {
            return Err(FrameError::BadTcpOffset(tcp.offset >> 4));
        }

        if hdr_len > have {
            return Err(FrameError::Truncated { need: hdr_len, have });
        }

        Ok(tcp)
    }

    pub fn tcp_mut(&mut self) -> Result<&mut TcpHdrRaw, FrameError> {
        // Run the full validation on the shared view first.
        self.tcp()?;
        let ip_hdr_len = self.ip_hdr_len;
        let l4 = &mut self.bytes[ip_hdr_len..];
        let have = l4.len();
        TcpHdrRaw::mut_from_prefix(l4)
            .map(|(hdr, _)| hdr)
            .map_err(|_| FrameError::Truncated { need: TCP_HDR_SZ, have })
    }

    pub fn udp(&self) -> Result<&UdpHdrRaw, FrameError> {
        let l4 = self.l4();
        let have = l4.len();
        UdpHdrRaw::ref_from_prefix(l4)
            .map(|(hdr, _)| hdr)
            .map_err(|_| FrameError::Truncated { need: UDP_HDR_SZ, have })
    }

    pub fn set_src_ip(&mut self, ip: Ipv4Addr) -> Result<(), FrameError> {
        self.ip_mut()?.src = ip.bytes();
        Ok(())
    }

    pub fn set_dst_ip(&mut self, ip: Ipv4Addr) -> Result<(), FrameError> {
        self.ip_mut()?.dst = ip.bytes();
        Ok(())
    }

    pub fn set_src_port(&mut self, port: u16) -> Result<(), FrameError> {
        self.tcp_mut()?.src_port = port.to_be_bytes();
        Ok(())
    }

    pub fn set_dst_port(&mut self, port: u16) -> Result<(), FrameError> {
        self.tcp_mut()?.dst_port = port.to_be_bytes();
        Ok(())
    }
}

/// Build whole frames with valid checksums.
///
/// These are the same layouts the engine parses, so a test can build
/// a frame, hand it to the engine, and check the rewritten bytes
/// independently.
#[cfg(any(test, feature = "test-help"))]
pub mod emit {
    use super::*;
    use crate::api::PROTO_ICMP;
    use crate::engine::checksum::repair_checksums;
    use alloc::vec::Vec;

    /// Emit an IPv4 frame carrying `l4` as its transport bytes.
    pub fn ipv4(proto: u8, src: Ipv4Addr, dst: Ipv4Addr, l4: &[u8]) -> Vec<u8> {
        let total_len = (IPV4_HDR_SZ + l4.len()) as u16;
        let ip = Ipv4HdrRaw {
            total_len: total_len.to_be_bytes(),
            ident: [0x1E, 0x61],
            proto,
            src: src.bytes(),
            dst: dst.bytes(),
            ..Default::default()
        };

        let mut frame = Vec::with_capacity(usize::from(total_len));
        frame.extend_from_slice(ip.as_bytes());
        frame.extend_from_slice(l4);

        if let Ok(mut view) = MutableFrameView::new(&mut frame) {
            // The frame was just laid out by hand; it always parses.
            let _ = repair_checksums(&mut view);
        }
        frame
    }

    pub fn tcp(
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        flags: TcpFlags,
    ) -> Vec<u8> {
        let mut tcp = TcpHdrRaw {
            src_port: src_port.to_be_bytes(),
            dst_port: dst_port.to_be_bytes(),
            seq: 0x4F8A_2B11u32.to_be_bytes(),
            flags: flags.bits(),
            win: 64240u16.to_be_bytes(),
            ..Default::default()
        };
        tcp.set_hdr_len(TCP_HDR_SZ);
        ipv4(PROTO_TCP, src, dst, tcp.as_bytes())
    }

    pub fn udp(
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
    ) -> Vec<u8> {
        let payload = b"palisade";
        let udp = UdpHdrRaw {
            src_port: src_port.to_be_bytes(),
            dst_port: dst_port.to_be_bytes(),
            len: ((UDP_HDR_SZ + payload.len()) as u16).to_be_bytes(),
            csum: [0; 2],
        };
        let mut l4 = Vec::from(udp.as_bytes());
        l4.extend_from_slice(payload);
        ipv4(PROTO_UDP, src, dst, &l4)
    }

    /// An ICMP echo request.
    pub fn icmp(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        ipv4(PROTO_ICMP, src, dst, &[8, 0, 0xF7, 0xFE, 0, 1, 0, 0])
    }
}
