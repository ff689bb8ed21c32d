// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The internet checksum, and the one place frames are re-summed.
//!
//! The [`Checksum`] type provides a rolling one's complement sum which
//! is finalized into a [`HeaderChecksum`], the value stored in the
//! header bytes.
//!
//! # Checksums and Endianness
//!
//! The checksum is a sequence of two bytes, not a logical integer.
//! To compute it we treat each pair of bytes as a native 16-bit
//! integer (`{to,from}_ne_bytes()`), and we store the result the same
//! way. On a little-endian host the bytes are logically flipped while
//! summing, but because they are flipped again on the way out the
//! stored value ends up in network order. RFC 1071 §1.B covers this.
//!
//! # Relevant RFCs
//!
//! * 1071 Computing the Internet Checksum
//!
//! * 1624 Computation of the Internet Checksum via Incremental Update

use super::headers::FrameError;
use super::headers::MutableFrameView;
use crate::api::PROTO_TCP;
use crate::api::PROTO_UDP;

/// Offset of the checksum within a TCP header.
const TCP_CSUM_OFF: usize = 16;
/// Offset of the checksum within a UDP header.
const UDP_CSUM_OFF: usize = 6;
/// Offset of the checksum within an IPv4 header.
const IPV4_CSUM_OFF: usize = 10;

/// The checksum value as it is contained in a network header: the
/// one's complement of a one's complement sum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderChecksum {
    inner: [u8; 2],
}

impl HeaderChecksum {
    /// Return the bytes of this header checksum.
    pub fn bytes(&self) -> [u8; 2] {
        self.inner
    }
}

impl From<Checksum> for HeaderChecksum {
    /// Finalize the rolling checksum and put it into header form by
    /// performing one's complement.
    fn from(mut csum: Checksum) -> HeaderChecksum {
        Self { inner: (!csum.finalize()).to_ne_bytes() }
    }
}

/// A rolling one's complement checksum calculation.
///
/// Carries are accumulated in the upper half and only folded back in
/// when the sum is finalized.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    inner: u32,
}

impl Checksum {
    /// Creates a new checksum counter.
    pub fn new() -> Self {
        Self::from(0)
    }

    /// Update the sum by adding the contents of `bytes`.
    ///
    /// `bytes` must start on an even offset of the summed data; only
    /// the last slice added may have an odd length.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_add(self.inner, bytes);
    }

    /// Create a new rolling checksum, starting with the passed in
    /// `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        Self { inner: csum_add(0, bytes) }
    }

    /// Finalize the sum by adding up all the accumulated carries and
    /// returning the resulting value as a `u16`.
    pub fn finalize(&mut self) -> u16 {
        while (self.inner >> 16) != 0 {
            self.inner = (self.inner >> 16) + (self.inner & 0xFFFF);
        }

        (self.inner & 0xFFFF) as u16
    }
}

impl From<u32> for Checksum {
    fn from(csum: u32) -> Self {
        Self { inner: csum }
    }
}

fn csum_add(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        csum += u32::from(u16::from_ne_bytes([pair[0], pair[1]]));
    }

    if let [last] = chunks.remainder() {
        csum += u32::from(u16::from_ne_bytes([*last, 0]));
    }

    csum
}

/// The IPv4 pseudo header sum used by TCP and UDP.
fn pseudo_header(ip_hdr: &[u8], proto: u8, ulp_len: usize) -> Checksum {
    // src and dst addresses sit back to back at offset 12.
    let mut csum = Checksum::compute(&ip_hdr[12..20]);
    csum.add_bytes(&[0, proto]);
    csum.add_bytes(&(ulp_len as u16).to_be_bytes());
    csum
}

/// Recompute every checksum of a frame after its headers were
/// rewritten.
///
/// The IPv4 header checksum is always recomputed. TCP and UDP
/// checksums are recomputed over the pseudo header and the entire
/// transport segment; other protocols carry no checksum that covers
/// the IPv4 addresses.
pub fn repair_checksums(
    frame: &mut MutableFrameView<'_>,
) -> Result<(), FrameError> {
    let proto = frame.proto();
    // Validate the transport header before touching any byte.
    match proto {
        PROTO_TCP => {
            frame.tcp()?;
        }
        PROTO_UDP => {
            frame.udp()?;
        }
        _ => (),
    }

    let (ip_hdr, l4) = frame.split_mut();

    ip_hdr[IPV4_CSUM_OFF..IPV4_CSUM_OFF + 2].copy_from_slice(&[0; 2]);
    let hc = HeaderChecksum::from(Checksum::compute(ip_hdr));
    ip_hdr[IPV4_CSUM_OFF..IPV4_CSUM_OFF + 2].copy_from_slice(&hc.bytes());

    let csum_off = match proto {
        PROTO_TCP => TCP_CSUM_OFF,
        PROTO_UDP => UDP_CSUM_OFF,
        _ => return Ok(()),
    };

    l4[csum_off..csum_off + 2].copy_from_slice(&[0; 2]);
    let mut csum = pseudo_header(ip_hdr, proto, l4.len());
    csum.add_bytes(l4);
    let mut hc = HeaderChecksum::from(csum).bytes();

    // A computed UDP checksum of zero is sent as all ones; zero means
    // "no checksum" on the wire.
    if proto == PROTO_UDP && hc == [0; 2] {
        hc = [0xFF; 2];
    }

    l4[csum_off..csum_off + 2].copy_from_slice(&hc);
    Ok(())
}

/// Do the IPv4 and transport checksums of `frame` verify?
#[cfg(any(test, feature = "test-help"))]
pub fn checksums_valid(frame: &MutableFrameView<'_>) -> bool {
    let bytes = frame.bytes();
    let ip_hdr = &bytes[..frame.ip_hdr_len()];
    if Checksum::compute(ip_hdr).finalize() != 0xFFFF {
        return false;
    }

    let l4 = frame.l4();
    match frame.proto() {
        PROTO_TCP | PROTO_UDP => {
            let mut csum = pseudo_header(ip_hdr, frame.proto(), l4.len());
            csum.add_bytes(l4);
            csum.finalize() == 0xFFFF
        }
        _ => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Ipv4Addr;
    use crate::engine::headers::TcpFlags;
    use crate::engine::headers::emit;

    #[test]
    fn rfc1071_example() {
        // The worked example of RFC 1071 §3.
        let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        let mut csum = Checksum::compute(&bytes);
        assert_eq!(csum.finalize(), u16::from_ne_bytes([0xdd, 0xf2]));
    }

    #[test]
    fn known_ipv4_header() {
        #[rustfmt::skip]
        let mut hdr = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00,
            0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8, 0x00, 0x01,
            0xc0, 0xa8, 0x00, 0xc7,
        ];
        let hc = HeaderChecksum::from(Checksum::compute(&hdr));
        assert_eq!(hc.bytes(), [0xb8, 0x61]);

        hdr[10..12].copy_from_slice(&hc.bytes());
        assert_eq!(Checksum::compute(&hdr).finalize(), 0xFFFF);
    }

    #[test]
    fn repair_after_rewrite() {
        let mut frame = emit::tcp(
            Ipv4Addr::from([10, 0, 0, 5]),
            53211,
            Ipv4Addr::from([93, 184, 216, 34]),
            80,
            TcpFlags::SYN,
        );
        let mut view = MutableFrameView::new(&mut frame).unwrap();
        assert!(checksums_valid(&view));

        view.set_dst_ip(Ipv4Addr::from([10, 1, 1, 3])).unwrap();
        view.set_dst_port(800).unwrap();
        assert!(!checksums_valid(&view));

        repair_checksums(&mut view).unwrap();
        assert!(checksums_valid(&view));
    }

    #[test]
    fn repair_udp_and_icmp() {
        let mut udp = emit::udp(
            Ipv4Addr::from([10, 0, 0, 5]),
            5353,
            Ipv4Addr::from([10, 0, 0, 6]),
            53,
        );
        let view = MutableFrameView::new(&mut udp).unwrap();
        assert!(checksums_valid(&view));

        let mut icmp = emit::icmp(
            Ipv4Addr::from([10, 0, 0, 5]),
            Ipv4Addr::from([10, 0, 0, 6]),
        );
        let mut view = MutableFrameView::new(&mut icmp).unwrap();
        view.set_src_ip(Ipv4Addr::from([10, 0, 0, 7])).unwrap();
        repair_checksums(&mut view).unwrap();
        assert!(checksums_valid(&view));
    }
}
