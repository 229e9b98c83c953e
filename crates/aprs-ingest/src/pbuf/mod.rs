// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tiered packet buffers.
//!
//! Packets are stored in fixed-capacity cells drawn from three size tiers.
//! Each tier has one global [`CellArena`] (locked, batched transfers) and every
//! worker keeps a [`LocalCache`] of free cells so the hot path never locks.
//!
//! ```text
//!  TieredPool (global, one mutex per tier)
//!     |  allocate_bunch / free_bunch
//!     v
//!  LocalCache (per worker, lock-free)
//!     |  acquire / release
//!     v
//!  PacketBuffer --> PacketChain (pending queue) --> Inbox (publish slot)
//! ```
//!
//! A buffer lives in exactly one place at a time: a free list, a worker's
//! pending queue, or a worker's inbox. Ownership (`Box<PacketBuffer>`) moves
//! between them; nothing is returned to the global allocator until the pool
//! itself is dropped.

pub mod arena;
pub mod chain;
pub mod local;

pub use arena::{ArenaStats, CellArena, TieredPool};
use arena::CellLedger;
pub use chain::PacketChain;
pub use local::{LocalCache, ReleaseTo};

use crate::error::{Error, Result};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::SystemTime;

/// Buffer size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Small = 0,
    Large = 1,
    Huge = 2,
}

impl Tier {
    /// All tiers, smallest first.
    pub const ALL: [Tier; 3] = [Tier::Small, Tier::Large, Tier::Huge];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Small => "small",
            Tier::Large => "large",
            Tier::Huge => "huge",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the client connection a packet arrived on.
///
/// Back-reference only; the connection itself is owned by the socket layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// Byte offsets of the routing fields inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldOffsets {
    /// Position of the `>` ending the source callsign.
    pub src_end: usize,
    /// End of the destination callsign, SSID excluded.
    pub dst_end: usize,
    /// First payload byte (just after `:`).
    pub info_start: usize,
}

impl FieldOffsets {
    /// `src_end <= dst_end <= info_start <= packet_len <= capacity`
    #[inline]
    pub fn is_valid(&self, packet_len: usize, capacity: usize) -> bool {
        self.src_end <= self.dst_end
            && self.dst_end <= self.info_start
            && self.info_start <= packet_len
            && packet_len <= capacity
    }
}

/// One packet in a fixed-capacity cell.
///
/// Created only by a [`CellArena`]. The tier and capacity never change.
pub struct PacketBuffer {
    tier: Tier,
    data: Box<[u8]>,
    packet_len: usize,
    offsets: FieldOffsets,
    origin: Option<ClientId>,
    received_at: Option<SystemTime>,
    /// Arena accounting; `None` only for cells built outside an arena.
    ledger: Option<Arc<CellLedger>>,
    /// Intrusive link, owned by the [`PacketChain`] the buffer sits in.
    pub(crate) link: Option<NonNull<PacketBuffer>>,
}

// SAFETY: `link` is only dereferenced by the PacketChain that owns both this
// buffer and its successor; a buffer outside a chain always has `link == None`.
unsafe impl Send for PacketBuffer {}

impl PacketBuffer {
    #[cfg(test)]
    pub(crate) fn new(tier: Tier, capacity: usize) -> Box<Self> {
        Self::build(tier, capacity, None)
    }

    pub(crate) fn with_ledger(tier: Tier, capacity: usize, ledger: Arc<CellLedger>) -> Box<Self> {
        Self::build(tier, capacity, Some(ledger))
    }

    fn build(tier: Tier, capacity: usize, ledger: Option<Arc<CellLedger>>) -> Box<Self> {
        Box::new(Self {
            tier,
            data: vec![0u8; capacity].into_boxed_slice(),
            packet_len: 0,
            offsets: FieldOffsets::default(),
            origin: None,
            received_at: None,
            ledger,
            link: None,
        })
    }

    /// True if the cell was created by the arena owning `ledger`.
    pub(crate) fn belongs_to(&self, ledger: &Arc<CellLedger>) -> bool {
        self.ledger
            .as_ref()
            .is_some_and(|own| Arc::ptr_eq(own, ledger))
    }

    /// Zero every header field except the tier.
    pub(crate) fn reset(&mut self) {
        self.packet_len = 0;
        self.offsets = FieldOffsets::default();
        self.origin = None;
        self.received_at = None;
        self.link = None;
    }

    #[inline]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn packet_len(&self) -> usize {
        self.packet_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packet_len == 0
    }

    #[inline]
    pub fn offsets(&self) -> FieldOffsets {
        self.offsets
    }

    #[inline]
    pub fn origin(&self) -> Option<ClientId> {
        self.origin
    }

    #[inline]
    pub fn received_at(&self) -> Option<SystemTime> {
        self.received_at
    }

    /// Valid bytes, CRLF included.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.packet_len]
    }

    /// Source callsign.
    pub fn src_call(&self) -> &[u8] {
        &self.data[..self.offsets.src_end]
    }

    /// Destination callsign without SSID.
    pub fn dst_call(&self) -> &[u8] {
        let start = (self.offsets.src_end + 1).min(self.offsets.dst_end);
        &self.data[start..self.offsets.dst_end]
    }

    /// Everything between `>` and `:`, destination included.
    pub fn path(&self) -> &[u8] {
        let start = (self.offsets.src_end + 1).min(self.offsets.info_start);
        let end = self.offsets.info_start.saturating_sub(1).max(start);
        &self.data[start..end]
    }

    /// Payload without the trailing CRLF.
    pub fn info(&self) -> &[u8] {
        let end = self
            .packet_len
            .saturating_sub(crate::config::LINE_END.len())
            .max(self.offsets.info_start);
        &self.data[self.offsets.info_start..end]
    }

    pub(crate) fn set_origin(&mut self, origin: ClientId, received_at: SystemTime) {
        self.origin = Some(origin);
        self.received_at = Some(received_at);
    }

    /// Overwrite the contents with the concatenation of `parts`.
    ///
    /// Capacity is checked before any byte is copied.
    pub(crate) fn fill(&mut self, parts: &[&[u8]]) -> Result<usize> {
        let needed: usize = parts.iter().map(|p| p.len()).sum();
        if needed > self.data.len() {
            return Err(Error::BufferOverflow {
                needed,
                capacity: self.data.len(),
            });
        }
        let mut at = 0;
        for part in parts {
            self.data[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        self.packet_len = at;
        Ok(at)
    }

    pub(crate) fn set_offsets(&mut self, offsets: FieldOffsets) -> Result<()> {
        if !offsets.is_valid(self.packet_len, self.data.len()) {
            return Err(Error::InvalidOffsets);
        }
        self.offsets = offsets;
        Ok(())
    }
}

impl Drop for PacketBuffer {
    fn drop(&mut self) {
        if let Some(ledger) = self.ledger.take() {
            ledger.cell_dropped(self.tier, self.data.len());
        }
    }
}

impl std::fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("tier", &self.tier)
            .field("capacity", &self.data.len())
            .field("packet_len", &self.packet_len)
            .field("offsets", &self.offsets)
            .field("origin", &self.origin)
            .field("data", &String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(line: &[u8], offsets: FieldOffsets) -> Box<PacketBuffer> {
        let mut buf = PacketBuffer::new(Tier::Small, 100);
        buf.fill(&[line, b"\r\n"]).expect("fits");
        buf.set_offsets(offsets).expect("valid offsets");
        buf
    }

    #[test]
    fn test_field_accessors() {
        let buf = filled(
            b"OH2ABC>APRS-1,WIDE2-1:>Hello",
            FieldOffsets {
                src_end: 6,
                dst_end: 11,
                info_start: 22,
            },
        );
        assert_eq!(buf.src_call(), b"OH2ABC");
        assert_eq!(buf.dst_call(), b"APRS");
        assert_eq!(buf.path(), b"APRS-1,WIDE2-1");
        assert_eq!(buf.info(), b">Hello");
        assert_eq!(buf.as_bytes(), b"OH2ABC>APRS-1,WIDE2-1:>Hello\r\n");
    }

    #[test]
    fn test_fill_checks_capacity() {
        let mut buf = PacketBuffer::new(Tier::Small, 8);
        let err = buf.fill(&[b"0123456", b"\r\n"]).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferOverflow {
                needed: 9,
                capacity: 8
            }
        ));
        assert_eq!(buf.packet_len(), 0);
    }

    #[test]
    fn test_offsets_must_be_ordered() {
        let mut buf = PacketBuffer::new(Tier::Small, 32);
        buf.fill(&[b"A>B:x\r\n"]).expect("fits");
        let bad = FieldOffsets {
            src_end: 3,
            dst_end: 2,
            info_start: 4,
        };
        assert!(matches!(buf.set_offsets(bad), Err(Error::InvalidOffsets)));

        let past_end = FieldOffsets {
            src_end: 1,
            dst_end: 3,
            info_start: 8,
        };
        assert!(buf.set_offsets(past_end).is_err());
    }

    #[test]
    fn test_reset_keeps_tier() {
        let mut buf = filled(
            b"A>B:x",
            FieldOffsets {
                src_end: 1,
                dst_end: 3,
                info_start: 4,
            },
        );
        buf.set_origin(ClientId(7), SystemTime::now());
        buf.reset();
        assert_eq!(buf.tier(), Tier::Small);
        assert_eq!(buf.capacity(), 100);
        assert_eq!(buf.packet_len(), 0);
        assert_eq!(buf.offsets(), FieldOffsets::default());
        assert!(buf.origin().is_none());
        assert!(buf.received_at().is_none());
    }
}
