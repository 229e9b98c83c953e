// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global per-tier cell arenas.
//!
//! Each [`CellArena`] hands out fixed-capacity cells of one tier under a
//! single mutex. Transfers are batched (`allocate_bunch` / `free_bunch`) so
//! worker caches touch the lock once per refill, not once per packet.
//!
//! Cells are created lazily in steps of roughly 1 MiB of payload and never
//! returned to the global allocator while the arena lives. Freed cells go to
//! the back of the free list and are handed out from the front (FIFO).
//!
//! Every cell carries a handle to its arena's [`CellLedger`]. A cell dropped
//! instead of freed is logged as an internal error and its slot is given back
//! to the arena, so `max_cells` always bounds the cells alive, not the cells
//! ever made.

use super::chain::PacketChain;
use super::local::ReleaseTo;
use super::{PacketBuffer, Tier};
use crate::config::{PoolConfig, TierConfig, BUNCH_MAX};
use crate::error::Result;
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot of one arena's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub tier: Tier,
    /// Cell capacity in bytes.
    pub capacity: usize,
    /// Cells alive (created and not lost).
    pub live: usize,
    /// Cells currently on the arena free list.
    pub free: usize,
    /// Locked batch allocations served.
    pub bunch_allocs: u64,
    /// Locked batch frees received.
    pub bunch_frees: u64,
    /// Allocation requests that got nothing.
    pub exhausted: u64,
    /// Cells dropped outside any free list while the arena was alive.
    pub lost: u64,
}

impl ArenaStats {
    /// Cells held by workers, queues or consumers.
    pub fn outstanding(&self) -> usize {
        self.live.saturating_sub(self.free)
    }
}

/// Live-cell accounting shared by an arena and each of its cells.
pub(crate) struct CellLedger {
    live: AtomicUsize,
    lost: AtomicU64,
    closed: AtomicBool,
}

impl CellLedger {
    fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            lost: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Called from `PacketBuffer::drop`.
    pub(crate) fn cell_dropped(&self, tier: Tier, capacity: usize) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        if !self.closed.load(Ordering::Acquire) {
            self.lost.fetch_add(1, Ordering::Relaxed);
            log::error!(
                "[pbuf] internal error: {} tier cell ({} bytes) dropped instead of freed, slot reclaimed",
                tier,
                capacity
            );
        }
    }
}

struct ArenaState {
    free: PacketChain,
}

/// Fixed-size cell arena for one tier.
pub struct CellArena {
    tier: Tier,
    config: TierConfig,
    state: Mutex<ArenaState>,
    ledger: Arc<CellLedger>,
    bunch_allocs: AtomicU64,
    bunch_frees: AtomicU64,
    exhausted: AtomicU64,
}

impl CellArena {
    pub(crate) fn new(tier: Tier, config: TierConfig) -> Self {
        Self {
            tier,
            config,
            state: Mutex::new(ArenaState {
                free: PacketChain::new(),
            }),
            ledger: Arc::new(CellLedger::new()),
            bunch_allocs: AtomicU64::new(0),
            bunch_frees: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Worker cache refill size for this tier.
    #[inline]
    pub fn bunch(&self) -> usize {
        self.config.bunch
    }

    /// Create cells until `want` are free or the cell limit is reached.
    ///
    /// Only ever called with the state lock held, so growth is serialized;
    /// concurrent drops can only lower `live`.
    fn grow(&self, state: &mut ArenaState, want: usize) {
        while state.free.len() < want {
            let live = self.ledger.live.load(Ordering::Acquire);
            if live >= self.config.max_cells {
                break;
            }
            let step = self.config.grow_cells().min(self.config.max_cells - live);
            self.ledger.live.fetch_add(step, Ordering::AcqRel);
            for _ in 0..step {
                state.free.push_back(PacketBuffer::with_ledger(
                    self.tier,
                    self.config.capacity,
                    Arc::clone(&self.ledger),
                ));
            }
            log::debug!(
                "[pbuf] {} arena grew by {} cells ({} live)",
                self.tier,
                step,
                live + step
            );
        }
    }

    /// Allocate a single zeroed cell.
    pub fn allocate_one(&self) -> Option<Box<PacketBuffer>> {
        let mut state = self.state.lock();
        self.grow(&mut state, 1);
        match state.free.pop_front() {
            Some(mut buf) => {
                buf.reset();
                Some(buf)
            }
            None => {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Allocate up to `n` cells (capped at [`BUNCH_MAX`]) in one locked operation.
    ///
    /// Returns fewer cells when the arena is constrained and an empty chain
    /// when it is exhausted. Header fields are not reset here.
    pub fn allocate_bunch(&self, n: usize) -> PacketChain {
        let n = n.min(BUNCH_MAX);
        let mut state = self.state.lock();
        self.grow(&mut state, n);
        let bunch = state.free.split_front(n);
        drop(state);

        self.bunch_allocs.fetch_add(1, Ordering::Relaxed);
        if bunch.is_empty() && n > 0 {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
        }
        bunch
    }

    /// Return one cell. The caller guarantees it belongs to this arena.
    pub(crate) fn free_one(&self, buf: Box<PacketBuffer>) {
        debug_assert_eq!(buf.tier(), self.tier, "cell returned to wrong arena");
        self.state.lock().free.push_back(buf);
    }

    /// Return a chain of cells in one locked operation (O(1) splice).
    ///
    /// The caller guarantees every cell belongs to this arena.
    pub(crate) fn free_bunch(&self, mut bufs: PacketChain) {
        if bufs.is_empty() {
            return;
        }
        debug_assert!(bufs.iter().all(|b| b.tier() == self.tier));
        self.state.lock().free.append(&mut bufs);
        self.bunch_frees.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ArenaStats {
        let (live, free) = {
            let state = self.state.lock();
            (self.ledger.live.load(Ordering::Acquire), state.free.len())
        };
        ArenaStats {
            tier: self.tier,
            capacity: self.config.capacity,
            live,
            free,
            bunch_allocs: self.bunch_allocs.load(Ordering::Relaxed),
            bunch_frees: self.bunch_frees.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            lost: self.ledger.lost.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CellArena {
    fn drop(&mut self) {
        // Cells released from here on go with the arena, not lost.
        self.ledger.closed.store(true, Ordering::Release);
    }
}

/// The three tier arenas, built once at startup and shared by all workers.
pub struct TieredPool {
    arenas: [CachePadded<CellArena>; 3],
    foreign_dropped: AtomicU64,
}

impl TieredPool {
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            arenas: [
                CachePadded::new(CellArena::new(Tier::Small, config.small)),
                CachePadded::new(CellArena::new(Tier::Large, config.large)),
                CachePadded::new(CellArena::new(Tier::Huge, config.huge)),
            ],
            foreign_dropped: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn arena(&self, tier: Tier) -> &CellArena {
        &self.arenas[tier.index()]
    }

    /// Smallest tier whose capacity is at least `len`.
    pub fn tier_for(&self, len: usize) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|&tier| self.arena(tier).capacity() >= len)
    }

    /// Capacity of the largest tier.
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.arena(Tier::Huge).capacity()
    }

    /// Tier a buffer may be returned to, or `None` if no arena of this pool made it.
    pub fn classify(&self, buf: &PacketBuffer) -> Option<Tier> {
        let tier = buf.tier();
        buf.belongs_to(&self.arena(tier).ledger).then_some(tier)
    }

    pub fn allocate_bunch(&self, tier: Tier, n: usize) -> PacketChain {
        self.arena(tier).allocate_bunch(n)
    }

    /// Return a chain of `tier` cells in one locked operation.
    ///
    /// A chain holding any cell of another tier or pool is routed through
    /// [`TieredPool::free_many`] instead, after an error log.
    pub fn free_bunch(&self, tier: Tier, bufs: PacketChain) {
        if bufs.iter().all(|buf| self.classify(buf) == Some(tier)) {
            self.arena(tier).free_bunch(bufs);
            return;
        }
        log::error!(
            "[pbuf] internal error: {} tier bunch of {} holds cells from elsewhere, sorting",
            tier,
            bufs.len()
        );
        self.free_many(bufs);
    }

    fn drop_foreign(&self, buf: Box<PacketBuffer>) {
        self.foreign_dropped.fetch_add(1, Ordering::Relaxed);
        log::error!(
            "[pbuf] internal error: buffer of {} bytes ({} tier) matches no arena, dropped",
            buf.capacity(),
            buf.tier()
        );
    }

    /// Return one buffer to its global arena.
    pub fn free_one(&self, buf: Box<PacketBuffer>) {
        match self.classify(&buf) {
            Some(tier) => self.arena(tier).free_one(buf),
            None => self.drop_foreign(buf),
        }
    }

    /// Return a mixed set of buffers, taking each tier lock at most once.
    ///
    /// Buffers that match no arena are logged as internal errors and dropped.
    /// Returns the number of buffers handed back to arenas.
    pub fn free_many<I>(&self, bufs: I) -> usize
    where
        I: IntoIterator<Item = Box<PacketBuffer>>,
    {
        let mut groups = [PacketChain::new(), PacketChain::new(), PacketChain::new()];
        for buf in bufs {
            match self.classify(&buf) {
                Some(tier) => groups[tier.index()].push_back(buf),
                None => self.drop_foreign(buf),
            }
        }

        let mut freed = 0;
        for (tier, group) in Tier::ALL.into_iter().zip(groups) {
            freed += group.len();
            self.arena(tier).free_bunch(group);
        }
        freed
    }

    /// Return a buffer either to a worker cache or straight to the global arena.
    ///
    /// The caller states which; it is never inferred from the calling thread.
    pub fn release(&self, buf: Box<PacketBuffer>, to: ReleaseTo<'_>) {
        match to {
            ReleaseTo::Worker(cache) => cache.release(self, buf),
            ReleaseTo::Global => self.free_one(buf),
        }
    }

    /// Per-tier statistics, smallest tier first.
    pub fn stats(&self) -> [ArenaStats; 3] {
        Tier::ALL.map(|tier| self.arena(tier).stats())
    }

    /// Buffers dropped because they matched no arena.
    pub fn foreign_dropped(&self) -> u64 {
        self.foreign_dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TieredPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredPool")
            .field("stats", &self.stats())
            .field("foreign_dropped", &self.foreign_dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> TieredPool {
        TieredPool::new(&PoolConfig {
            small: TierConfig::new(32, 4, 8),
            large: TierConfig::new(64, 2, 4),
            huge: TierConfig::new(128, 1, 2),
        })
        .expect("valid pool config")
    }

    #[test]
    fn test_tier_for_picks_smallest_fit() {
        let pool = small_pool();
        assert_eq!(pool.tier_for(1), Some(Tier::Small));
        assert_eq!(pool.tier_for(32), Some(Tier::Small));
        assert_eq!(pool.tier_for(33), Some(Tier::Large));
        assert_eq!(pool.tier_for(128), Some(Tier::Huge));
        assert_eq!(pool.tier_for(129), None);
    }

    #[test]
    fn test_allocate_bunch_respects_max_cells() {
        let pool = small_pool();
        let first = pool.allocate_bunch(Tier::Small, 6);
        assert_eq!(first.len(), 6);
        let second = pool.allocate_bunch(Tier::Small, 6);
        assert_eq!(second.len(), 2, "only 8 cells may ever exist");
        let third = pool.allocate_bunch(Tier::Small, 6);
        assert!(third.is_empty());

        let stats = pool.arena(Tier::Small).stats();
        assert_eq!(stats.live, 8);
        assert_eq!(stats.outstanding(), 8);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.bunch_allocs, 3);
    }

    #[test]
    fn test_free_bunch_makes_cells_reusable() {
        let pool = small_pool();
        let bunch = pool.allocate_bunch(Tier::Large, 4);
        assert_eq!(bunch.len(), 4);
        assert!(pool.allocate_bunch(Tier::Large, 1).is_empty());

        pool.free_bunch(Tier::Large, bunch);
        let stats = pool.arena(Tier::Large).stats();
        assert_eq!(stats.free, 4);
        assert_eq!(stats.bunch_frees, 1);
        assert_eq!(pool.allocate_bunch(Tier::Large, 4).len(), 4);
    }

    #[test]
    fn test_free_many_one_lock_per_tier() {
        let pool = small_pool();
        let mut mixed = Vec::new();
        for tier in Tier::ALL {
            let n = pool.arena(tier).bunch();
            mixed.extend(pool.allocate_bunch(tier, n));
        }
        // interleave tiers
        mixed.reverse();
        let total = mixed.len();

        let freed = pool.free_many(mixed);
        assert_eq!(freed, total);
        for stats in pool.stats() {
            assert_eq!(stats.bunch_frees, 1, "{} tier", stats.tier);
            assert_eq!(stats.outstanding(), 0);
        }
    }

    #[test]
    fn test_free_many_skips_empty_tiers() {
        let pool = small_pool();
        let bufs = pool.allocate_bunch(Tier::Huge, 1);
        pool.free_many(bufs);
        let [small, large, huge] = pool.stats();
        assert_eq!(small.bunch_frees, 0);
        assert_eq!(large.bunch_frees, 0);
        assert_eq!(huge.bunch_frees, 1);
    }

    #[test]
    fn test_foreign_buffer_dropped() {
        let pool = small_pool();
        let other = TieredPool::new(&PoolConfig::default()).expect("defaults valid");
        let foreign = other.arena(Tier::Small).allocate_one().expect("cell");

        let freed = pool.free_many([foreign]);
        assert_eq!(freed, 0);
        assert_eq!(pool.foreign_dropped(), 1);
        assert_eq!(pool.arena(Tier::Small).stats().free, 0);

        let foreign = other.arena(Tier::Large).allocate_one().expect("cell");
        pool.free_one(foreign);
        assert_eq!(pool.foreign_dropped(), 2);
    }

    #[test]
    fn test_dropped_chain_gives_slots_back() {
        let pool = small_pool();
        let bunch = pool.allocate_bunch(Tier::Large, 4);
        assert!(pool.allocate_bunch(Tier::Large, 1).is_empty());

        drop(bunch);
        let stats = pool.arena(Tier::Large).stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.lost, 4);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(pool.allocate_bunch(Tier::Large, 4).len(), 4);
    }

    #[test]
    fn test_free_bunch_sorts_mixed_chain() {
        let pool = small_pool();
        let twin = small_pool();
        let mut chain = pool.allocate_bunch(Tier::Small, 2);
        chain.append(&mut pool.allocate_bunch(Tier::Large, 1));
        // same geometry, different pool
        chain.append(&mut twin.allocate_bunch(Tier::Small, 1));

        pool.free_bunch(Tier::Small, chain);
        let [small, large, _] = pool.stats();
        assert_eq!(small.outstanding(), 0);
        assert_eq!(large.outstanding(), 0);
        assert_eq!(pool.foreign_dropped(), 1);
        assert_eq!(twin.arena(Tier::Small).stats().lost, 1);
    }

    #[test]
    fn test_allocate_one_zeroes_header() {
        let pool = small_pool();
        let mut buf = pool.arena(Tier::Small).allocate_one().expect("cell");
        buf.fill(&[b"A>B:hello"]).expect("fits");
        pool.free_one(buf);

        // FIFO: drain the other 7 cells first, then get the used one back
        let _others = pool.allocate_bunch(Tier::Small, 7);
        let again = pool.arena(Tier::Small).allocate_one().expect("recycled cell");
        assert_eq!(again.packet_len(), 0);
        assert_eq!(again.tier(), Tier::Small);
    }
}
