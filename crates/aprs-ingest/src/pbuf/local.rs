// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-worker free lists.
//!
//! A [`LocalCache`] is owned by exactly one worker, so `acquire` and
//! `release` are plain list operations with no synchronisation. The global
//! arena lock is only taken when a tier's local list runs dry (one batched
//! refill of `bunch` cells) or when the cache is drained at shutdown.

use super::arena::TieredPool;
use super::chain::PacketChain;
use super::{PacketBuffer, Tier};
use crate::error::{Error, Result};

/// Where a released buffer goes.
///
/// Code running inside a worker passes its own cache; cleanup code running
/// outside any worker (e.g. the consumer retiring old packets) passes `Global`.
pub enum ReleaseTo<'a> {
    /// Push onto this worker's local free list (no lock).
    Worker(&'a mut LocalCache),
    /// Return straight to the tier arena (takes the arena lock).
    Global,
}

/// Worker-local free lists, one per tier.
#[derive(Debug, Default)]
pub struct LocalCache {
    free: [PacketChain; 3],
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free cells held locally for `tier`.
    #[inline]
    pub fn available(&self, tier: Tier) -> usize {
        self.free[tier.index()].len()
    }

    /// Get a zeroed buffer able to hold `len` bytes.
    ///
    /// Picks the smallest tier with capacity >= `len`. An empty local list is
    /// refilled with one `allocate_bunch` call; if that tier's arena is
    /// exhausted the next larger tier is tried.
    ///
    /// # Errors
    /// - [`Error::Oversized`] if no tier can hold `len` (nothing is allocated).
    /// - [`Error::Exhausted`] if neither the selected tier nor any larger one
    ///   has a cell left.
    pub fn acquire(&mut self, pool: &TieredPool, len: usize) -> Result<Box<PacketBuffer>> {
        let wanted = pool.tier_for(len).ok_or(Error::Oversized {
            requested: len,
            max: pool.max_capacity(),
        })?;

        for tier in Tier::ALL.into_iter().filter(|&t| t >= wanted) {
            if let Some(mut buf) = self.pop_or_refill(pool, tier) {
                buf.reset();
                return Ok(buf);
            }
        }
        Err(Error::Exhausted(wanted))
    }

    fn pop_or_refill(&mut self, pool: &TieredPool, tier: Tier) -> Option<Box<PacketBuffer>> {
        let list = &mut self.free[tier.index()];
        if list.is_empty() {
            let bunch = pool.arena(tier).bunch();
            let mut cells = pool.allocate_bunch(tier, bunch);
            log::debug!(
                "[pbuf] refill {} tier: got {} of {} bufs from global pool",
                tier,
                cells.len(),
                bunch
            );
            list.append(&mut cells);
        }
        list.pop_front()
    }

    /// Push a buffer onto the local list of its tier.
    ///
    /// A buffer that matches no arena of `pool` is logged and dropped.
    pub fn release(&mut self, pool: &TieredPool, buf: Box<PacketBuffer>) {
        match pool.classify(&buf) {
            Some(tier) => self.free[tier.index()].push_front(buf),
            None => pool.free_one(buf),
        }
    }

    /// Hand every locally held cell back to the pool, one `free_bunch` per tier.
    ///
    /// Returns the number of cells returned.
    pub fn drain_to(&mut self, pool: &TieredPool) -> usize {
        let mut total = 0;
        for tier in Tier::ALL {
            let cells = self.free[tier.index()].take();
            total += cells.len();
            pool.free_bunch(tier, cells);
        }
        total
    }
}
