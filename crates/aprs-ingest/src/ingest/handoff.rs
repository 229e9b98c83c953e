// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker-to-consumer handoff.
//!
//! Each worker accumulates parsed packets on a private [`PacketChain`] and
//! periodically splices it onto its [`Inbox`], a mutex-guarded chain drained
//! by the dedup/routing consumer. The worker only ever *tries* the lock; on
//! contention the packets simply stay local until the next attempt.
//!
//! # Ordering
//!
//! FIFO within one worker (splices preserve order). No ordering across workers.

use super::worker::WorkerId;
use crate::pbuf::PacketChain;
use parking_lot::{Mutex, MutexGuard};

/// Publish slot shared between one worker and the consumer.
pub struct Inbox {
    worker: WorkerId,
    slot: Mutex<PacketChain>,
}

impl Inbox {
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            slot: Mutex::new(PacketChain::new()),
        }
    }

    /// Worker that publishes into this inbox.
    #[inline]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Non-blocking publish: splice all of `local` onto the inbox tail.
    ///
    /// Returns `false` without touching `local` if the slot is held.
    pub fn try_publish(&self, local: &mut PacketChain) -> bool {
        if local.is_empty() {
            return true;
        }
        match self.slot.try_lock() {
            Some(mut slot) => {
                slot.append(local);
                true
            }
            None => false,
        }
    }

    /// Blocking publish, for shutdown paths only.
    pub fn publish(&self, local: &mut PacketChain) {
        if !local.is_empty() {
            self.slot.lock().append(local);
        }
    }

    /// Consumer side: take everything published so far (blocks briefly).
    pub fn drain(&self) -> PacketChain {
        self.slot.lock().take()
    }

    /// Packets currently waiting for the consumer.
    pub fn len(&self) -> usize {
        self.slot.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_empty()
    }

    /// Hold the publish slot, e.g. while the consumer walks it in place.
    ///
    /// Workers keep queueing locally while the guard is alive.
    pub fn lock(&self) -> MutexGuard<'_, PacketChain> {
        self.slot.lock()
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox").field("worker", &self.worker).finish()
    }
}
