// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-thread ingestion worker.
//!
//! A [`Worker`] owns its buffer cache and its pending queue outright; nothing
//! on the per-line path takes a lock except the arena refill (amortized over a
//! bunch) and the non-blocking publish attempt.
//!
//! ```text
//! line --> handle_line (size / comment gate)
//!            --> parse_line (locate fields, acquire, rewrite, content parse)
//!                  --> pending queue --> flush (try_lock) --> Inbox
//! ```

use super::content::{ContentParser, ContentStatus};
use super::handoff::Inbox;
use super::parse;
use crate::config::{ContentFailurePolicy, IngestConfig, SharedConfig};
use crate::error::{Error, Rejection, Result};
use crate::pbuf::{ClientId, LocalCache, PacketBuffer, PacketChain, Tier, TieredPool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Worker identifier, unique within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u32);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Why a line did not make it into the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Line length outside the configured bounds.
    SizeOutOfBounds,
    /// Structural validation failed.
    Malformed(Rejection),
    /// Rewritten packet larger than the largest tier.
    Oversized,
    /// No buffer left in the wanted or any larger tier.
    Exhausted(Tier),
    /// Content parser failed and the policy is [`ContentFailurePolicy::Drop`].
    ContentRejected(&'static str),
    /// Buffer bookkeeping failed (internal error).
    Internal,
}

/// Outcome of [`Worker::handle_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Packet appended to the pending queue.
    Queued(ContentStatus),
    /// Comment line (`#...`), silently ignored.
    Ignored,
    /// Line dropped; already logged.
    Dropped(DropReason),
}

/// Relaxed per-worker counters; snapshots are monotonic, not consistent.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub lines_in: AtomicU64,
    pub size_dropped: AtomicU64,
    pub comments: AtomicU64,
    pub rejected: AtomicU64,
    pub alloc_failed: AtomicU64,
    pub queued: AtomicU64,
    pub content_failed: AtomicU64,
    pub content_dropped: AtomicU64,
    pub flushes: AtomicU64,
    pub flush_deferred: AtomicU64,
}

/// Plain copy of [`WorkerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerMetricsSnapshot {
    pub lines_in: u64,
    pub size_dropped: u64,
    pub comments: u64,
    pub rejected: u64,
    pub alloc_failed: u64,
    pub queued: u64,
    pub content_failed: u64,
    pub content_dropped: u64,
    pub flushes: u64,
    pub flush_deferred: u64,
}

impl WorkerMetrics {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            lines_in: self.lines_in.load(Ordering::Relaxed),
            size_dropped: self.size_dropped.load(Ordering::Relaxed),
            comments: self.comments.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            alloc_failed: self.alloc_failed.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            content_failed: self.content_failed.load(Ordering::Relaxed),
            content_dropped: self.content_dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_deferred: self.flush_deferred.load(Ordering::Relaxed),
        }
    }
}

/// Ingestion worker bound to one thread.
pub struct Worker {
    id: WorkerId,
    pool: Arc<TieredPool>,
    config: SharedConfig,
    parser: Arc<dyn ContentParser>,
    cache: LocalCache,
    pending: PacketChain,
    inbox: Arc<Inbox>,
    metrics: Arc<WorkerMetrics>,
    last_flush: Instant,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        pool: Arc<TieredPool>,
        config: SharedConfig,
        parser: Arc<dyn ContentParser>,
    ) -> Self {
        Self {
            id,
            pool,
            config,
            parser,
            cache: LocalCache::new(),
            pending: PacketChain::new(),
            inbox: Arc::new(Inbox::new(id)),
            metrics: Arc::new(WorkerMetrics::default()),
            last_flush: Instant::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Consumer handle for this worker's publish slot.
    pub fn inbox(&self) -> Arc<Inbox> {
        Arc::clone(&self.inbox)
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Packets parsed but not yet published.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Free cells held by this worker for `tier`.
    #[inline]
    pub fn cached(&self, tier: Tier) -> usize {
        self.cache.available(tier)
    }

    /// Entry point for one CRLF-stripped line from a client.
    ///
    /// Never fails: size violations, comments, malformed lines and allocation
    /// failures are logged and reported as a [`Disposition`]. One bad line
    /// does not affect any other traffic.
    pub fn handle_line(&mut self, origin: ClientId, line: &[u8]) -> Disposition {
        WorkerMetrics::bump(&self.metrics.lines_in);
        let config = self.config.load();

        if !config.limits.accepts(line.len()) {
            WorkerMetrics::bump(&self.metrics.size_dropped);
            log::warn!(
                "[ingest] {} packet size out of bounds ({}): {}",
                self.id,
                line.len(),
                String::from_utf8_lossy(line)
            );
            return Disposition::Dropped(DropReason::SizeOutOfBounds);
        }

        if line.first() == Some(&b'#') {
            WorkerMetrics::bump(&self.metrics.comments);
            return Disposition::Ignored;
        }

        match self.parse_with(&config, origin, line) {
            Ok(ContentStatus::Failed(reason))
                if config.content_failure == ContentFailurePolicy::Drop =>
            {
                Disposition::Dropped(DropReason::ContentRejected(reason))
            }
            Ok(status) => Disposition::Queued(status),
            Err(Error::Malformed(reason)) => {
                WorkerMetrics::bump(&self.metrics.rejected);
                log::debug!(
                    "[ingest] {} failed parsing ({}): {}",
                    self.id,
                    reason,
                    String::from_utf8_lossy(line)
                );
                Disposition::Dropped(DropReason::Malformed(reason))
            }
            Err(err @ Error::Oversized { .. }) => {
                WorkerMetrics::bump(&self.metrics.alloc_failed);
                log::error!("[ingest] {} not allocating a buffer: {}", self.id, err);
                Disposition::Dropped(DropReason::Oversized)
            }
            Err(Error::Exhausted(tier)) => {
                WorkerMetrics::bump(&self.metrics.alloc_failed);
                log::error!(
                    "[ingest] {} out of {} packet buffers, packet dropped",
                    self.id,
                    tier
                );
                Disposition::Dropped(DropReason::Exhausted(tier))
            }
            Err(err) => {
                log::error!("[ingest] {} internal error: {}", self.id, err);
                Disposition::Dropped(DropReason::Internal)
            }
        }
    }

    /// Parse one line into a pooled buffer and queue it.
    ///
    /// No size or comment gate; use [`Worker::handle_line`] for client input.
    /// Returns the content parser's verdict. Structural errors are returned
    /// before any buffer is taken.
    pub fn parse_line(&mut self, origin: ClientId, line: &[u8]) -> Result<ContentStatus> {
        let config = self.config.load();
        self.parse_with(&config, origin, line)
    }

    fn parse_with(
        &mut self,
        config: &IngestConfig,
        origin: ClientId,
        line: &[u8],
    ) -> Result<ContentStatus> {
        let layout = parse::locate_fields(line, config.limits.callsign_max)?;

        let mut buf = self
            .cache
            .acquire(&self.pool, line.len() + config.limits.rewrite_margin)?;

        let written = buf
            .fill(&layout.parts(line))
            .and_then(|_| buf.set_offsets(layout.offsets()));
        if let Err(err) = written {
            self.cache.release(&self.pool, buf);
            return Err(err);
        }
        buf.set_origin(origin, SystemTime::now());

        let status = self.parser.parse(self.id, &buf);
        if let ContentStatus::Failed(reason) = status {
            WorkerMetrics::bump(&self.metrics.content_failed);
            if config.content_failure == ContentFailurePolicy::Drop {
                WorkerMetrics::bump(&self.metrics.content_dropped);
                log::debug!("[ingest] {} content parse failed ({}), dropped", self.id, reason);
                self.cache.release(&self.pool, buf);
                return Ok(status);
            }
        }

        self.pending.push_back(buf);
        WorkerMetrics::bump(&self.metrics.queued);

        if config.flush_on_packet {
            self.flush();
        }
        Ok(status)
    }

    /// Try to publish the pending queue without blocking.
    ///
    /// Returns `false` if the consumer holds the inbox; the packets stay
    /// queued locally for the next attempt.
    pub fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        if self.inbox.try_publish(&mut self.pending) {
            WorkerMetrics::bump(&self.metrics.flushes);
            self.last_flush = Instant::now();
            true
        } else {
            WorkerMetrics::bump(&self.metrics.flush_deferred);
            false
        }
    }

    /// Timer hook: flush if the flush interval elapsed since the last publish.
    ///
    /// Returns `true` if a publish happened.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let interval = self.config.load().flush_interval;
        if now.saturating_duration_since(self.last_flush) < interval {
            return false;
        }
        self.flush()
    }

    /// Recycle a buffer this worker owns into its own cache.
    pub fn release(&mut self, buf: Box<PacketBuffer>) {
        self.cache.release(&self.pool, buf);
    }

    /// Publish whatever is pending (blocking) and return cached cells to the pool.
    pub fn shutdown(mut self) {
        self.retire();
    }

    fn retire(&mut self) {
        let pending = self.pending.len();
        self.inbox.publish(&mut self.pending);
        let returned = self.cache.drain_to(&self.pool);
        if pending > 0 || returned > 0 {
            log::debug!(
                "[ingest] {} retired: published {} pending, returned {} cached bufs",
                self.id,
                pending,
                returned
            );
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.retire();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("pending", &self.pending.len())
            .field("cache", &self.cache)
            .finish()
    }
}
