// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Line ingestion: entry gate, structural parse, q-construct rewrite and
//! handoff to the shared consumer.
//!
//! An [`IngestContext`] owns the process-wide pieces (tiered pool, runtime
//! config); each client-handling thread gets its own [`Worker`] from it.

pub mod content;
pub mod handoff;
pub mod parse;
pub mod worker;

pub use content::{ContentParser, ContentStatus, StructuralOnly};
pub use handoff::Inbox;
pub use parse::{locate_fields, LineLayout, QConstruct};
pub use worker::{
    Disposition, DropReason, Worker, WorkerId, WorkerMetrics, WorkerMetricsSnapshot,
};

use crate::config::{IngestConfig, SharedConfig};
use crate::error::Result;
use crate::pbuf::{Tier, TieredPool};
use std::sync::Arc;

/// Shared state behind all workers of one server instance.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pool: Arc<TieredPool>,
    config: SharedConfig,
}

impl IngestContext {
    /// Validate `config` and build the tiered pool (arenas start empty).
    pub fn new(config: IngestConfig) -> Result<Self> {
        let pool = Arc::new(TieredPool::new(&config.pool)?);
        let config = SharedConfig::new(config)?;
        log::info!(
            "[ingest] pool ready: tiers {}/{}/{} bytes",
            pool.arena(Tier::Small).capacity(),
            pool.arena(Tier::Large).capacity(),
            pool.arena(Tier::Huge).capacity()
        );
        Ok(Self { pool, config })
    }

    pub fn pool(&self) -> &Arc<TieredPool> {
        &self.pool
    }

    /// Runtime config; `store` takes effect on each worker's next line.
    ///
    /// Pool geometry is fixed at construction; a reload with a different
    /// `pool` is rejected.
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Create a worker bound to this context. Move it onto its thread.
    pub fn new_worker(&self, id: WorkerId, parser: Arc<dyn ContentParser>) -> Worker {
        log::debug!("[ingest] worker {} created", id);
        Worker::new(id, Arc::clone(&self.pool), self.config.clone(), parser)
    }
}
