// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # aprs-ingest - APRS-IS packet ingestion hot path
//!
//! Turns raw text lines received from APRS-IS clients into pooled, validated
//! packet buffers with routing offsets, rewrites the q-construct when a client
//! injects one, and hands the packets off to a single dedup/routing consumer
//! without blocking the receiving thread.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aprs_ingest::config::IngestConfig;
//! use aprs_ingest::ingest::{Disposition, IngestContext, StructuralOnly, WorkerId};
//! use aprs_ingest::pbuf::{ClientId, ReleaseTo};
//! use std::sync::Arc;
//!
//! fn main() -> aprs_ingest::Result<()> {
//!     let ctx = IngestContext::new(IngestConfig::default())?;
//!     let mut worker = ctx.new_worker(WorkerId(0), Arc::new(StructuralOnly));
//!     let inbox = worker.inbox();
//!
//!     if let Disposition::Queued(_) = worker.handle_line(ClientId(1), b"N0CALL>APRS,TCPIP*:>hello") {
//!         worker.flush();
//!     }
//!
//!     // Consumer thread
//!     for packet in inbox.drain() {
//!         println!("{}", String::from_utf8_lossy(packet.as_bytes()));
//!         ctx.pool().release(packet, ReleaseTo::Global);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |  client thread:  Worker::handle_line                              |
//! |    size gate -> comment filter -> locate_fields -> q rewrite      |
//! |    LocalCache::acquire -> ContentParser -> pending PacketChain    |
//! +-------------------------------------------------------------------+
//! |  handoff:  Inbox::try_publish (try_lock, O(1) splice)             |
//! +-------------------------------------------------------------------+
//! |  consumer:  Inbox::drain -> dedup/route -> TieredPool::free_many  |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`pbuf`] - tiered buffer pool, worker caches, intrusive packet chains
//! - [`ingest`] - entry gate, structural parser, worker and handoff
//! - [`config`] - limits, tier geometry, runtime config
//! - [`error`] - error and rejection types

pub mod config;
pub mod error;
pub mod ingest;
pub mod pbuf;

pub use config::{IngestConfig, SharedConfig};
pub use error::{Error, Rejection, Result};
pub use ingest::{Disposition, IngestContext, Worker, WorkerId};
pub use pbuf::{ClientId, PacketBuffer, PacketChain, Tier, TieredPool};
