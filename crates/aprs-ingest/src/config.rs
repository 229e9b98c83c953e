// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion configuration - single source of truth.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: compile-time constants (APRS-IS wire limits, tier geometry)
//! - **Level 2 (Dynamic)**: [`SharedConfig`] holding an [`IngestConfig`] that can be
//!   swapped at runtime without locks
//!
//! # Example
//!
//! ```
//! use aprs_ingest::config::{IngestConfig, SharedConfig};
//!
//! let shared = SharedConfig::new(IngestConfig::default()).expect("defaults are valid");
//!
//! let mut tighter = IngestConfig::default();
//! tighter.limits.max_len = 300;
//! shared.store(tighter).expect("still valid");
//! assert_eq!(shared.load().limits.max_len, 300);
//! ```

use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;

// =======================================================================
// APRS-IS Wire Limits
// =======================================================================

/// Maximum callsign length (without the `-SSID` suffix for destinations).
pub const CALLSIGN_LEN_MAX: usize = 9;

/// Minimum accepted line length (bytes, CRLF excluded).
pub const PACKET_LEN_MIN: usize = 10;

/// Maximum packet length on output, including the CRLF appended on output.
pub const PACKET_LEN_MAX: usize = 512;

/// Bytes reserved on top of the line length for a synthesized `qA#,CALLSIGN`.
pub const QCONSTRUCT_MARGIN: usize = 14;

/// Slack allowed past the callsign limit between the injection hop's comma and `:`.
///
/// Covers the leading comma plus the trailing `,I` marker.
pub const INJECTION_SLACK: usize = 3;

/// Prefix written in front of the reporting hop for `,I` injected packets.
pub const QCONSTRUCT_INJECTED: &[u8] = b"qA#,";

/// Line terminator appended to every buffered packet.
pub const LINE_END: &[u8] = b"\r\n";

// =======================================================================
// Buffer Tiers
// =======================================================================

/// Small tier capacity (bytes): typical position reports.
pub const TIER_SMALL_LEN: usize = 100;

/// Large tier capacity (bytes): long paths and comments.
pub const TIER_LARGE_LEN: usize = 256;

/// Huge tier capacity (bytes): maximum packet plus rewrite margin.
pub const TIER_HUGE_LEN: usize = PACKET_LEN_MAX + QCONSTRUCT_MARGIN;

/// Cells moved from the small arena into a worker cache per refill.
pub const BUNCH_SMALL: usize = 256;

/// Cells moved from the large arena into a worker cache per refill.
pub const BUNCH_LARGE: usize = 64;

/// Cells moved from the huge arena into a worker cache per refill.
pub const BUNCH_HUGE: usize = 32;

/// Upper bound for any single bunch transfer.
pub const BUNCH_MAX: usize = 1024;

/// Arena growth step (bytes of cell payload added per step).
pub const ARENA_GROW_BYTES: usize = 1 << 20;

/// Default cell limit per arena.
pub const ARENA_MAX_CELLS: usize = 65_536;

// =======================================================================
// Handoff
// =======================================================================

/// Timer-driven flush interval (milliseconds).
pub const FLUSH_INTERVAL_MS: u64 = 200;

// =======================================================================
// Runtime Configuration
// =======================================================================

/// Accepted line length bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct PacketLimits {
    /// Shortest accepted line (CRLF excluded).
    pub min_len: usize,
    /// Longest accepted packet including the CRLF added on output.
    pub max_len: usize,
    /// Longest source or destination callsign.
    pub callsign_max: usize,
    /// Extra bytes requested for the q-construct rewrite.
    pub rewrite_margin: usize,
}

impl Default for PacketLimits {
    fn default() -> Self {
        Self {
            min_len: PACKET_LEN_MIN,
            max_len: PACKET_LEN_MAX,
            callsign_max: CALLSIGN_LEN_MAX,
            rewrite_margin: QCONSTRUCT_MARGIN,
        }
    }
}

impl PacketLimits {
    /// True if a CRLF-stripped line of `len` bytes is inside the bounds.
    #[inline]
    pub fn accepts(&self, len: usize) -> bool {
        len >= self.min_len && len + LINE_END.len() <= self.max_len
    }
}

/// Geometry of one buffer tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
pub struct TierConfig {
    /// Buffer capacity in bytes.
    pub capacity: usize,
    /// Cells fetched per worker cache refill.
    pub bunch: usize,
    /// Upper bound on cells this arena ever creates.
    #[cfg_attr(feature = "config-loaders", serde(default = "default_max_cells"))]
    pub max_cells: usize,
}

#[cfg(feature = "config-loaders")]
fn default_max_cells() -> usize {
    ARENA_MAX_CELLS
}

impl TierConfig {
    pub const fn new(capacity: usize, bunch: usize, max_cells: usize) -> Self {
        Self {
            capacity,
            bunch,
            max_cells,
        }
    }

    /// Cells created per growth step (at least one).
    pub fn grow_cells(&self) -> usize {
        (ARENA_GROW_BYTES / self.capacity.max(1)).clamp(1, self.max_cells.max(1))
    }
}

/// Geometry of the three tiers, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct PoolConfig {
    pub small: TierConfig,
    pub large: TierConfig,
    pub huge: TierConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            small: TierConfig::new(TIER_SMALL_LEN, BUNCH_SMALL, ARENA_MAX_CELLS),
            large: TierConfig::new(TIER_LARGE_LEN, BUNCH_LARGE, ARENA_MAX_CELLS),
            huge: TierConfig::new(TIER_HUGE_LEN, BUNCH_HUGE, ARENA_MAX_CELLS),
        }
    }
}

impl PoolConfig {
    pub fn tiers(&self) -> [TierConfig; 3] {
        [self.small, self.large, self.huge]
    }

    pub fn validate(&self) -> Result<()> {
        let [small, large, huge] = self.tiers();
        if small.capacity == 0 || small.capacity >= large.capacity || large.capacity >= huge.capacity
        {
            return Err(Error::InvalidConfig(format!(
                "tier capacities must be strictly ascending and non-zero ({} < {} < {})",
                small.capacity, large.capacity, huge.capacity
            )));
        }
        for tier in self.tiers() {
            if tier.bunch == 0 || tier.bunch > BUNCH_MAX {
                return Err(Error::InvalidConfig(format!(
                    "bunch size {} outside 1..={}",
                    tier.bunch, BUNCH_MAX
                )));
            }
            if tier.max_cells == 0 {
                return Err(Error::InvalidConfig("arena max_cells must be > 0".into()));
            }
        }
        Ok(())
    }
}

/// What happens to a structurally valid packet the content parser rejects.
///
/// Structurally invalid lines never get a buffer, so they are always dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(rename_all = "snake_case"))]
pub enum ContentFailurePolicy {
    /// Queue it anyway; downstream decides.
    #[default]
    Forward,
    /// Recycle the buffer into the worker cache instead of queueing it.
    Drop,
}

/// Complete ingestion configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct IngestConfig {
    pub limits: PacketLimits,
    pub pool: PoolConfig,
    /// Timer flush interval for [`crate::ingest::Worker::tick`].
    #[cfg_attr(feature = "config-loaders", serde(with = "duration_ms"))]
    pub flush_interval: Duration,
    /// Attempt a flush after every queued packet.
    pub flush_on_packet: bool,
    pub content_failure: ContentFailurePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            limits: PacketLimits::default(),
            pool: PoolConfig::default(),
            flush_interval: Duration::from_millis(FLUSH_INTERVAL_MS),
            flush_on_packet: true,
            content_failure: ContentFailurePolicy::Forward,
        }
    }
}

impl IngestConfig {
    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        let limits = &self.limits;
        if limits.min_len == 0 || limits.min_len + LINE_END.len() > limits.max_len {
            return Err(Error::InvalidConfig(format!(
                "packet length bounds {}..{} are empty",
                limits.min_len, limits.max_len
            )));
        }
        if limits.callsign_max == 0 {
            return Err(Error::InvalidConfig("callsign_max must be > 0".into()));
        }
        if limits.rewrite_margin < QCONSTRUCT_INJECTED.len() + limits.callsign_max {
            return Err(Error::InvalidConfig(format!(
                "rewrite_margin {} cannot hold a qA#,<callsign> token",
                limits.rewrite_margin
            )));
        }
        // Longest accepted line plus rewrite margin must fit the huge tier.
        let worst = limits.max_len - LINE_END.len() + limits.rewrite_margin;
        if worst > self.pool.huge.capacity {
            return Err(Error::InvalidConfig(format!(
                "huge tier {} cannot hold {} byte packets plus {} margin",
                self.pool.huge.capacity, limits.max_len, limits.rewrite_margin
            )));
        }
        Ok(())
    }

    /// Parse a YAML document.
    ///
    /// ```yaml
    /// limits:
    ///   max_len: 512
    /// pool:
    ///   small: { capacity: 128, bunch: 128 }
    /// flush_interval: 100
    /// content_failure: forward
    /// ```
    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    #[cfg(feature = "config-loaders")]
    pub fn load_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigFileNotFound(path.display().to_string())
            } else {
                Error::IoError(e)
            }
        })?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(feature = "config-loaders")]
mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Runtime configuration shared by every worker (lock-free reads).
///
/// `ArcSwap` lets an operator replace the whole config atomically; workers
/// pick up the new snapshot on their next line. Pool geometry is fixed by
/// the first config: a later snapshot must carry the same `pool`, so its
/// limits are always validated against the tiers actually running.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<IngestConfig>>,
    pool: PoolConfig,
}

impl SharedConfig {
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: config.pool,
            inner: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    /// Geometry the pool was built with.
    #[inline]
    pub fn pool(&self) -> PoolConfig {
        self.pool
    }

    /// Current snapshot.
    #[inline]
    pub fn load(&self) -> Arc<IngestConfig> {
        self.inner.load_full()
    }

    /// Validate and publish a new snapshot.
    ///
    /// Rejected if `config.pool` differs from the live geometry; the current
    /// snapshot stays in place.
    pub fn store(&self, config: IngestConfig) -> Result<()> {
        if config.pool != self.pool {
            return Err(Error::InvalidConfig(format!(
                "pool geometry is fixed at startup (huge tier {} bytes), reload changed it",
                self.pool.huge.capacity
            )));
        }
        config.validate()?;
        self.inner.store(Arc::new(config));
        log::info!("[config] ingest config reloaded");
        Ok(())
    }
}

impl std::fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConfig")
            .field("current", &*self.inner.load())
            .finish()
    }
}
