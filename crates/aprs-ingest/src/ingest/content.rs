// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Seam for the semantic (position/telemetry) parser.
//!
//! The ingestion path only needs routing fields. Payload decoding is done by
//! a [`ContentParser`] invoked on the populated buffer; its verdict is
//! reported to the caller but does not decide whether the packet is queued
//! (see [`crate::config::ContentFailurePolicy`]).

use super::worker::WorkerId;
use crate::pbuf::PacketBuffer;

/// Verdict of a content parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    /// Payload decoded.
    Parsed,
    /// Payload could not be decoded.
    Failed(&'static str),
}

impl ContentStatus {
    #[inline]
    pub fn is_parsed(self) -> bool {
        matches!(self, ContentStatus::Parsed)
    }
}

/// Decodes the payload of a buffer whose routing offsets are populated.
///
/// Called on the worker thread for every structurally valid packet; must not block.
pub trait ContentParser: Send + Sync {
    fn parse(&self, worker: WorkerId, packet: &PacketBuffer) -> ContentStatus;
}

/// Accepts every packet (structural validation only).
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralOnly;

impl ContentParser for StructuralOnly {
    fn parse(&self, _worker: WorkerId, _packet: &PacketBuffer) -> ContentStatus {
        ContentStatus::Parsed
    }
}

impl<F> ContentParser for F
where
    F: Fn(WorkerId, &PacketBuffer) -> ContentStatus + Send + Sync,
{
    fn parse(&self, worker: WorkerId, packet: &PacketBuffer) -> ContentStatus {
        self(worker, packet)
    }
}
