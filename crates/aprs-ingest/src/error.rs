// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the ingestion path.

use crate::pbuf::Tier;

/// Why a raw line failed structural validation.
///
/// Variants are listed in the order the parser checks them. Every rejection
/// happens before a packet buffer is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// No `:` anywhere in the line.
    NoPayloadSeparator,
    /// No `>` within the first callsign-length bytes.
    NoSourceTerminator,
    /// Source callsign longer than the callsign limit.
    SourceCallTooLong,
    /// Nothing between `>` and `:`.
    EmptyPath,
    /// Nothing after `:`.
    EmptyPayload,
    /// Destination callsign (SSID excluded) longer than the callsign limit.
    DestCallTooLong,
    /// `,HOP,I` injection marker whose hop is too long.
    InjectionHopTooLong,
    /// `,I` injection marker with no reporting hop in front of it.
    InjectionWithoutHop,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoPayloadSeparator => "no payload separator",
            Self::NoSourceTerminator => "no '>' after source callsign",
            Self::SourceCallTooLong => "source callsign too long",
            Self::EmptyPath => "empty path",
            Self::EmptyPayload => "empty payload",
            Self::DestCallTooLong => "destination callsign too long",
            Self::InjectionHopTooLong => "injection hop too long",
            Self::InjectionWithoutHop => "injection marker without hop",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by pool, parser and configuration operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Packet Errors
    // ========================================================================
    /// Line is structurally malformed.
    Malformed(Rejection),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Requested length exceeds the largest tier.
    Oversized { requested: usize, max: usize },
    /// Tier arena could not hand out any cell.
    Exhausted(Tier),
    /// A write would run past the buffer capacity.
    BufferOverflow { needed: usize, capacity: usize },
    /// Field offsets violate `src_end <= dst_end <= info_start <= packet_len`.
    InvalidOffsets,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration values are inconsistent.
    InvalidConfig(String),
    /// Configuration file not found at specified path.
    ConfigFileNotFound(String),
    /// Configuration file could not be parsed.
    ConfigParse(String),
    /// I/O error with underlying cause.
    IoError(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Malformed(reason) => write!(f, "Malformed packet: {}", reason),
            Error::Oversized { requested, max } => {
                write!(f, "Oversized request: {} bytes (largest tier {})", requested, max)
            }
            Error::Exhausted(tier) => write!(f, "Packet buffers exhausted in {} tier", tier),
            Error::BufferOverflow { needed, capacity } => write!(
                f,
                "Buffer overflow: {} bytes needed, capacity {}",
                needed, capacity
            ),
            Error::InvalidOffsets => write!(f, "Invalid packet field offsets"),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::ConfigFileNotFound(path) => write!(f, "Config file not found: {}", path),
            Error::ConfigParse(msg) => write!(f, "Config parse error: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<Rejection> for Error {
    fn from(reason: Rejection) -> Self {
        Error::Malformed(reason)
    }
}

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_reason() {
        let err = Error::Malformed(Rejection::EmptyPayload);
        assert_eq!(err.to_string(), "Malformed packet: empty payload");

        let err = Error::Oversized {
            requested: 600,
            max: 526,
        };
        assert!(err.to_string().contains("600"));
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;
        let err = Error::from(std::io::Error::other("disk gone"));
        assert!(err.source().is_some());
        assert!(Error::InvalidOffsets.source().is_none());
    }
}
