// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Structural validation and routing-field location for APRS-IS lines.
//!
//! A packet looks like `SRCCALL>DSTCALL,PATH,PATH:INFO` (line terminator
//! already stripped). [`locate_fields`] finds the field boundaries and decides
//! how the path is rewritten, without allocating anything. The caller then
//! copies [`LineLayout::parts`] into a pooled buffer.
//!
//! Path rewrite rules:
//!
//! - `...,HOP,I:` (explicit injection marker): the path is cut just before
//!   `HOP` and `qA#,HOP` is written in place of `HOP,I`.
//! - Otherwise the via hops are scanned for a hop starting with `qA`. If one
//!   is found the path already carries a q-construct and is kept as is. If
//!   none is found the path is kept as is too; no default q-construct is
//!   synthesized.

use crate::config::{INJECTION_SLACK, LINE_END, QCONSTRUCT_INJECTED};
use crate::error::Rejection;
use crate::pbuf::FieldOffsets;

/// How the routing path is rewritten on the way into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QConstruct {
    /// A via hop starting with `qA` begins at this byte offset.
    Existing { at: usize },
    /// No q-construct in the path.
    Absent,
    /// `,HOP,I` injection: keep `line[..keep]`, then write `qA#,` + `line[hop_start..hop_end]`.
    Injected {
        keep: usize,
        hop_start: usize,
        hop_end: usize,
    },
}

/// Field boundaries of one validated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    /// Position of `>`.
    pub src_end: usize,
    /// End of the destination callsign, SSID excluded.
    pub dst_end: usize,
    /// Position of the `:` ending the path.
    pub path_end: usize,
    pub qconstruct: QConstruct,
}

impl LineLayout {
    /// Bytes to copy into the buffer, in order: kept path, q-construct prefix,
    /// q-construct hop, `:` + payload, CRLF.
    pub fn parts<'a>(&self, line: &'a [u8]) -> [&'a [u8]; 5] {
        match self.qconstruct {
            QConstruct::Injected {
                keep,
                hop_start,
                hop_end,
            } => [
                &line[..keep],
                QCONSTRUCT_INJECTED,
                &line[hop_start..hop_end],
                &line[self.path_end..],
                LINE_END,
            ],
            QConstruct::Existing { .. } | QConstruct::Absent => {
                [&line[..self.path_end], &[], &[], &line[self.path_end..], LINE_END]
            }
        }
    }

    /// Path bytes written before the `:` (kept path plus synthesized q-construct).
    fn rewritten_path_len(&self) -> usize {
        match self.qconstruct {
            QConstruct::Injected {
                keep,
                hop_start,
                hop_end,
            } => keep + QCONSTRUCT_INJECTED.len() + (hop_end - hop_start),
            QConstruct::Existing { .. } | QConstruct::Absent => self.path_end,
        }
    }

    /// Total buffer bytes for `line`, CRLF included.
    pub fn rewritten_len(&self, line: &[u8]) -> usize {
        self.rewritten_path_len() + (line.len() - self.path_end) + LINE_END.len()
    }

    /// Field offsets relative to the rewritten buffer.
    pub fn offsets(&self) -> FieldOffsets {
        FieldOffsets {
            src_end: self.src_end,
            dst_end: self.dst_end,
            info_start: self.rewritten_path_len() + 1,
        }
    }
}

/// Validate `line` and locate its routing fields.
///
/// Checks, in order: payload separator, `>` within `callsign_max + 1` bytes,
/// source length, non-empty path, non-empty payload, destination length, then
/// the injection-marker hop.
pub fn locate_fields(line: &[u8], callsign_max: usize) -> Result<LineLayout, Rejection> {
    let path_end = memchr(b':', line).ok_or(Rejection::NoPayloadSeparator)?;

    let window = path_end.min(callsign_max + 1);
    let src_end = memchr(b'>', &line[..window]).ok_or(Rejection::NoSourceTerminator)?;
    if src_end > callsign_max {
        return Err(Rejection::SourceCallTooLong);
    }

    let path_start = src_end + 1;
    if path_start >= path_end {
        return Err(Rejection::EmptyPath);
    }

    if path_end + 1 >= line.len() {
        return Err(Rejection::EmptyPayload);
    }

    let dst_end = path_start
        + line[path_start..path_end]
            .iter()
            .position(|&c| c == b'-' || c == b',')
            .unwrap_or(path_end - path_start);
    if dst_end - path_start > callsign_max {
        return Err(Rejection::DestCallTooLong);
    }

    let qconstruct = if path_end > 2 && line[path_end - 2] == b',' && line[path_end - 1] == b'I' {
        injected_hop(line, path_start, path_end, callsign_max)?
    } else {
        let via_start = match memchr(b',', &line[dst_end..path_end]) {
            Some(comma) => dst_end + comma + 1,
            None => path_end,
        };
        match PathScan::new(line, via_start, path_end).run() {
            Some(at) => QConstruct::Existing { at },
            None => QConstruct::Absent,
        }
    };

    Ok(LineLayout {
        src_end,
        dst_end,
        path_end,
        qconstruct,
    })
}

/// Locate `HOP` in `...,HOP,I:`.
fn injected_hop(
    line: &[u8],
    path_start: usize,
    path_end: usize,
    callsign_max: usize,
) -> Result<QConstruct, Rejection> {
    let marker = path_end - 2;
    let comma = line[path_start..marker]
        .iter()
        .rposition(|&c| c == b',')
        .map(|i| path_start + i)
        .ok_or(Rejection::InjectionWithoutHop)?;

    if path_end - comma > callsign_max + INJECTION_SLACK {
        return Err(Rejection::InjectionHopTooLong);
    }

    let hop_start = comma + 1;
    if hop_start == marker {
        return Err(Rejection::InjectionWithoutHop);
    }

    Ok(QConstruct::Injected {
        keep: hop_start,
        hop_start,
        hop_end: marker,
    })
}

#[inline]
fn memchr(needle: u8, haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&c| c == needle)
}

/// Scanner states over the via hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// At the first byte of a hop (or at the end of the path).
    BeforePath,
    /// Inside a hop that is not a q-construct.
    InHop,
    /// A hop starting with `qA` begins here.
    FoundQ(usize),
    /// No more hops.
    EndOfPath,
}

/// Token scanner looking for an existing `qA` hop between `start` and `end`.
struct PathScan<'a> {
    line: &'a [u8],
    pos: usize,
    end: usize,
    state: ScanState,
}

impl<'a> PathScan<'a> {
    fn new(line: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            line,
            pos: start,
            end,
            state: ScanState::BeforePath,
        }
    }

    fn step(&mut self) {
        self.state = match self.state {
            ScanState::BeforePath if self.pos >= self.end => ScanState::EndOfPath,
            ScanState::BeforePath => {
                let at = self.pos;
                if at + 1 < self.end && self.line[at] == b'q' && self.line[at + 1] == b'A' {
                    ScanState::FoundQ(at)
                } else {
                    ScanState::InHop
                }
            }
            ScanState::InHop => match memchr(b',', &self.line[self.pos..self.end]) {
                Some(comma) => {
                    self.pos += comma + 1;
                    ScanState::BeforePath
                }
                None => {
                    self.pos = self.end;
                    ScanState::EndOfPath
                }
            },
            done @ (ScanState::FoundQ(_) | ScanState::EndOfPath) => done,
        };
    }

    /// Drive the scanner to a final state.
    fn run(mut self) -> Option<usize> {
        loop {
            match self.state {
                ScanState::FoundQ(at) => return Some(at),
                ScanState::EndOfPath => return None,
                ScanState::BeforePath | ScanState::InHop => self.step(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CALLSIGN_LEN_MAX;

    fn locate(line: &str) -> Result<LineLayout, Rejection> {
        locate_fields(line.as_bytes(), CALLSIGN_LEN_MAX)
    }

    fn rewritten(line: &str) -> Vec<u8> {
        let layout = locate(line).expect("valid line");
        let out = layout.parts(line.as_bytes()).concat();
        assert_eq!(out.len(), layout.rewritten_len(line.as_bytes()));
        out
    }

    #[test]
    fn test_plain_packet() {
        let line = "OH2ABC>APRS,WIDE2-1:>Hello";
        let layout = locate(line).expect("valid");
        assert_eq!(layout.src_end, 6);
        assert_eq!(layout.dst_end, 11);
        assert_eq!(layout.path_end, 19);
        assert_eq!(layout.qconstruct, QConstruct::Absent);
        assert_eq!(layout.offsets().info_start, 20);
        assert_eq!(rewritten(line), b"OH2ABC>APRS,WIDE2-1:>Hello\r\n");
    }

    #[test]
    fn test_dst_ssid_excluded() {
        let layout = locate("N0CALL>APZ123-5,WIDE1-1:!data").expect("valid");
        assert_eq!(layout.dst_end, "N0CALL>APZ123".len());

        let layout = locate("N0CALL>APRS:!data").expect("valid");
        assert_eq!(layout.dst_end, "N0CALL>APRS".len());
    }

    #[test]
    fn test_rejection_order() {
        assert_eq!(locate("OH2ABC>APRS"), Err(Rejection::NoPayloadSeparator));
        assert_eq!(locate("OH2ABCAPRS:x"), Err(Rejection::NoSourceTerminator));
        assert_eq!(locate("OH2ABC>:x"), Err(Rejection::EmptyPath));
        assert_eq!(locate("OH2ABC>APRS,WIDE2-1:"), Err(Rejection::EmptyPayload));
        assert_eq!(
            locate("OH2ABC>APRSAPRSAP,WIDE:x"),
            Err(Rejection::DestCallTooLong)
        );
        // ':' before '>' means the source terminator is outside the header
        assert_eq!(locate("AB:C>D,E:x"), Err(Rejection::NoSourceTerminator));
    }

    #[test]
    fn test_source_callsign_limit() {
        let ok = format!("{}>APRS:x", "A".repeat(CALLSIGN_LEN_MAX));
        assert!(locate(&ok).is_ok());
        let long = format!("{}>APRS:x", "A".repeat(CALLSIGN_LEN_MAX + 1));
        assert!(locate(&long).is_err());
    }

    #[test]
    fn test_dest_callsign_limit() {
        let ok = format!("SRC>{}-15:x", "D".repeat(CALLSIGN_LEN_MAX));
        assert!(locate(&ok).is_ok());
        let long = format!("SRC>{}:x", "D".repeat(CALLSIGN_LEN_MAX + 1));
        assert_eq!(locate(&long), Err(Rejection::DestCallTooLong));
    }

    #[test]
    fn test_missing_colon_always_same_rejection() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..500 {
            let len = rng.usize(0..120);
            let line: Vec<u8> = (0..len)
                .map(|_| loop {
                    let c = rng.u8(..);
                    if c != b':' {
                        break c;
                    }
                })
                .collect();
            assert_eq!(
                locate_fields(&line, CALLSIGN_LEN_MAX),
                Err(Rejection::NoPayloadSeparator)
            );
        }
    }

    #[test]
    fn test_injection_rewrite() {
        let line = "OH2ABC>APRS,WIDE2-1,RELAY,I:>Hello";
        let layout = locate(line).expect("valid");
        let keep = "OH2ABC>APRS,WIDE2-1,".len();
        assert_eq!(
            layout.qconstruct,
            QConstruct::Injected {
                keep,
                hop_start: keep,
                hop_end: keep + "RELAY".len(),
            }
        );
        let out = rewritten(line);
        assert_eq!(out, b"OH2ABC>APRS,WIDE2-1,qA#,RELAY:>Hello\r\n");
        assert_eq!(
            out.len(),
            keep + "qA#,RELAY".len() + ":>Hello".len() + 2
        );
        let info_start = layout.offsets().info_start;
        assert_eq!(&out[info_start..out.len() - 2], b">Hello");
    }

    #[test]
    fn test_injection_directly_after_destination() {
        let line = "OH2ABC>APRS,RELAY,I:x";
        assert_eq!(rewritten(line), b"OH2ABC>APRS,qA#,RELAY:x\r\n");
    }

    #[test]
    fn test_injection_without_hop() {
        assert_eq!(locate("OH2ABC>APRS,I:x"), Err(Rejection::InjectionWithoutHop));
        assert_eq!(
            locate("OH2ABC>APRS,,I:x"),
            Err(Rejection::InjectionWithoutHop)
        );
    }

    #[test]
    fn test_injection_hop_limit() {
        let ok = format!("SRC>APRS,{},I:x", "H".repeat(CALLSIGN_LEN_MAX));
        assert!(matches!(
            locate(&ok).map(|l| l.qconstruct),
            Ok(QConstruct::Injected { .. })
        ));
        let long = format!("SRC>APRS,{},I:x", "H".repeat(CALLSIGN_LEN_MAX + 1));
        assert_eq!(locate(&long), Err(Rejection::InjectionHopTooLong));
    }

    #[test]
    fn test_existing_qconstruct_preserved() {
        let line = "OH2ABC>APRS,WIDE2-1,qAR,OH2RDK:>Hi";
        let layout = locate(line).expect("valid");
        assert_eq!(
            layout.qconstruct,
            QConstruct::Existing {
                at: "OH2ABC>APRS,WIDE2-1,".len()
            }
        );
        assert_eq!(rewritten(line), format!("{}\r\n", line).into_bytes());
    }

    #[test]
    fn test_qa_inside_hop_is_not_a_qconstruct() {
        let layout = locate("OH2ABC>APRS,XqA,WIDE:x").expect("valid");
        assert_eq!(layout.qconstruct, QConstruct::Absent);
        // a lone trailing 'q' cannot match
        let layout = locate("OH2ABC>APRS,q:x").expect("valid");
        assert_eq!(layout.qconstruct, QConstruct::Absent);
    }

    #[test]
    fn test_destination_is_not_scanned() {
        let layout = locate("OH2ABC>qAPRS:x").expect("valid");
        assert_eq!(layout.qconstruct, QConstruct::Absent);
    }
}
