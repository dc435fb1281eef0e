// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Parser
//!
//! Turns the transfer meter's byte stream into structured progress records.
//! The meter rewrites its progress line in place, so the feed mixes
//! carriage-return and newline terminators; the parser splits on both and
//! classifies each complete line.
//!
//! ## Rules
//!
//! - unit suffixes are binary (1024-based): `B`, `KB`/`KiB`, `MB`/`MiB`,
//!   `GB`/`GiB`, `TB`/`TiB`; a decimal comma is equivalent to a point;
//! - the percentage field is optional (full streams with an unknown total
//!   do not show one);
//! - a line that does not parse as progress is emitted as a log line;
//! - a record identical to the previous one is not re-emitted;
//! - the one-time header `Starting send with size estimate: N bytes`
//!   updates the known total, after which percentages are recomputed
//!   against it.

use std::time::Instant;

use regex::Regex;

use crate::value_objects::{parse_unit, TransferProgress};

/// One classified line from the meter.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A new (de-duplicated) progress record.
    Progress(TransferProgress),
    /// A line that is not a progress update.
    Log(String),
}

/// Stateful parser over the meter's stderr feed.
pub struct ProgressParser {
    buffer: Vec<u8>,
    started: Instant,
    total: Option<u64>,
    last: Option<TransferProgress>,
    bytes_re: Regex,
    rate_re: Regex,
    percent_re: Regex,
    eta_re: Regex,
    estimate_re: Regex,
}

impl ProgressParser {
    pub fn new() -> Self {
        ProgressParser {
            buffer: Vec::new(),
            started: Instant::now(),
            total: None,
            last: None,
            // Leading byte count, e.g. "1,06GiB" or " 512B"
            bytes_re: Regex::new(r"^\s*(\d+(?:[.,]\d+)?)\s*([KMGT]i?B|B)\b").expect("static regex"),
            // Bracketed rate, e.g. "[ 179MiB/s]"
            rate_re: Regex::new(r"\[\s*(\d+(?:[.,]\d+)?)\s*([KMGT]i?B|B)/s\s*\]").expect("static regex"),
            // Bare percentage, e.g. " 42%"
            percent_re: Regex::new(r"\s(\d+)%").expect("static regex"),
            // "ETA 0:01:23"
            eta_re: Regex::new(r"ETA\s+(\d+):(\d{2}):(\d{2})").expect("static regex"),
            estimate_re: Regex::new(r"Starting send with size estimate: (\d+) bytes").expect("static regex"),
        }
    }

    /// The size estimate learned from the header, if any.
    pub fn known_total(&self) -> Option<u64> {
        self.total
    }

    /// The most recent progress record emitted.
    pub fn last_progress(&self) -> Option<&TransferProgress> {
        self.last.as_ref()
    }

    /// Feeds raw meter output; returns every event completed by this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        for byte in chunk {
            match byte {
                b'\r' | b'\n' => {
                    if !self.buffer.is_empty() {
                        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
                        self.buffer.clear();
                        if !line.is_empty() {
                            if let Some(event) = self.push_line(&line) {
                                events.push(event);
                            }
                        }
                    }
                }
                byte => self.buffer.push(*byte),
            }
        }
        events
    }

    /// Flushes a trailing unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if line.is_empty() {
            None
        } else {
            self.push_line(&line)
        }
    }

    /// Classifies one complete line.
    pub fn push_line(&mut self, line: &str) -> Option<ProgressEvent> {
        if let Some(captures) = self.estimate_re.captures(line) {
            if let Ok(total) = captures[1].parse::<u64>() {
                self.total = Some(total);
            }
            return Some(ProgressEvent::Log(line.to_string()));
        }

        match self.parse_progress(line) {
            Some(progress) => {
                if self.last.as_ref() == Some(&progress) {
                    None
                } else {
                    self.last = Some(progress.clone());
                    Some(ProgressEvent::Progress(progress))
                }
            }
            None => Some(ProgressEvent::Log(line.to_string())),
        }
    }

    fn parse_progress(&self, line: &str) -> Option<TransferProgress> {
        let captures = self.bytes_re.captures(line)?;
        let value: f64 = captures[1].replace(',', ".").parse().ok()?;
        let bytes_transferred = (value * parse_unit(&captures[2])? as f64) as u64;

        let rate_bytes_per_second = self
            .rate_re
            .captures(line)
            .and_then(|captures| {
                let value: f64 = captures[1].replace(',', ".").parse().ok()?;
                Some((value * parse_unit(&captures[2])? as f64) as u64)
            })
            .unwrap_or(0);

        let eta_seconds = self.eta_re.captures(line).and_then(|captures| {
            let hours: u64 = captures[1].parse().ok()?;
            let minutes: u64 = captures[2].parse().ok()?;
            let seconds: u64 = captures[3].parse().ok()?;
            Some(hours * 3600 + minutes * 60 + seconds)
        });

        let percentage = self
            .percent_re
            .captures(line)
            .and_then(|captures| captures[1].parse::<f64>().ok());

        let progress = TransferProgress {
            bytes_transferred,
            bytes_total: None,
            percentage,
            rate_bytes_per_second,
            eta_seconds,
            elapsed_seconds: self.started.elapsed().as_secs(),
        };

        // A known total overrides the meter's own percentage column
        Some(match self.total {
            Some(total) => progress.with_total(total),
            None => progress,
        })
    }
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}
