// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Transfer progress record.

use serde::{Deserialize, Serialize};

/// One observable update from the transfer meter.
///
/// Produced by the progress parser, published through the job's progress
/// slot, and returned verbatim by the control API. `bytes_total` and
/// `percentage` are absent for full streams whose size estimate is unknown.
/// Equality is used for de-duplication: identical consecutive records are
/// not re-emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes through the meter so far.
    pub bytes_transferred: u64,
    /// Size estimate of the whole stream, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
    /// Percentage of the estimate, one decimal place, when the total is
    /// known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    /// Instantaneous rate in bytes per second.
    pub rate_bytes_per_second: u64,
    /// Estimated seconds to completion, when the meter reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    /// Seconds since the transfer started.
    pub elapsed_seconds: u64,
}

impl TransferProgress {
    /// A zero record, reported for up-to-date replications that transfer
    /// nothing.
    pub fn zero() -> Self {
        TransferProgress {
            bytes_transferred: 0,
            bytes_total: Some(0),
            percentage: Some(100.0),
            rate_bytes_per_second: 0,
            eta_seconds: Some(0),
            elapsed_seconds: 0,
        }
    }

    /// Recomputes the percentage from a known total, one decimal place.
    pub fn with_total(mut self, total: u64) -> Self {
        self.bytes_total = Some(total);
        if total > 0 {
            let pct = (self.bytes_transferred as f64 / total as f64) * 100.0;
            self.percentage = Some((pct * 10.0).round() / 10.0);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_total_recomputes_percentage() {
        let progress = TransferProgress {
            bytes_transferred: 512,
            bytes_total: None,
            percentage: None,
            rate_bytes_per_second: 100,
            eta_seconds: None,
            elapsed_seconds: 5,
        }
        .with_total(1024);
        assert_eq!(progress.bytes_total, Some(1024));
        assert_eq!(progress.percentage, Some(50.0));
    }

    #[test]
    fn test_serde_omits_unknown_fields() {
        let progress = TransferProgress {
            bytes_transferred: 10,
            bytes_total: None,
            percentage: None,
            rate_bytes_per_second: 0,
            eta_seconds: None,
            elapsed_seconds: 1,
        };
        let json = serde_json::to_string(&progress).unwrap();
        assert!(!json.contains("bytes_total"));
        assert!(!json.contains("percentage"));
    }
}
