// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Byte-Size Parsing
//!
//! Conversions between the human size strings the filesystem tools print
//! and byte counts. Two dialects appear in tool output:
//!
//! - the size-estimate dialect (`1.23G`, bare suffix, locale comma allowed),
//! - the transfer-meter dialect (`1,06GiB`, `179MiB`, `512B`).
//!
//! All suffixes are binary (1024-based); `KB` and `KiB` are the same
//! multiplier, matching the meter's own accounting.

use crate::error::ReplicationError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// Multiplier for a unit token (`B`, `KB`, `KiB`, ... `TiB`), or `None` for
/// an unknown unit.
pub fn parse_unit(unit: &str) -> Option<u64> {
    match unit.to_ascii_uppercase().replace("IB", "B").as_str() {
        "B" => Some(1),
        "KB" => Some(KIB),
        "MB" => Some(MIB),
        "GB" => Some(GIB),
        "TB" => Some(TIB),
        _ => None,
    }
}

/// Parses the size-estimate dialect: a number with an optional single-letter
/// suffix (`K`/`M`/`G`/`T`), decimal comma accepted (`1,23G`).
pub fn parse_size_suffix(text: &str) -> Result<u64, ReplicationError> {
    let text = text.trim().replace(',', ".");
    if text.is_empty() {
        return Err(ReplicationError::invalid_request("empty size string"));
    }
    let (number, multiplier) = match text.chars().last() {
        Some('K') => (&text[..text.len() - 1], KIB),
        Some('M') => (&text[..text.len() - 1], MIB),
        Some('G') => (&text[..text.len() - 1], GIB),
        Some('T') => (&text[..text.len() - 1], TIB),
        _ => (text.as_str(), 1),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| ReplicationError::invalid_request(format!("'{}' is not a size", text)))?;
    if value < 0.0 {
        return Err(ReplicationError::invalid_request(format!("'{}' is negative", text)));
    }
    Ok((value * multiplier as f64) as u64)
}

/// Formats a byte count with a binary suffix, two decimal places.
pub fn format_bytes(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut index = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && index < SUFFIXES.len() - 1 {
        value /= 1024.0;
        index += 1;
    }
    if index == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, SUFFIXES[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_unit_binary() {
        assert_eq!(parse_unit("B"), Some(1));
        assert_eq!(parse_unit("KB"), Some(1024));
        assert_eq!(parse_unit("KiB"), Some(1024));
        assert_eq!(parse_unit("MiB"), Some(1024 * 1024));
        assert_eq!(parse_unit("GiB"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_unit("TiB"), Some(1u64 << 40));
        assert_eq!(parse_unit("PiB"), None);
        assert_eq!(parse_unit("X"), None);
    }

    #[test]
    fn test_parse_size_suffix() {
        assert_eq!(parse_size_suffix("512").unwrap(), 512);
        assert_eq!(parse_size_suffix("1K").unwrap(), 1024);
        assert_eq!(parse_size_suffix("1.5K").unwrap(), 1536);
        assert_eq!(parse_size_suffix("1,5K").unwrap(), 1536);
        assert_eq!(parse_size_suffix("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_suffix_rejects_garbage() {
        assert!(parse_size_suffix("").is_err());
        assert!(parse_size_suffix("abc").is_err());
        assert!(parse_size_suffix("-1K").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MiB");
    }

    proptest! {
        #[test]
        fn prop_whole_kib_roundtrip(kib in 1u64..1_000_000) {
            let text = format!("{}K", kib);
            prop_assert_eq!(parse_size_suffix(&text).unwrap(), kib * 1024);
        }

        #[test]
        // Bounded below 2^53 so the f64 path stays exact
        fn prop_plain_bytes_roundtrip(bytes in 0u64..(1u64 << 53)) {
            let text = bytes.to_string();
            prop_assert_eq!(parse_size_suffix(&text).unwrap(), bytes);
        }
    }
}
