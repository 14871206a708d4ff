// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Workspace limits.
//!
//! A [`MemoryBudget`] is the ceiling on workspace memory a plan may request
//! and the pool may hand out. Configuration files and the CLI spell it as a
//! human-readable string such as `"2G"` or `"64K"`.

use crate::MemoryError;
use std::fmt;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// Suffixes in match order. Two-letter forms come first so that `"MB"` is
/// not read as a number ending in `B`.
const SUFFIXES: [(&str, usize); 7] = [
    ("GB", GIB),
    ("MB", MIB),
    ("KB", KIB),
    ("G", GIB),
    ("M", MIB),
    ("K", KIB),
    ("B", 1),
];

/// Display units, largest first.
const UNITS: [(usize, &str); 3] = [(GIB, "GB"), (MIB, "MB"), (KIB, "KB")];

/// A hard ceiling on workspace bytes.
///
/// Limits are binary: `"1K"` is 1024 bytes, `"1M"` is 1024², `"1G"`
/// is 1024³. A bare number is a byte count. Suffixes are case-insensitive
/// and may carry a trailing `B`.
///
/// # Examples
/// ```
/// use memory_manager::MemoryBudget;
///
/// let limit = MemoryBudget::parse("64K").unwrap();
/// assert!(limit.fits(65_536));
/// assert!(!limit.fits(65_537));
/// assert_eq!(limit.to_string(), "64 KB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self::from_bytes(mb.saturating_mul(MIB))
    }

    pub fn from_gb(gb: usize) -> Self {
        Self::from_bytes(gb.saturating_mul(GIB))
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Whole megabytes, truncated.
    pub fn as_mb(&self) -> usize {
        self.bytes / MIB
    }

    /// Returns `true` if a workspace of `bytes` stays within the limit.
    pub fn fits(&self, bytes: usize) -> bool {
        bytes <= self.bytes
    }

    /// Bytes left once `used` bytes are taken, or zero past the limit.
    pub fn headroom(&self, used: usize) -> usize {
        self.bytes.saturating_sub(used)
    }

    /// Parses a limit such as `"2G"`, `"512MB"`, `"64k"` or `"4096"`.
    ///
    /// # Errors
    /// [`MemoryError::InvalidBudget`] for an empty or non-numeric string,
    /// a fractional value, an overflowing value, or a zero limit.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let text = s.trim();
        let invalid = |reason: &str| MemoryError::InvalidBudget {
            input: text.to_string(),
            reason: reason.to_string(),
        };
        if text.is_empty() {
            return Err(invalid("empty string"));
        }

        let upper = text.to_ascii_uppercase();
        let (digits, unit) = SUFFIXES
            .iter()
            .find_map(|&(suffix, unit)| upper.strip_suffix(suffix).map(|rest| (rest, unit)))
            .unwrap_or((upper.as_str(), 1));

        let value: usize = digits
            .trim()
            .parse()
            .map_err(|_| invalid("expected a whole number with an optional K, M or G suffix"))?;
        let bytes = value
            .checked_mul(unit)
            .ok_or_else(|| invalid("value overflows usize"))?;
        if bytes == 0 {
            return Err(invalid("limit must be non-zero"));
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for MemoryBudget {
    /// Prints the largest unit that divides the limit exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match UNITS
            .iter()
            .find(|&&(unit, _)| self.bytes >= unit && self.bytes % unit == 0)
        {
            Some(&(unit, name)) => write!(f, "{} {name}", self.bytes / unit),
            None => write!(f, "{} B", self.bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(MemoryBudget::from_mb(512).as_bytes(), 512 * MIB);
        assert_eq!(MemoryBudget::from_gb(2).as_mb(), 2048);
        assert_eq!(MemoryBudget::from_gb(usize::MAX).as_bytes(), usize::MAX);
    }

    #[test]
    fn test_parse_suffixes() {
        let cases = [
            ("2G", 2 * GIB),
            ("2gb", 2 * GIB),
            ("512M", 512 * MIB),
            ("512Mb", 512 * MIB),
            ("64K", 64 * KIB),
            ("64kb", 64 * KIB),
            ("128B", 128),
            ("4096", 4096),
            ("  1 M ", MIB),
        ];
        for (text, bytes) in cases {
            assert_eq!(MemoryBudget::parse(text).unwrap().as_bytes(), bytes, "{text:?}");
        }
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["", "  ", "abc", "0", "0K", "1.5G", "-1M", "K", "99999999999999999999G"] {
            assert!(
                matches!(MemoryBudget::parse(bad), Err(MemoryError::InvalidBudget { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_fits_and_headroom() {
        let limit = MemoryBudget::parse("128").unwrap();
        assert!(limit.fits(128));
        assert!(!limit.fits(129));
        assert_eq!(limit.headroom(100), 28);
        assert_eq!(limit.headroom(256), 0);
    }

    #[test]
    fn test_display_picks_exact_unit() {
        assert_eq!(MemoryBudget::from_gb(1).to_string(), "1 GB");
        assert_eq!(MemoryBudget::from_mb(1536).to_string(), "1536 MB");
        assert_eq!(MemoryBudget::from_bytes(2048).to_string(), "2 KB");
        assert_eq!(MemoryBudget::from_bytes(100).to_string(), "100 B");
        assert_eq!(MemoryBudget::from_bytes(1500).to_string(), "1500 B");
    }

    #[test]
    fn test_serde_roundtrip() {
        let b = MemoryBudget::from_mb(256);
        let json = serde_json::to_string(&b).unwrap();
        let back: MemoryBudget = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
