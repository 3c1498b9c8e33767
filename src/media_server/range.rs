//! `Range` header parsing (single `bytes` range)

use crate::error::{Error, Result};

/// Inclusive byte span within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a file of `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Resolve a `Range` header against a file of `total` bytes.
///
/// - `Ok(None)`: header uses another unit; serve the whole file
/// - `Ok(Some(range))`: partial content
/// - `Err(RangeNotSatisfiable)`: malformed or outside the file
///
/// Only the first range of a multi-range request is honoured.
pub fn parse_range(header: &str, total: u64) -> Result<Option<ByteRange>> {
    let header = header.trim();
    let Some(ranges) = header.strip_prefix("bytes=") else {
        return Ok(None);
    };

    let unsatisfiable = || Error::RangeNotSatisfiable { total };

    let first = ranges.split(',').next().unwrap_or_default().trim();
    let (start, end) = first.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    if total == 0 {
        return Err(unsatisfiable());
    }
    let last = total - 1;

    let range = if start.is_empty() {
        // bytes=-N: final N bytes
        let suffix: u64 = end.parse().map_err(|_| unsatisfiable())?;
        if suffix == 0 {
            return Err(unsatisfiable());
        }
        ByteRange {
            start: total.saturating_sub(suffix),
            end: last,
        }
    } else {
        let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
        let end: u64 = if end.is_empty() {
            last
        } else {
            end.parse::<u64>().map_err(|_| unsatisfiable())?.min(last)
        };
        if start > end {
            return Err(unsatisfiable());
        }
        ByteRange { start, end }
    };

    Ok(Some(range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange { start, end })
    }

    #[test]
    fn test_explicit_range() {
        let r = parse_range("bytes=0-99", 1000).unwrap();
        assert_eq!(r, range(0, 99));
        assert_eq!(r.unwrap().len(), 100);
        assert_eq!(r.unwrap().content_range(1000), "bytes 0-99/1000");
    }

    #[test]
    fn test_open_ended_and_suffix() {
        assert_eq!(parse_range("bytes=900-", 1000).unwrap(), range(900, 999));
        assert_eq!(parse_range("bytes=-100", 1000).unwrap(), range(900, 999));
        assert_eq!(parse_range("bytes=-5000", 1000).unwrap(), range(0, 999));
    }

    #[test]
    fn test_end_is_clamped() {
        assert_eq!(parse_range("bytes=500-5000", 1000).unwrap(), range(500, 999));
    }

    #[test]
    fn test_first_of_multiple_ranges() {
        assert_eq!(parse_range("bytes=0-9, 20-29", 1000).unwrap(), range(0, 9));
    }

    #[test]
    fn test_other_unit_is_ignored() {
        assert_eq!(parse_range("items=0-5", 1000).unwrap(), None);
    }

    #[test]
    fn test_unsatisfiable() {
        for header in ["bytes=1000-", "bytes=50-10", "bytes=abc-", "bytes=-0", "bytes=", "bytes=5"] {
            assert!(
                matches!(parse_range(header, 1000), Err(Error::RangeNotSatisfiable { total: 1000 })),
                "{header} should be unsatisfiable"
            );
        }
        assert!(parse_range("bytes=0-0", 0).is_err());
    }
}
