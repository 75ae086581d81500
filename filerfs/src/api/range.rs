//! `Range: bytes=` header parsing.
use crate::chunk::ByteRange;
use crate::error::{FilerError, FilerResult};

fn invalid(msg: impl Into<String>) -> FilerError {
    FilerError::RangeUnsatisfiable(msg.into())
}

/// Parses a `Range` header against a resource of `size` bytes.
///
/// Ranges starting at or past `size` are dropped; the parse only fails on
/// them when nothing else is left. An empty header yields no ranges.
pub fn parse_range(s: &str, size: u64) -> FilerResult<Vec<ByteRange>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let spec = s
        .strip_prefix("bytes=")
        .ok_or_else(|| invalid("invalid range unit"))?;

    let mut ranges = Vec::new();
    let mut no_overlap = false;
    for ra in spec.split(',') {
        let ra = ra.trim();
        if ra.is_empty() {
            continue;
        }
        let (start, end) = ra
            .split_once('-')
            .ok_or_else(|| invalid(format!("invalid range `{ra}`")))?;
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            // -N: the last N bytes.
            let suffix: u64 = end
                .parse()
                .map_err(|_| invalid(format!("invalid suffix `{ra}`")))?;
            if suffix == 0 {
                return Err(invalid("zero-length suffix range"));
            }
            let suffix = suffix.min(size);
            ranges.push(ByteRange::new(size - suffix, suffix));
            continue;
        }

        let start: u64 = start
            .parse()
            .map_err(|_| invalid(format!("invalid range start `{ra}`")))?;
        if start >= size {
            no_overlap = true;
            continue;
        }
        let length = if end.is_empty() {
            size - start
        } else {
            let end: u64 = end
                .parse()
                .map_err(|_| invalid(format!("invalid range end `{ra}`")))?;
            if start > end {
                return Err(invalid(format!("range start after end `{ra}`")));
            }
            end.min(size - 1) - start + 1
        };
        ranges.push(ByteRange::new(start, length));
    }

    if no_overlap && ranges.is_empty() {
        return Err(invalid("no range overlaps the content"));
    }
    Ok(ranges)
}

pub fn sum_ranges_size(ranges: &[ByteRange]) -> u64 {
    ranges.iter().map(|r| r.length).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte() {
        assert_eq!(
            parse_range("bytes=0-0", 100).unwrap(),
            vec![ByteRange::new(0, 1)]
        );
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(
            parse_range("bytes=-10", 100).unwrap(),
            vec![ByteRange::new(90, 10)]
        );
        assert_eq!(
            parse_range("bytes=-10", 5).unwrap(),
            vec![ByteRange::new(0, 5)]
        );
        assert!(parse_range("bytes=-0", 100).is_err());
        assert!(parse_range("bytes=--5", 100).is_err());
    }

    #[test]
    fn test_open_and_clamped_end() {
        assert_eq!(
            parse_range("bytes=90-", 100).unwrap(),
            vec![ByteRange::new(90, 10)]
        );
        assert_eq!(
            parse_range("bytes=90-500", 100).unwrap(),
            vec![ByteRange::new(90, 10)]
        );
    }

    #[test]
    fn test_multiple_ranges_with_blanks() {
        let ranges = parse_range("bytes=0-99, ,900-999,", 1000).unwrap();
        assert_eq!(
            ranges,
            vec![ByteRange::new(0, 100), ByteRange::new(900, 100)]
        );
        assert_eq!(sum_ranges_size(&ranges), 200);
    }

    #[test]
    fn test_oversized_sum() {
        let ranges = parse_range("bytes=0-4,0-4,0-4", 5).unwrap();
        assert_eq!(ranges.len(), 3);
        assert!(sum_ranges_size(&ranges) > 5);
    }

    #[test]
    fn test_out_of_bounds_ranges() {
        // Dropped while another range survives.
        assert_eq!(
            parse_range("bytes=0-9,200-300", 100).unwrap(),
            vec![ByteRange::new(0, 10)]
        );
        assert!(matches!(
            parse_range("bytes=200-300", 100),
            Err(FilerError::RangeUnsatisfiable(_))
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(parse_range("items=0-5", 100).is_err());
        assert!(parse_range("bytes=5", 100).is_err());
        assert!(parse_range("bytes=9-3", 100).is_err());
        assert!(parse_range("bytes=a-3", 100).is_err());
        assert!(parse_range("bytes=1-b", 100).is_err());
        assert!(parse_range("", 100).unwrap().is_empty());
        assert!(parse_range("bytes=", 100).unwrap().is_empty());
        assert!(parse_range("bytes= , ", 100).unwrap().is_empty());
    }
}
