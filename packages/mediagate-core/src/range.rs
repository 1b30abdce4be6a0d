//! HTTP `Range` header parsing for the download surface.

use crate::error::GatewayError;

/// One resolved, chunk-independent byte range: `[start, end]` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Parses a `Range: bytes=start-end` header against `file_size`.
///
/// A missing or empty header is treated as a request for the whole file.
/// Anything malformed, or out of `[0, file_size)`, is `BadRange`.
pub fn parse_range_header(
    range_header: Option<&str>,
    file_size: u64,
) -> Result<ByteRange, GatewayError> {
    let bad_range = || GatewayError::BadRange { file_size };

    let Some(header) = range_header.filter(|h| !h.is_empty()) else {
        return Ok(ByteRange {
            start: 0,
            end: file_size.saturating_sub(1),
        });
    };

    let value = header.strip_prefix("bytes=").unwrap_or(header);
    let (start_str, end_str) = value.split_once('-').ok_or_else(bad_range)?;

    let start: u64 = start_str.parse().map_err(|_| bad_range())?;
    let end: u64 = if end_str.is_empty() {
        file_size.saturating_sub(1)
    } else {
        end_str.parse().map_err(|_| bad_range())?
    };

    if end >= file_size || end < start {
        return Err(bad_range());
    }

    Ok(ByteRange { start, end })
}

/// Derived chunk-aligned parameters for fetching `range` out of a file made
/// of `chunk_size`-aligned parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub offset: u64,
    pub first_part_cut: u64,
    pub last_part_cut: u64,
    pub part_count: u64,
}

impl ChunkPlan {
    pub fn for_range(range: ByteRange, chunk_size: u64) -> Self {
        let offset = range.start - (range.start % chunk_size);
        let first_part_cut = range.start - offset;
        let last_part_cut = (range.end % chunk_size) + 1;
        let part_count = range.end.div_ceil(chunk_size) - (offset / chunk_size);
        Self {
            offset,
            first_part_cut,
            last_part_cut,
            part_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_SIZE: u64 = 3_670_016;
    const CHUNK_SIZE: u64 = 1024 * 1024;

    #[test]
    fn no_header_spans_whole_file() {
        let r = parse_range_header(None, FILE_SIZE).unwrap();
        assert_eq!(r, ByteRange { start: 0, end: FILE_SIZE - 1 });
    }

    #[test]
    fn mid_file_range_matches_reference_scenario() {
        let r = parse_range_header(Some("bytes=1048600-2097151"), FILE_SIZE).unwrap();
        assert_eq!(r.start, 1_048_600);
        assert_eq!(r.end, 2_097_151);

        let plan = ChunkPlan::for_range(r, CHUNK_SIZE);
        assert_eq!(plan.part_count, 2);
        assert_eq!(plan.first_part_cut, 24);
        assert_eq!(plan.last_part_cut, 1_048_576);
    }

    #[test]
    fn out_of_bounds_range_is_bad_range() {
        let err = parse_range_header(Some("bytes=5000000-6000000"), FILE_SIZE).unwrap_err();
        assert!(matches!(err, GatewayError::BadRange { file_size } if file_size == FILE_SIZE));
    }

    #[test]
    fn malformed_header_is_bad_range() {
        let err = parse_range_header(Some("not-a-range"), FILE_SIZE).unwrap_err();
        assert!(matches!(err, GatewayError::BadRange { .. }));
    }

    #[test]
    fn open_ended_range_is_equivalent_to_no_header_but_different_status() {
        let open = parse_range_header(Some("bytes=0-"), FILE_SIZE).unwrap();
        let none = parse_range_header(None, FILE_SIZE).unwrap();
        assert_eq!(open, none);
    }

    #[test]
    fn single_chunk_range_applies_both_cuts_to_same_part() {
        let r = ByteRange { start: 10, end: 20 };
        let plan = ChunkPlan::for_range(r, CHUNK_SIZE);
        assert_eq!(plan.part_count, 1);
        assert_eq!(plan.first_part_cut, 10);
        assert_eq!(plan.last_part_cut, 21);
    }

    #[test]
    fn last_byte_of_file_is_single_byte_response() {
        let r = parse_range_header(
            Some(&format!("bytes={0}-{0}", FILE_SIZE - 1)),
            FILE_SIZE,
        )
        .unwrap();
        assert_eq!(r.start, FILE_SIZE - 1);
        assert_eq!(r.end, FILE_SIZE - 1);
    }
}
