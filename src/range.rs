//! `Range` header parsing.
//!
//! Only the single-range form `bytes=<start>-[<end>]` is accepted. Suffix
//! ranges (`bytes=-500`) and multiple ranges (`bytes=0-1,5-6`) are rejected
//! as malformed rather than partially honoured.

use crate::ByteRange;

const BYTES_UNIT: &str = "bytes=";

/// Why a `Range` header could not be turned into a [`ByteRange`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// The header does not have the shape `bytes=<start>-[<end>]`.
    #[error("malformed range header: {0:?}")]
    Malformed(String),

    /// The header is well formed but starts past the end of the asset, or
    /// its start lies after its end.
    #[error("range not satisfiable for asset of {size} bytes")]
    Unsatisfiable { size: u64 },
}

/// Parses an optional `Range` header against an asset of `size` bytes.
///
/// `Ok(None)` means no header was sent and the whole asset should be served
/// with `200 OK`. This is distinct from `bytes=0-`, which yields a window
/// covering the whole asset and is served as `206 Partial Content`.
///
/// An `end` past the last byte is clamped to `size - 1`.
pub fn parse(header: Option<&str>, size: u64) -> Result<Option<ByteRange>, RangeError> {
    let Some(header) = header else {
        return Ok(None);
    };

    let malformed = || RangeError::Malformed(header.to_string());

    let spec = header
        .trim()
        .strip_prefix(BYTES_UNIT)
        .ok_or_else(malformed)?;

    if spec.contains(',') {
        return Err(malformed());
    }

    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    let start = parse_position(start).ok_or_else(malformed)?;
    let end = match end {
        "" => None,
        end => Some(parse_position(end).ok_or_else(malformed)?),
    };

    if start >= size {
        return Err(RangeError::Unsatisfiable { size });
    }

    // start < size, so size - 1 cannot underflow
    let last = size - 1;
    let end = end.map_or(last, |end| end.min(last));

    ByteRange::new(start, end)
        .map(Some)
        .ok_or(RangeError::Unsatisfiable { size })
}

/// Strict decimal position: ASCII digits only, no sign, must fit in a `u64`.
fn parse_position(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{parse, RangeError};
    use crate::ByteRange;

    fn window(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange { start, end })
    }

    #[test]
    fn test_absent_header_is_no_range() {
        assert_eq!(Ok(None), parse(None, 1000));
        assert_eq!(Ok(None), parse(None, 0));
    }

    #[test]
    fn test_parse_range_header() {
        let tests = [
            ("bytes=100-199", 1000, Ok(window(100, 199))),
            ("bytes=900-", 1000, Ok(window(900, 999))),
            ("bytes=0-", 1000, Ok(window(0, 999))),
            ("bytes=0-0", 1000, Ok(window(0, 0))),
            ("bytes=999-999", 1000, Ok(window(999, 999))),
            ("bytes=30-99", 54, Ok(window(30, 53))),
            ("bytes=0-18446744073709551615", 54, Ok(window(0, 53))),
            (" bytes=10-20 ", 54, Ok(window(10, 20))),
            ("bytes=1000-1005", 1000, Err(RangeError::Unsatisfiable { size: 1000 })),
            ("bytes=1000-", 1000, Err(RangeError::Unsatisfiable { size: 1000 })),
            ("bytes=30-29", 54, Err(RangeError::Unsatisfiable { size: 54 })),
            ("bytes=0-", 0, Err(RangeError::Unsatisfiable { size: 0 })),
        ];

        for (i, (header, size, expected)) in tests.iter().enumerate() {
            let result = parse(Some(*header), *size);
            assert_eq!(*expected, result, "range header #{i}: {header:?}");
        }
    }

    #[test]
    fn test_malformed_headers() {
        let tests = [
            "",
            "bytes=",
            "bytes=-",
            "bytes=abc-def",
            "bytes=10",
            "bytes=-500",
            "bytes=+5-10",
            "bytes=5-+10",
            "bytes=1-2-3",
            "bytes= 1-2",
            "bytes=0-100,200-300",
            "bytes=0-4,-1",
            "bleets=100-324",
            "items=0-10",
            "Bytes=0-10",
            "bytes=18446744073709551616-",
        ];

        for header in tests {
            assert_matches!(
                parse(Some(header), 1000),
                Err(RangeError::Malformed(h)) if h == header,
                "{header:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_every_window_of_small_asset() {
        let size = 8;
        for start in 0..size {
            for end in start..size {
                let header = format!("bytes={start}-{end}");
                let range = parse(Some(header.as_str()), size).unwrap().unwrap();
                assert_eq!(end - start + 1, range.len());
            }
        }
    }
}
