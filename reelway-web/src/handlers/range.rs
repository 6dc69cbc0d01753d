//! HTTP Range header parsing
//!
//! Single `bytes=` ranges per RFC 7233: `start-end`, `start-` and suffix
//! `-length`. Anything else is treated as absent so the client gets the
//! whole file instead of an error.

use axum::http::HeaderMap;
use axum::http::header::RANGE;
use reelway_core::session::ByteRange;

/// What a request asked for, resolved against the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// No usable Range header
    Full,
    /// Inclusive byte range inside the file
    Partial(ByteRange),
    /// Well-formed but outside the file
    Unsatisfiable,
}

/// Parses a Range header value against `total_size`.
///
/// Open ends resolve to the last byte and ends past the file are clamped.
/// Multi-range and malformed values fall back to [`RangeSpec::Full`].
///
/// # Examples
/// ```
/// use reelway_core::session::ByteRange;
/// use reelway_web::handlers::range::{RangeSpec, parse_range_header};
///
/// assert_eq!(
///     parse_range_header(Some("bytes=100-199"), 1000),
///     RangeSpec::Partial(ByteRange::new(100, 199))
/// );
/// assert_eq!(parse_range_header(Some("bytes=1000-"), 1000), RangeSpec::Unsatisfiable);
/// ```
pub fn parse_range_header(range: Option<&str>, total_size: u64) -> RangeSpec {
    let Some(range) = range else {
        return RangeSpec::Full;
    };
    let Some(range_spec) = range.trim().strip_prefix("bytes=") else {
        return RangeSpec::Full;
    };
    if range_spec.contains(',') {
        return RangeSpec::Full;
    }
    let Some((start_str, end_str)) = range_spec.split_once('-') else {
        return RangeSpec::Full;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    // bytes=-N is the last N bytes
    if start_str.is_empty() {
        return match end_str.parse::<u64>() {
            Ok(0) => RangeSpec::Unsatisfiable,
            Ok(_) if total_size == 0 => RangeSpec::Unsatisfiable,
            Ok(suffix) => RangeSpec::Partial(ByteRange::new(
                total_size.saturating_sub(suffix),
                total_size - 1,
            )),
            Err(_) => RangeSpec::Full,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeSpec::Full;
    };
    let end = if end_str.is_empty() {
        total_size.saturating_sub(1)
    } else {
        match end_str.parse::<u64>() {
            Ok(end) => end,
            Err(_) => return RangeSpec::Full,
        }
    };

    if start >= total_size || start > end {
        return RangeSpec::Unsatisfiable;
    }

    RangeSpec::Partial(ByteRange::new(start, end.min(total_size - 1)))
}

/// Extracts the Range header, ignoring values that are not valid UTF-8.
pub fn extract_range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(RANGE).and_then(|range| range.to_str().ok())
}
