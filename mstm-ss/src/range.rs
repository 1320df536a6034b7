//! `Range` header resolution
//!
//! Interprets an HTTP `Range` request header against the known size of a
//! resource. Only a single absolute range is supported:
//!
//! - `bytes=<start>-<end>`
//! - `bytes=<start>-` (open-ended, runs to the last byte)
//!
//! Suffix ranges (`bytes=-500`) and multi-range requests are rejected. An
//! `end` beyond the resource is clamped to the last byte.
//!
//! Pure functions only: no I/O.

use axum::http::StatusCode;
use thiserror::Error;

/// Inclusive byte interval `[start, end]` within a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range covering an entire resource of `size` bytes (`size` must be > 0)
    pub fn full(size: u64) -> Self {
        debug_assert!(size > 0);
        Self {
            start: 0,
            end: size - 1,
        }
    }

    /// Number of bytes in the range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A `ByteRange` always holds at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeResolution {
    /// No (or empty) `Range` header: deliver everything with 200
    FullExtent { size: u64 },

    /// Validated sub-interval: deliver with 206
    Partial { range: ByteRange, size: u64 },
}

impl RangeResolution {
    /// Response status for this resolution
    pub fn status(&self) -> StatusCode {
        match self {
            RangeResolution::FullExtent { .. } => StatusCode::OK,
            RangeResolution::Partial { .. } => StatusCode::PARTIAL_CONTENT,
        }
    }

    /// `Content-Length` of the response body
    pub fn content_length(&self) -> u64 {
        match self {
            RangeResolution::FullExtent { size } => *size,
            RangeResolution::Partial { range, .. } => range.len(),
        }
    }

    /// `Content-Range` header value, only for partial responses
    pub fn content_range(&self) -> Option<String> {
        match self {
            RangeResolution::FullExtent { .. } => None,
            RangeResolution::Partial { range, size } => {
                Some(format!("bytes {}-{}/{}", range.start, range.end, size))
            }
        }
    }

    /// Bytes to pull from the source, `None` for an empty full-extent body
    pub fn delivery_range(&self) -> Option<ByteRange> {
        match self {
            RangeResolution::FullExtent { size: 0 } => None,
            RangeResolution::FullExtent { size } => Some(ByteRange::full(*size)),
            RangeResolution::Partial { range, .. } => Some(*range),
        }
    }
}

/// Why a `Range` header was rejected (416)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("unsupported range unit in {0:?}")]
    UnsupportedUnit(String),

    #[error("multiple ranges are not supported")]
    MultipleRanges,

    #[error("suffix ranges are not supported")]
    SuffixRange,

    #[error("malformed range {0:?}")]
    Malformed(String),

    #[error("range start {start} is after end {end}")]
    Inverted { start: u64, end: u64 },

    #[error("range start {start} is beyond resource size {size}")]
    StartBeyondSize { start: u64, size: u64 },
}

/// Resolve an optional `Range` header against a resource of `size` bytes
///
/// # Examples
///
/// ```
/// use mstm_ss::range::{resolve, ByteRange, RangeResolution};
///
/// let resolved = resolve(Some("bytes=900-"), 1000).unwrap();
/// assert_eq!(
///     resolved,
///     RangeResolution::Partial { range: ByteRange { start: 900, end: 999 }, size: 1000 }
/// );
/// assert_eq!(resolved.content_range().as_deref(), Some("bytes 900-999/1000"));
/// ```
pub fn resolve(range_header: Option<&str>, size: u64) -> Result<RangeResolution, RangeError> {
    let header = match range_header.map(str::trim) {
        None | Some("") => return Ok(RangeResolution::FullExtent { size }),
        Some(header) => header,
    };

    // Range units are case-insensitive
    let range_set = header
        .split_once('=')
        .filter(|(unit, _)| unit.trim().eq_ignore_ascii_case("bytes"))
        .map(|(_, set)| set.trim())
        .ok_or_else(|| RangeError::UnsupportedUnit(header.to_string()))?;

    if range_set.contains(',') {
        return Err(RangeError::MultipleRanges);
    }

    let (start_str, end_str) = range_set
        .split_once('-')
        .ok_or_else(|| RangeError::Malformed(range_set.to_string()))?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        return Err(RangeError::SuffixRange);
    }

    let start = parse_offset(start_str, range_set)?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(parse_offset(end_str, range_set)?)
    };

    if let Some(end) = end {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
    }

    if start >= size {
        return Err(RangeError::StartBeyondSize { start, size });
    }

    // Tolerant clamping: open-ended or oversized ends stop at the last byte
    let last = size - 1;
    let end = end.map_or(last, |end| end.min(last));

    Ok(RangeResolution::Partial {
        range: ByteRange { start, end },
        size,
    })
}

fn parse_offset(digits: &str, range_set: &str) -> Result<u64, RangeError> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed(range_set.to_string()));
    }
    digits
        .parse::<u64>()
        .map_err(|_| RangeError::Malformed(range_set.to_string()))
}
