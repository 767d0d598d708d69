//! `Range` request header parsing.
//!
//! Only single `bytes` ranges are honoured. A header naming several ranges
//! is answered with the entire object instead of a `multipart/byteranges`
//! body, and a header that does not parse at all is ignored, matching what
//! lenient general-purpose parsers do. Only an unknown range unit is a hard
//! error.

/// A byte window into an object.
///
/// Half-open: `start` is the offset of the first byte and `end` is one past
/// the last. The wire format of `Range` and `Content-Range` is inclusive;
/// conversion happens at the parse and render boundaries only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes in the window.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// Outcome of evaluating a `Range` request header against an object length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No header was sent. Serve the entire object.
    Absent,
    /// The header was sent but is ignored: several ranges, or a spec that
    /// does not parse. Serve the entire object.
    Full,
    /// A single satisfiable window.
    Range(ByteRange),
    /// A syntactically valid window lying outside the object.
    Unsatisfiable,
    /// The range unit is not `bytes`.
    Malformed,
}

impl RangeRequest {
    /// Parses a raw `Range` header against the object's total length.
    pub fn parse(header: Option<&str>, length: u64) -> RangeRequest {
        let Some(header) = header else {
            return RangeRequest::Absent;
        };

        let Some((unit, spec)) = header.trim().split_once('=') else {
            return RangeRequest::Full;
        };

        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return RangeRequest::Malformed;
        }

        let spec = spec.trim();
        if spec.contains(',') {
            return RangeRequest::Full;
        }

        let range = if let Some(suffix) = spec.strip_prefix('-') {
            // suffix form: the final N bytes of the object
            let Ok(count) = suffix.parse::<u64>() else {
                return RangeRequest::Full;
            };
            if count == 0 {
                return RangeRequest::Unsatisfiable;
            }
            ByteRange {
                start: length.saturating_sub(count),
                end: length,
            }
        } else if let Some(start) = spec.strip_suffix('-') {
            let Ok(start) = start.parse::<u64>() else {
                return RangeRequest::Full;
            };
            ByteRange { start, end: length }
        } else {
            let Some((start, end)) = spec.split_once('-') else {
                return RangeRequest::Full;
            };
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return RangeRequest::Full;
            };
            if start > end {
                return RangeRequest::Full;
            }
            // the wire carries an inclusive end position; an end at the
            // u64 limit lies past any object
            let Some(end) = end.checked_add(1) else {
                return RangeRequest::Unsatisfiable;
            };
            if end > length {
                return RangeRequest::Unsatisfiable;
            }
            ByteRange { start, end }
        };

        if range.start >= range.end {
            return RangeRequest::Unsatisfiable;
        }

        RangeRequest::Range(range)
    }
}
