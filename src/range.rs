//! Byte range negotiation shared by the cache store and the stream server

use thiserror::Error;

/// A single range as written by the client in `Range: bytes=...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-` or `bytes=start-end`, end inclusive
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`, the last n bytes
    Suffix(u64),
}

/// Resolved, inclusive span inside a resource of known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("range not satisfiable for {total} bytes")]
pub struct Unsatisfiable {
    pub total: u64,
}

/// Parses a `Range` header value.
///
/// Returns `None` for anything we do not serve as a range: other units,
/// multiple ranges, garbage, or `end < start`. Callers then answer with the
/// full resource, as a server ignoring the header would.
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let spec = value.trim().strip_prefix("bytes=")?.trim();
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let len = end.parse::<u64>().ok()?;
        return Some(RangeSpec::Suffix(len));
    }

    let start = start.parse::<u64>().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        let end = end.parse::<u64>().ok()?;
        if end < start {
            return None;
        }
        Some(end)
    };
    Some(RangeSpec::From { start, end })
}

impl RangeSpec {
    pub fn resolve(&self, total: u64) -> Result<ByteSpan, Unsatisfiable> {
        if total == 0 {
            return Err(Unsatisfiable { total });
        }
        let last = total - 1;
        match *self {
            RangeSpec::From { start, end } => {
                if start >= total {
                    return Err(Unsatisfiable { total });
                }
                let end = end.map_or(last, |end| end.min(last));
                Ok(ByteSpan { start, end })
            }
            RangeSpec::Suffix(0) => Err(Unsatisfiable { total }),
            RangeSpec::Suffix(len) => Ok(ByteSpan {
                start: total.saturating_sub(len),
                end: last,
            }),
        }
    }
}

impl ByteSpan {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// value of the `Content-Range` header for this span
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}
