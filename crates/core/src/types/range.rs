//! Single byte-range parsing for `Range: bytes=...` request headers.
//!
//! Only the first range of a multi-range header is honored.

use thiserror::Error;

/// An inclusive byte range within a resource of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive end offset.
    pub end: u64,
}

/// Errors produced while resolving a `Range` header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The header is not a `bytes=` range this responder understands.
    #[error("malformed range header: {0}")]
    Malformed(String),

    /// The range lies outside the resource.
    #[error("range not satisfiable for {total} bytes")]
    Unsatisfiable { total: u64 },
}

impl ByteRange {
    /// Parse a `Range` header value against a resource of `total` bytes.
    ///
    /// Accepts `bytes=<start>-<end>`, `bytes=<start>-` (to the last byte) and
    /// the suffix form `bytes=-<count>`. An end past the resource is clamped.
    ///
    /// # Errors
    ///
    /// Returns `RangeError::Malformed` if the header cannot be parsed and
    /// `RangeError::Unsatisfiable` if it selects no byte of the resource.
    pub fn parse(header: &str, total: u64) -> Result<Self, RangeError> {
        let malformed = || RangeError::Malformed(header.to_string());

        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(malformed)?;
        let first = spec.split(',').next().unwrap_or_default().trim();
        let (start, end) = first.split_once('-').ok_or_else(malformed)?;
        let (start, end) = (start.trim(), end.trim());

        if total == 0 {
            return Err(RangeError::Unsatisfiable { total });
        }
        let last = total - 1;

        if start.is_empty() {
            let count: u64 = end.parse().map_err(|_| malformed())?;
            if count == 0 {
                return Err(RangeError::Unsatisfiable { total });
            }
            return Ok(Self {
                start: total.saturating_sub(count),
                end: last,
            });
        }

        let start: u64 = start.parse().map_err(|_| malformed())?;
        let end = if end.is_empty() {
            last
        } else {
            end.parse::<u64>().map_err(|_| malformed())?.min(last)
        };

        if start > end {
            return Err(RangeError::Unsatisfiable { total });
        }

        Ok(Self { start, end })
    }

    /// Number of bytes selected.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A parsed range always selects at least one byte.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` header value for this range.
    #[must_use]
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// `Content-Range` header value for an unsatisfiable request.
#[must_use]
pub fn unsatisfied_content_range(total: u64) -> String {
    format!("bytes */{total}")
}
