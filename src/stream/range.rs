// Byte-range resolution — turns a Range header into a concrete window.

use crate::error::StreamError;

/// A resolved byte window. `end` is inclusive, HTTP style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    /// Window length in bytes (`end` is inclusive, so never zero).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// No (usable) range header — serve the full body with status 200.
    Whole,
    /// A satisfiable byte range — serve 206 with Content-Range.
    Window(Window),
}

#[derive(Debug, PartialEq, Eq)]
enum ParsedRange {
    StartEnd { start: u64, end_inclusive: Option<u64> },
    Suffix { len: u64 },
}

/// Parse a Range header value.
/// Supports:
/// - bytes=start-end
/// - bytes=start-
/// - bytes=-suffix_len
///
/// Only the first range of a multi-range header is honored.
fn parse_range_header(value: &str) -> Option<ParsedRange> {
    let value = value.trim();
    let rest = value.strip_prefix("bytes=")?;
    let first = rest.split(',').next()?.trim();
    let mut parts = first.splitn(2, '-');
    let start_str = parts.next()?.trim();
    let end_str = parts.next()?.trim();

    if start_str.is_empty() {
        let len: u64 = end_str.parse().ok()?;
        if len == 0 {
            return None;
        }
        Some(ParsedRange::Suffix { len })
    } else {
        let start: u64 = start_str.parse().ok()?;
        let end_inclusive = if end_str.is_empty() {
            None
        } else {
            Some(end_str.parse::<u64>().ok()?)
        };
        Some(ParsedRange::StartEnd { start, end_inclusive })
    }
}

/// Resolve a Range request header against a known total length.
///
/// Absent or malformed headers resolve to `Whole`; a present, well-formed
/// but unsatisfiable range fails with `UnsatisfiableRange` carrying the
/// total so the caller can emit `Content-Range: bytes */{total}`.
pub fn resolve(range_header: Option<&str>, total: u64) -> Result<Resolved, StreamError> {
    let parsed = match range_header.and_then(parse_range_header) {
        Some(p) => p,
        None => return Ok(Resolved::Whole),
    };

    match parsed {
        ParsedRange::StartEnd { start, end_inclusive } => {
            let end = end_inclusive.unwrap_or_else(|| total.saturating_sub(1));
            if start >= total || start > end {
                return Err(StreamError::UnsatisfiableRange { total });
            }
            let end = end.min(total - 1);
            Ok(Resolved::Window(Window { start, end }))
        }
        ParsedRange::Suffix { len } => {
            if total == 0 {
                return Err(StreamError::UnsatisfiableRange { total });
            }
            let start = total.saturating_sub(len);
            Ok(Resolved::Window(Window { start, end: total - 1 }))
        }
    }
}
