//! Locating `${...}` markers inside configuration strings.

use crate::errors::ExpressionError;

/// Opening token of an expression marker.
pub const MARKER_OPEN: &str = "${";

/// A piece of a string split around its markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text copied as-is.
    Text(&'a str),
    /// The source between `${` and its matching `}`.
    Expression(&'a str),
}

/// Cheap check for the presence of any marker.
#[must_use]
pub fn has_markers(raw: &str) -> bool {
    raw.contains(MARKER_OPEN)
}

/// Splits `raw` into literal text and marker bodies.
///
/// Braces inside a marker nest, and quoted literals inside a marker may
/// contain braces, so `${#readJson('{"a":1}')}` is one marker.
pub fn split(raw: &str) -> Result<Vec<Segment<'_>>, ExpressionError> {
    let bytes = raw.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i..].starts_with(MARKER_OPEN.as_bytes()) {
            i += 1;
            continue;
        }
        if text_start < i {
            segments.push(Segment::Text(&raw[text_start..i]));
        }
        let body_start = i + MARKER_OPEN.len();
        let close = find_close(bytes, body_start)
            .ok_or_else(|| ExpressionError::syntax(raw, i, "unterminated expression marker"))?;
        segments.push(Segment::Expression(&raw[body_start..close]));
        i = close + 1;
        text_start = i;
    }

    if text_start < bytes.len() {
        segments.push(Segment::Text(&raw[text_start..]));
    }
    Ok(segments)
}

fn find_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut j = start;

    while j < bytes.len() {
        let b = bytes[j];
        if let Some(q) = quote {
            if b == b'\\' {
                j += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth == 0 => return Some(j),
                b'}' => depth -= 1,
                _ => {}
            }
        }
        j += 1;
    }
    None
}
