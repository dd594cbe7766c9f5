//! Cheap structural sniffing of PDF documents.
//!
//! This is not a parser. A buffer passes when it starts with a PDF version
//! header, ends with an end-of-file marker and mentions a cross-reference
//! table. A crafted buffer carrying those three markers passes too.

const HEADER_PREFIX: &[u8] = b"%PDF-1.";
const HEADER_LEN: usize = 8;
const EOF_MARKER: &[u8] = b"%%EOF";
const XREF_MARKER: &[u8] = b"startxref";

/// Size of the trailing window searched for the end-of-file marker.
const TRAILER_WINDOW: usize = 1024;

/// Returns `true` if `data` looks like a PDF document.
///
/// # Examples
///
/// ```
/// use ecloud::is_valid_pdf;
///
/// let pdf = b"%PDF-1.7\ntrailer << /Root 1 0 R >>\nstartxref\n178\n%%EOF\n";
/// assert!(is_valid_pdf(pdf));
/// assert!(!is_valid_pdf(b"%PDF-1."));
/// ```
pub fn is_valid_pdf(data: &[u8]) -> bool {
    if data.len() < HEADER_LEN {
        return false;
    }

    has_version_header(&data[..HEADER_LEN])
        && has_eof_marker(&data[data.len().saturating_sub(TRAILER_WINDOW)..])
        && contains(data, XREF_MARKER)
}

/// `%PDF-1.` followed by a single digit.
fn has_version_header(head: &[u8]) -> bool {
    head.starts_with(HEADER_PREFIX) && head[HEADER_PREFIX.len()].is_ascii_digit()
}

/// `%%EOF` anchored at the end, allowing trailing whitespace.
fn has_eof_marker(tail: &[u8]) -> bool {
    let end = tail
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    tail[..end].ends_with(EOF_MARKER)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
