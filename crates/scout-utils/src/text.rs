/// Truncate `s` to at most `max_chars` Unicode scalar values.
///
/// Character-based, not byte-based: slicing a `&str` at an arbitrary byte
/// offset panics on multi-byte boundaries, so all context-budget limits go
/// through here.
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
