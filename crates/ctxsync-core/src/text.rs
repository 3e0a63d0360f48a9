//! Text helpers.

/// Truncate `s` to at most `max_bytes` bytes without splitting a UTF-8 character.
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate and append an ellipsis marker when anything was cut.
#[must_use]
pub fn truncate_with_marker(s: &str, max_bytes: usize) -> String {
    let cut = truncate_str(s, max_bytes);
    if cut.len() == s.len() {
        s.to_string()
    } else {
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_untouched() {
        assert_eq!(truncate_str("abc", 10), "abc");
        assert_eq!(truncate_with_marker("abc", 3), "abc");
    }

    #[test]
    fn cuts_on_char_boundary() {
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_str("aé", 2), "a");
        assert_eq!(truncate_str("héllo", 3), "hé");
    }

    #[test]
    fn marker_appended_when_cut() {
        assert_eq!(truncate_with_marker("abcdef", 3), "abc...");
    }
}
