//! Utility functions for text excerpts, sizes and path-safe names

/// Marker prepended when an excerpt drops leading text
const ELLIPSIS: &str = "…";

/// Keep the last `max_chars` characters of `text`, trimmed.
///
/// User-visible errors always go through this so a huge tool log never
/// reaches the chat.
///
/// ```
/// use anime_relay::utils::tail_excerpt;
///
/// assert_eq!(tail_excerpt("short", 10), "short");
/// assert_eq!(tail_excerpt("abcdefgh", 3), "…fgh");
/// ```
pub fn tail_excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("{ELLIPSIS}{}", tail.trim_start())
}

/// Human-readable binary size ("49.0 MiB")
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Turn a user-supplied title into a single path segment.
///
/// Whitespace becomes `_`; path separators and control characters are dropped
/// so the result can never escape the folder it is joined onto.
pub fn safe_name(title: &str) -> String {
    let name: String = title
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            '/' | '\\' | ':' | '\0' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    match name.trim_matches('.') {
        "" => "untitled".to_string(),
        trimmed => trimmed.to_string(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_excerpt_keeps_the_end() {
        let log = format!("{}Episode 7 not found", "x".repeat(1000));
        let excerpt = tail_excerpt(&log, 20);
        assert!(excerpt.ends_with("Episode 7 not found"));
        assert!(excerpt.chars().count() <= 21);
    }

    #[test]
    fn tail_excerpt_is_char_boundary_safe() {
        let text = "ダウンロード失敗しました";
        let excerpt = tail_excerpt(text, 4);
        assert_eq!(excerpt, "…しました");
    }

    #[test]
    fn format_size_uses_binary_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(49 * 1024 * 1024), "49.0 MiB");
        assert_eq!(format_size(1536), "1.5 KiB");
    }

    #[test]
    fn safe_name_strips_separators() {
        assert_eq!(safe_name("One Piece"), "One_Piece");
        assert_eq!(safe_name("../../etc/passwd"), "etcpasswd");
        assert_eq!(safe_name("Re:Zero"), "ReZero");
        assert_eq!(safe_name("  "), "untitled");
        assert_eq!(safe_name(".."), "untitled");
    }
}
