use std::borrow::Cow;

/// Escape text for Telegram's HTML parse mode.
///
/// Replaces `&`, `<`, `>` and `"`. Returns `Cow::Borrowed` when nothing needs
/// escaping, which is the common case for titles.
///
/// # Examples
///
/// ```
/// use feedrelay::util::escape_html;
///
/// assert_eq!(escape_html("plain"), "plain");
/// assert_eq!(escape_html("<b>&\"</b>"), "&lt;b&gt;&amp;&quot;&lt;/b&gt;");
/// ```
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.contains(|c| matches!(c, '&' | '<' | '>' | '"')) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape `s` and cut it so the escaped result is at most `max_chars` characters.
///
/// Cuts only between source characters, so an entity like `&amp;` is never split.
/// Appends `…` when anything was dropped.
pub fn escape_truncated(s: &str, max_chars: usize) -> String {
    let escaped = escape_html(s);
    if escaped.chars().count() <= max_chars {
        return escaped.into_owned();
    }

    let mut out = String::new();
    let mut used = 0;

    for (idx, c) in s.char_indices() {
        let piece: Cow<'_, str> = escape_html(&s[idx..idx + c.len_utf8()]);
        let width = piece.chars().count();
        // Reserve one char for the ellipsis
        if used + width + 1 > max_chars {
            out.push('…');
            return out;
        }
        out.push_str(&piece);
        used += width;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_borrowed_when_clean() {
        assert!(matches!(escape_html("Hello world"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_all_specials() {
        assert_eq!(escape_html("a<b>&c\"d"), "a&lt;b&gt;&amp;c&quot;d");
    }

    #[test]
    fn test_escape_keeps_unicode() {
        assert_eq!(escape_html("日本 & 中国"), "日本 &amp; 中国");
    }

    #[test]
    fn test_truncate_fits_untouched() {
        assert_eq!(escape_truncated("short", 10), "short");
    }

    #[test]
    fn test_truncate_never_splits_entities() {
        // "a&" escapes to 6 chars; with budget 4 only "a" fits next to the ellipsis
        assert_eq!(escape_truncated("a&b", 4), "a…");
        assert_eq!(escape_truncated("abcdef", 4), "abc…");
    }
}
