use regex::Regex;
use std::sync::LazyLock;
use unicode_width::UnicodeWidthChar;

/// CSI / OSC / two-byte escape sequences as emitted by highlighters and styling crates.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\-_])")
        .expect("valid ANSI regex")
});

pub fn strip_ansi(input: &str) -> String {
    ANSI_ESCAPE.replace_all(input, "").into_owned()
}

/// Calculate the display width of a string, ignoring ANSI codes.
/// Wide code points count as 2 columns, combining and zero-width code points as 0.
pub fn display_width(input: &str) -> usize {
    strip_ansi(input)
        .chars()
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum()
}

/// Cut `input` (plain text) so that it fits in `max` columns, marking the cut with `…`.
pub fn truncate_to_width(input: &str, max: usize) -> String {
    if display_width(input) <= max {
        return input.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in input.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w > max - 1 {
            break;
        }
        width += w;
        out.push(ch);
    }
    out.push('…');
    out
}

/// Underline the first occurrence of `needle` in the visible text of `line`.
///
/// Escape sequences already present in `line` are copied through untouched and
/// never split. Offsets are matched against the stripped text.
pub fn underline_match(line: &str, needle: &str) -> String {
    if needle.is_empty() {
        return line.to_string();
    }
    let plain = strip_ansi(line);
    let Some(start) = plain.find(needle) else {
        return line.to_string();
    };
    let end = start + needle.len();

    let mut out = String::with_capacity(line.len() + 16);
    let mut visible = 0;
    let mut rest = line;
    let mut underlining = false;
    while !rest.is_empty() {
        if let Some(m) = ANSI_ESCAPE.find(rest)
            && m.start() == 0
        {
            out.push_str(m.as_str());
            // the inner code may have reset attributes
            if underlining {
                out.push_str("\x1b[4m");
            }
            rest = &rest[m.end()..];
            continue;
        }
        let Some(ch) = rest.chars().next() else {
            break;
        };
        if visible == start && !underlining {
            out.push_str("\x1b[4m");
            underlining = true;
        }
        if visible == end && underlining {
            out.push_str("\x1b[24m");
            underlining = false;
        }
        out.push(ch);
        visible += ch.len_utf8();
        rest = &rest[ch.len_utf8()..];
    }
    if underlining {
        out.push_str("\x1b[24m");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_width_wide_and_combining() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("あい"), 4);
        assert_eq!(display_width("e\u{301}"), 1);
        assert_eq!(display_width("\u{200b}"), 0);
    }

    #[test]
    fn test_display_width_ignores_escapes() {
        assert_eq!(display_width("\x1b[32m'hi'\x1b[39m"), 4);
        assert_eq!(display_width("\x1b[1;34m42\x1b[0m"), 2);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_to_width("hello", 10), "hello");
        assert_eq!(truncate_to_width("hello world", 6), "hello…");
        assert_eq!(display_width(&truncate_to_width("ああああ", 5)), 5);
    }

    #[test]
    fn test_underline_plain() {
        assert_eq!(
            underline_match("let abc = 1", "abc"),
            "let \x1b[4mabc\x1b[24m = 1"
        );
    }

    #[test]
    fn test_underline_preserves_existing_codes() {
        let line = "\x1b[32m'abc'\x1b[39m";
        let out = underline_match(line, "bc");
        assert_eq!(strip_ansi(&out), "'abc'");
        assert!(out.contains("\x1b[32m"));
        assert!(out.contains("\x1b[39m"));
        assert!(out.contains("\x1b[4m"));
    }

    #[test]
    fn test_underline_missing_needle() {
        assert_eq!(underline_match("abc", "zz"), "abc");
        assert_eq!(underline_match("abc", ""), "abc");
    }

    #[test]
    fn test_underline_at_end() {
        assert_eq!(underline_match("abc", "bc"), "a\x1b[4mbc\x1b[24m");
    }
}
