use regex::Regex;
use std::sync::LazyLock;

static WORD_LEFT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[^\w\s]+|\w+|)\s*$").expect("valid word regex"));
static WORD_RIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s+|\W+|\w+)\s*").expect("valid word regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixKind {
    /// Text that can be accepted into the buffer.
    Completion,
    /// Annotation such as the remaining call arguments.
    Hint,
    /// Eager evaluation result.
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffix {
    pub text: String,
    pub kind: SuffixKind,
}

/// The line being edited.
///
/// `cursor` is a byte offset that always sits on a char boundary. Every
/// operation that changes `text` or `cursor` drops the suffix and bumps the
/// generation; operations that turn out to be no-ops change nothing.
#[derive(Debug, Default)]
pub struct EditBuffer {
    text: String,
    cursor: usize,
    prefix: String,
    suffix: Option<Suffix>,
    accumulator: String,
    generation: u64,
}

impl EditBuffer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> Option<&Suffix> {
        self.suffix.as_ref()
    }

    pub fn set_suffix(&mut self, suffix: Option<Suffix>) {
        self.suffix = suffix;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn cursor_at_end(&self) -> bool {
        self.cursor == self.text.len()
    }

    pub fn before_cursor(&self) -> &str {
        &self.text[..self.cursor]
    }

    /// Lines committed so far for a statement that spans several lines.
    pub fn accumulator(&self) -> &str {
        &self.accumulator
    }

    /// The whole statement: committed lines followed by the current text.
    pub fn statement(&self) -> String {
        format!("{}{}", self.accumulator, self.text)
    }

    fn touch(&mut self) {
        self.suffix = None;
        self.generation += 1;
    }

    pub fn insert_text(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.text.insert_str(self.cursor, s);
        self.cursor += s.len();
        self.touch();
    }

    pub fn delete_backward(&mut self) -> bool {
        let Some(ch) = self.text[..self.cursor].chars().next_back() else {
            return false;
        };
        self.cursor -= ch.len_utf8();
        self.text.remove(self.cursor);
        self.touch();
        true
    }

    pub fn delete_forward(&mut self) -> bool {
        if self.cursor_at_end() {
            return false;
        }
        self.text.remove(self.cursor);
        self.touch();
        true
    }

    /// Move by `delta` characters, clamped to the buffer.
    pub fn move_cursor(&mut self, delta: isize) -> bool {
        let mut target = self.cursor;
        if delta < 0 {
            for ch in self.text[..self.cursor].chars().rev().take(delta.unsigned_abs()) {
                target -= ch.len_utf8();
            }
        } else {
            for ch in self.text[self.cursor..].chars().take(delta as usize) {
                target += ch.len_utf8();
            }
        }
        self.set_cursor(target)
    }

    pub fn move_to_start(&mut self) -> bool {
        self.set_cursor(0)
    }

    pub fn move_to_end(&mut self) -> bool {
        self.set_cursor(self.text.len())
    }

    fn set_cursor(&mut self, cursor: usize) -> bool {
        if cursor == self.cursor {
            return false;
        }
        self.cursor = cursor;
        self.touch();
        true
    }

    fn word_left_target(&self) -> usize {
        WORD_LEFT
            .find(self.before_cursor())
            .map_or(self.cursor, |m| m.start())
    }

    fn word_right_target(&self) -> usize {
        WORD_RIGHT
            .find(&self.text[self.cursor..])
            .map_or(self.cursor, |m| self.cursor + m.end())
    }

    pub fn word_left(&mut self) -> bool {
        self.set_cursor(self.word_left_target())
    }

    pub fn word_right(&mut self) -> bool {
        self.set_cursor(self.word_right_target())
    }

    pub fn delete_word_backward(&mut self) -> bool {
        let start = self.word_left_target();
        if start == self.cursor {
            return false;
        }
        self.text.replace_range(start..self.cursor, "");
        self.cursor = start;
        self.touch();
        true
    }

    pub fn clear_to_cursor(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.text.replace_range(..self.cursor, "");
        self.cursor = 0;
        self.touch();
        true
    }

    pub fn clear_from_cursor(&mut self) -> bool {
        if self.cursor_at_end() {
            return false;
        }
        self.text.truncate(self.cursor);
        self.touch();
        true
    }

    /// Replace the whole text. `cursor` is clamped and moved back to a char boundary.
    pub fn replace(&mut self, text: impl Into<String>, cursor: usize) {
        self.text = text.into();
        let mut cursor = cursor.min(self.text.len());
        while !self.text.is_char_boundary(cursor) {
            cursor -= 1;
        }
        self.cursor = cursor;
        self.touch();
    }

    pub fn clear(&mut self) {
        self.replace(String::new(), 0);
    }

    /// Move a completion suffix into the text. Only allowed with the cursor at the end.
    pub fn accept_suffix(&mut self) -> bool {
        match self.suffix.take() {
            Some(Suffix {
                text,
                kind: SuffixKind::Completion,
            }) if self.cursor_at_end() => {
                self.insert_text(&text);
                true
            }
            other => {
                self.suffix = other;
                false
            }
        }
    }

    /// Commit the current text as one line of an unfinished statement.
    pub fn push_continuation(&mut self, prefix: impl Into<String>) {
        self.accumulator.push_str(&self.text);
        self.accumulator.push('\n');
        self.prefix = prefix.into();
        self.clear();
    }

    /// Forget the current statement entirely and start over with `prefix`.
    pub fn reset(&mut self, prefix: impl Into<String>) {
        self.accumulator.clear();
        self.prefix = prefix.into();
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(text: &str, cursor: usize) -> EditBuffer {
        let mut buf = EditBuffer::new("> ");
        buf.replace(text, cursor);
        buf
    }

    #[test]
    fn test_typing_concatenates() {
        let mut buf = EditBuffer::new("> ");
        for piece in ["1", " ", "+", " 1", "あ"] {
            buf.insert_text(piece);
        }
        assert_eq!(buf.text(), "1 + 1あ");
        assert!(buf.cursor_at_end());
    }

    #[test]
    fn test_insert_at_every_position() {
        let original = "abcd";
        for k in 0..=original.len() {
            let mut buf = buffer(original, k);
            buf.insert_text("x");
            let text = buf.text();
            assert_eq!(text.len(), original.len() + 1);
            assert_eq!(&text[..k], &original[..k]);
            assert_eq!(&text[k + 1..], &original[k..]);
            assert_eq!(buf.cursor(), k + 1);
        }
    }

    #[test]
    fn test_delete_noops_at_bounds() {
        let mut buf = buffer("abc", 0);
        let generation = buf.generation();
        assert!(!buf.delete_backward());
        assert_eq!(buf.text(), "abc");
        buf.move_to_end();
        let generation_at_end = buf.generation();
        assert!(!buf.delete_forward());
        assert_eq!(buf.text(), "abc");
        assert_eq!(buf.generation(), generation_at_end);
        assert!(generation_at_end > generation);
    }

    #[test]
    fn test_delete_multibyte() {
        let mut buf = buffer("aあb", 4);
        assert!(buf.delete_backward());
        assert_eq!(buf.text(), "ab");
        assert_eq!(buf.cursor(), 1);
        assert!(buf.delete_forward());
        assert_eq!(buf.text(), "a");
    }

    #[test]
    fn test_move_cursor_clamps() {
        let mut buf = buffer("héllo", 0);
        buf.move_cursor(2);
        assert_eq!(buf.before_cursor(), "hé");
        buf.move_cursor(-100);
        assert_eq!(buf.cursor(), 0);
        buf.move_cursor(isize::MAX);
        assert!(buf.cursor_at_end());
    }

    #[test]
    fn test_word_jumps() {
        let mut buf = buffer("foo.bar(baz)  ", 14);
        buf.word_left();
        assert_eq!(buf.before_cursor(), "foo.bar(baz");
        buf.word_left();
        assert_eq!(buf.before_cursor(), "foo.bar(");
        buf.word_left();
        assert_eq!(buf.before_cursor(), "foo.bar");
        buf.move_to_start();
        buf.word_right();
        assert_eq!(buf.before_cursor(), "foo");
        buf.word_right();
        assert_eq!(buf.before_cursor(), "foo.");
    }

    #[test]
    fn test_word_jump_idempotent_at_bounds() {
        let mut buf = buffer("let a = 1", 0);
        let generation = buf.generation();
        assert!(!buf.word_left());
        assert!(!buf.word_left());
        assert!(!buf.delete_word_backward());
        assert_eq!(buf.generation(), generation);
        buf.move_to_end();
        assert!(!buf.word_right());
        assert!(!buf.word_right());
    }

    #[test]
    fn test_delete_word_backward() {
        let mut buf = buffer("let answer = 42", 15);
        buf.delete_word_backward();
        assert_eq!(buf.text(), "let answer = ");
        buf.delete_word_backward();
        assert_eq!(buf.text(), "let answer ");
    }

    #[test]
    fn test_clear_to_and_from_cursor() {
        let mut buf = buffer("abcdef", 3);
        buf.clear_from_cursor();
        assert_eq!(buf.text(), "abc");
        buf.move_cursor(-1);
        buf.clear_to_cursor();
        assert_eq!(buf.text(), "c");
        assert_eq!(buf.cursor(), 0);
    }

    #[test]
    fn test_mutation_clears_suffix_and_bumps_generation() {
        let mut buf = buffer("Math.ma", 7);
        buf.set_suffix(Some(Suffix {
            text: "x".to_string(),
            kind: SuffixKind::Completion,
        }));
        let generation = buf.generation();
        buf.insert_text("x");
        assert!(buf.suffix().is_none());
        assert_eq!(buf.generation(), generation + 1);
    }

    #[test]
    fn test_accept_suffix_only_for_completion() {
        let mut buf = buffer("Math.ma", 7);
        buf.set_suffix(Some(Suffix {
            text: "x".to_string(),
            kind: SuffixKind::Completion,
        }));
        assert!(buf.accept_suffix());
        assert_eq!(buf.text(), "Math.max");

        buf.set_suffix(Some(Suffix {
            text: "...values".to_string(),
            kind: SuffixKind::Hint,
        }));
        assert!(!buf.accept_suffix());
        assert_eq!(buf.text(), "Math.max");
        assert!(buf.suffix().is_some());
    }

    #[test]
    fn test_continuation_accumulates() {
        let mut buf = buffer("[1,", 3);
        buf.push_continuation("... ");
        buf.insert_text("2]");
        assert_eq!(buf.statement(), "[1,\n2]");
        assert_eq!(buf.prefix(), "... ");
        buf.reset("> ");
        assert_eq!(buf.statement(), "");
        assert_eq!(buf.prefix(), "> ");
    }
}
