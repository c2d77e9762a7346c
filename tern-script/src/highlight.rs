use crate::lexer::{Keyword, Lexer, TokenKind};
use crossterm::style::Stylize;
use tern_types::Highlighter;

const BUILTIN_GLOBALS: &[&str] = &[
    "Math",
    "JSON",
    "Object",
    "Array",
    "console",
    "String",
    "Number",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "NaN",
    "Infinity",
];

/// Token-class colouring. Text the lexer cannot make sense of (an unclosed
/// string, say) is passed through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptHighlighter;

impl ScriptHighlighter {
    fn paint(kind: &TokenKind, text: &str) -> String {
        match kind {
            TokenKind::Keyword(kw) if kw.is_literal() => text.dark_cyan().to_string(),
            TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const | Keyword::Typeof) => {
                text.dark_green().to_string()
            }
            TokenKind::Number(_) => text.dark_blue().to_string(),
            TokenKind::Str(_) | TokenKind::Template(_) => text.dark_green().to_string(),
            TokenKind::Comment => text.dark_grey().to_string(),
            TokenKind::Ident(name) if BUILTIN_GLOBALS.contains(&name.as_str()) => {
                text.dark_cyan().to_string()
            }
            _ => text.to_string(),
        }
    }
}

impl Highlighter for ScriptHighlighter {
    fn highlight(&self, text: &str) -> String {
        let (tokens, _) = Lexer::tokenize_partial(text);
        let mut out = String::with_capacity(text.len() * 2);
        let mut last = 0;
        for token in tokens.iter().filter(|t| t.kind != TokenKind::Eof) {
            out.push_str(&text[last..token.start]);
            out.push_str(&Self::paint(&token.kind, &text[token.start..token.end]));
            last = token.end;
        }
        out.push_str(&text[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(ch) = chars.next() {
            if ch == '\x1b' {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            } else {
                out.push(ch);
            }
        }
        out
    }

    #[test]
    fn test_highlight_only_inserts_escapes() {
        for src in [
            "let a = Math.max(1, 2) // done",
            "'unterminated + 1",
            "`tpl ${x}` + null",
            "  spaced\tout  ",
        ] {
            assert_eq!(strip(&ScriptHighlighter.highlight(src)), src);
        }
    }

    #[test]
    fn test_numbers_are_coloured() {
        let out = ScriptHighlighter.highlight("42");
        assert!(out.contains('\x1b'));
        assert!(out.contains("42"));
    }

    #[test]
    fn test_plain_identifiers_untouched() {
        assert_eq!(ScriptHighlighter.highlight("foo + bar"), "foo + bar");
    }
}
