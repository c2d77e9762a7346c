//! Decide whether a failed parse could be fixed by typing more lines.
//!
//! A failure is recoverable when the parser ran off the end of the input, or
//! when the lexer was inside a token that may legally span lines: a template
//! literal, a block comment, or a string whose line ends in a backslash.

use crate::lexer::LexErrorKind;
use crate::parser::{ParseError, SyntaxErrorKind, parse_program};
use tern_types::SyntaxCheck;

pub fn is_recoverable(err: &ParseError) -> bool {
    match &err.kind {
        SyntaxErrorKind::Parse { at_eof, .. } => *at_eof,
        SyntaxErrorKind::Lex(lex) => match lex.kind {
            LexErrorKind::UnterminatedTemplate | LexErrorKind::UnterminatedComment => true,
            LexErrorKind::UnterminatedString { continued } => continued,
            LexErrorKind::InvalidNumber | LexErrorKind::UnexpectedChar(_) => false,
        },
    }
}

pub fn check(source: &str) -> SyntaxCheck {
    match parse_program(source) {
        Ok(_) => SyntaxCheck::Complete,
        Err(err) if is_recoverable(&err) => SyntaxCheck::Incomplete,
        Err(err) => SyntaxCheck::Invalid(err.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unterminated_string_is_genuine_error() {
        assert_eq!(
            check("var b = 'invalid"),
            SyntaxCheck::Invalid("Invalid or unexpected token".to_string())
        );
    }

    #[test]
    fn test_unterminated_template_needs_more_input() {
        assert_eq!(check("`abc"), SyntaxCheck::Incomplete);
    }

    #[test]
    fn test_string_continuation_needs_more_input() {
        assert_eq!(check("'abc\\\n"), SyntaxCheck::Incomplete);
    }

    #[test]
    fn test_open_brackets_need_more_input() {
        assert_eq!(check("[1, 2,"), SyntaxCheck::Incomplete);
        assert_eq!(check("Math.max(1,\n2"), SyntaxCheck::Incomplete);
        assert_eq!(check("/* note"), SyntaxCheck::Incomplete);
        assert_eq!(check("const x"), SyntaxCheck::Incomplete);
    }

    #[test]
    fn test_partial_token_is_not_recoverable() {
        // `2e` stops before the end-of-input token is ever produced
        assert!(matches!(check("2e"), SyntaxCheck::Invalid(_)));
        assert!(matches!(check("1 +)"), SyntaxCheck::Invalid(_)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        assert_eq!(
            check(&"[".repeat(50_000)),
            SyntaxCheck::Invalid("Maximum nesting depth exceeded".to_string())
        );
        assert_eq!(check(&"(".repeat(50)), SyntaxCheck::Incomplete);
    }

    #[test]
    fn test_complete_input() {
        assert_eq!(check("1 + 1"), SyntaxCheck::Complete);
        assert_eq!(check(""), SyntaxCheck::Complete);
        assert_eq!(check("let a = 1; a"), SyntaxCheck::Complete);
    }
}
