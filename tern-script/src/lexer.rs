//! Tokenizer for the script language.
//!
//! Offsets are byte offsets into the source. Comments are kept as tokens so
//! the highlighter can colour them; the parser skips them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Let,
    Const,
    True,
    False,
    Null,
    Undefined,
    Typeof,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Keyword> {
        Some(match ident {
            "var" => Keyword::Var,
            "let" => Keyword::Let,
            "const" => Keyword::Const,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "undefined" => Keyword::Undefined,
            "typeof" => Keyword::Typeof,
            _ => return None,
        })
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            Keyword::True | Keyword::False | Keyword::Null | Keyword::Undefined
        )
    }
}

pub const KEYWORDS: &[&str] = &[
    "var",
    "let",
    "const",
    "true",
    "false",
    "null",
    "undefined",
    "typeof",
];

/// Raw pieces of a template literal. `exprs[i]` sits between `quasis[i]` and
/// `quasis[i + 1]`; each expr carries its source offset for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParts {
    pub quasis: Vec<String>,
    pub exprs: Vec<(usize, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Template(TemplateParts),
    Ident(String),
    Keyword(Keyword),
    Punct(&'static str),
    Comment,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// `continued` is set when the token ends in a backslash-newline.
    UnterminatedString { continued: bool },
    UnterminatedTemplate,
    UnterminatedComment,
    InvalidNumber,
    UnexpectedChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub pos: usize,
}

impl LexError {
    pub fn message(&self) -> String {
        match &self.kind {
            LexErrorKind::UnterminatedString { .. } => "Invalid or unexpected token".to_string(),
            LexErrorKind::UnterminatedTemplate => "Unterminated template literal".to_string(),
            LexErrorKind::UnterminatedComment => "Unterminated comment".to_string(),
            LexErrorKind::InvalidNumber => "Invalid or unexpected token".to_string(),
            LexErrorKind::UnexpectedChar(ch) => format!("Invalid or unexpected token '{ch}'"),
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

// Longest first so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "...", "**", "==", "!=", "<=", ">=", "&&", "||", "??", "=>", "+", "-", "*",
    "/", "%", "<", ">", "=", "!", "?", ":", ".", ",", ";", "(", ")", "[", "]", "{", "}",
];

pub fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphabetic()
}

pub fn is_ident_char(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit() || ch == '\u{200c}' || ch == '\u{200d}'
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    /// Tokenize the whole input. The final token is always [`TokenKind::Eof`].
    pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
        let (tokens, error) = Self::tokenize_partial(src);
        match error {
            Some(err) => Err(err),
            None => Ok(tokens),
        }
    }

    /// Tokenize as far as possible, returning what was read before the first
    /// error. The token list ends in `Eof` only when there was no error.
    pub fn tokenize_partial(src: &str) -> (Vec<Token>, Option<LexError>) {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        loop {
            match lexer.next_token() {
                Ok(token) => {
                    let eof = token.kind == TokenKind::Eof;
                    tokens.push(token);
                    if eof {
                        return (tokens, None);
                    }
                }
                Err(err) => return (tokens, Some(err)),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut newline = false;
        while let Some(ch) = self.peek() {
            if matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                newline = true;
            } else if !ch.is_whitespace() {
                break;
            }
            self.bump();
        }
        newline
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        let newline_before = self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, start, newline_before));
        };

        let kind = match ch {
            '/' if self.peek_at(1) == Some('/') => {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                TokenKind::Comment
            }
            '/' if self.peek_at(1) == Some('*') => {
                self.pos += 2;
                match self.src[self.pos..].find("*/") {
                    Some(idx) => {
                        self.pos += idx + 2;
                        TokenKind::Comment
                    }
                    None => {
                        self.pos = self.src.len();
                        return Err(LexError {
                            kind: LexErrorKind::UnterminatedComment,
                            pos: start,
                        });
                    }
                }
            }
            '\'' | '"' => self.read_string(ch, start)?,
            '`' => self.read_template(start)?,
            c if c.is_ascii_digit() => self.read_number(start)?,
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.read_number(start)?,
            c if is_ident_start(c) => {
                while self.peek().is_some_and(is_ident_char) {
                    self.bump();
                }
                let ident = &self.src[start..self.pos];
                match Keyword::from_ident(ident) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Ident(ident.to_string()),
                }
            }
            _ => {
                let rest = &self.src[self.pos..];
                match PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) {
                    Some(punct) => {
                        self.pos += punct.len();
                        TokenKind::Punct(punct)
                    }
                    None => {
                        return Err(LexError {
                            kind: LexErrorKind::UnexpectedChar(ch),
                            pos: start,
                        });
                    }
                }
            }
        };
        Ok(self.token(kind, start, newline_before))
    }

    fn token(&self, kind: TokenKind, start: usize, newline_before: bool) -> Token {
        Token {
            kind,
            start,
            end: self.pos,
            newline_before,
        }
    }

    fn read_number(&mut self, start: usize) -> Result<TokenKind, LexError> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(LexError {
                    kind: LexErrorKind::InvalidNumber,
                    pos: start,
                });
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(LexError {
                kind: LexErrorKind::InvalidNumber,
                pos: start,
            });
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| LexError {
                kind: LexErrorKind::InvalidNumber,
                pos: start,
            })
    }

    fn read_escape(&mut self, out: &mut String) {
        let Some(ch) = self.bump() else { return };
        match ch {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'u' => {
                let hex: String = self.src[self.pos..].chars().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        self.pos += 4;
                        out.push(decoded);
                    }
                    _ => out.push('u'),
                }
            }
            // line continuation
            '\n' | '\u{2028}' | '\u{2029}' => {}
            '\r' => {
                if self.peek() == Some('\n') {
                    self.bump();
                }
            }
            other => out.push(other),
        }
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<TokenKind, LexError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    let token = &self.src[start..self.pos];
                    let continued = token.ends_with("\\\n")
                        || token.ends_with("\\\r")
                        || token.ends_with("\\\r\n")
                        || token.ends_with("\\\u{2028}")
                        || token.ends_with("\\\u{2029}");
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedString { continued },
                        pos: start,
                    });
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(TokenKind::Str(value));
                }
                Some('\\') => {
                    self.bump();
                    self.read_escape(&mut value);
                }
                Some(c) => {
                    self.bump();
                    value.push(c);
                }
            }
        }
    }

    fn read_template(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.bump();
        let unterminated = LexError {
            kind: LexErrorKind::UnterminatedTemplate,
            pos: start,
        };
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut current = String::new();
        loop {
            match self.bump() {
                None => return Err(unterminated),
                Some('`') => {
                    quasis.push(current);
                    return Ok(TokenKind::Template(TemplateParts { quasis, exprs }));
                }
                Some('\\') => self.read_escape(&mut current),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    quasis.push(std::mem::take(&mut current));
                    let expr_start = self.pos;
                    let expr_end = self.skip_balanced_braces().ok_or(unterminated.clone())?;
                    exprs.push((expr_start, self.src[expr_start..expr_end].to_string()));
                }
                Some(c) => current.push(c),
            }
        }
    }

    /// Advance past the `}` closing a `${` substitution and return the offset
    /// of that brace. Quoted strings inside the substitution are skipped.
    fn skip_balanced_braces(&mut self) -> Option<usize> {
        let mut depth = 0usize;
        while let Some(ch) = self.peek() {
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    let end = self.pos;
                    self.bump();
                    return Some(end);
                }
                '}' => depth -= 1,
                '\'' | '"' | '`' => {
                    self.bump();
                    while let Some(c) = self.bump() {
                        if c == '\\' {
                            self.bump();
                        } else if c == ch {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            self.bump();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_expression() {
        assert_eq!(
            kinds("1 + foo"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Punct("+"),
                TokenKind::Ident("foo".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_longest_punctuator_wins() {
        assert_eq!(
            kinds("a === b"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Punct("==="),
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_without_continuation() {
        let err = Lexer::tokenize("var b = 'invalid").unwrap_err();
        assert_eq!(
            err.kind,
            LexErrorKind::UnterminatedString { continued: false }
        );
        assert_eq!(err.pos, 8);
    }

    #[test]
    fn test_unterminated_string_with_continuation() {
        let err = Lexer::tokenize("'abc\\\n").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString { continued: true });
    }

    #[test]
    fn test_template_parts() {
        let tokens = Lexer::tokenize("`a${1 + 2}b`").unwrap();
        match &tokens[0].kind {
            TokenKind::Template(parts) => {
                assert_eq!(parts.quasis, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(parts.exprs, vec![(4, "1 + 2".to_string())]);
            }
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_template_and_comment() {
        assert_eq!(
            Lexer::tokenize("`abc").unwrap_err().kind,
            LexErrorKind::UnterminatedTemplate
        );
        assert_eq!(
            Lexer::tokenize("1 /* note").unwrap_err().kind,
            LexErrorKind::UnterminatedComment
        );
    }

    #[test]
    fn test_partial_exponent_is_invalid() {
        assert_eq!(
            Lexer::tokenize("2e").unwrap_err().kind,
            LexErrorKind::InvalidNumber
        );
    }

    #[test]
    fn test_newline_before_is_tracked() {
        let tokens = Lexer::tokenize("a\nb").unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn test_partial_tokenize_keeps_prefix() {
        let (tokens, err) = Lexer::tokenize_partial("x + 'abc");
        assert!(err.is_some());
        assert_eq!(tokens.len(), 2);
    }
}
