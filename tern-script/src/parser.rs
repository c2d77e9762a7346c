//! Pratt parser producing a small statement/expression tree.

use crate::lexer::{Keyword, LexError, Lexer, TemplateParts, Token, TokenKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Decl {
        kind: DeclKind,
        name: String,
        init: Option<Expr>,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    Lex(LexError),
    Parse {
        message: String,
        pos: usize,
        /// The parser ran out of tokens before the construct was closed.
        at_eof: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: SyntaxErrorKind,
}

impl ParseError {
    fn parse(message: impl Into<String>, pos: usize, at_eof: bool) -> Self {
        ParseError {
            kind: SyntaxErrorKind::Parse {
                message: message.into(),
                pos,
                at_eof,
            },
        }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            SyntaxErrorKind::Lex(err) => err.message(),
            SyntaxErrorKind::Parse { message, .. } => message.clone(),
        }
    }

    pub fn position(&self) -> usize {
        match &self.kind {
            SyntaxErrorKind::Lex(err) => err.pos,
            SyntaxErrorKind::Parse { pos, .. } => *pos,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            kind: SyntaxErrorKind::Lex(err),
        }
    }
}

type PResult<T> = Result<T, ParseError>;

// Binding powers, lowest first.
const BP_ASSIGN: u8 = 2;
const BP_CONDITIONAL: u8 = 3;
const BP_NULLISH: u8 = 4;
const BP_OR: u8 = 5;
const BP_AND: u8 = 6;
const BP_EQUALITY: u8 = 10;
const BP_RELATIONAL: u8 = 11;
const BP_ADDITIVE: u8 = 13;
const BP_MULTIPLICATIVE: u8 = 14;
const BP_EXPONENT: u8 = 15;

/// Deepest nesting of brackets, operands and substitutions the parser descends into.
const MAX_NESTING: usize = 128;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// Parse a whole program.
pub fn parse_program(src: &str) -> PResult<Vec<Stmt>> {
    let tokens = Lexer::tokenize(src)?;
    Parser::new(tokens).program()
}

/// Parse `src` as exactly one expression.
pub fn parse_expression(src: &str) -> PResult<Expr> {
    parse_expression_at(src, 0)
}

fn parse_expression_at(src: &str, depth: usize) -> PResult<Expr> {
    let tokens = Lexer::tokenize(src)?;
    let mut parser = Parser::new(tokens);
    parser.depth = depth;
    let expr = parser.expression()?;
    match parser.peek().kind {
        TokenKind::Eof => Ok(expr),
        _ => Err(parser.unexpected()),
    }
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|t| t.kind != TokenKind::Comment)
            .collect();
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Run `parse` one nesting level deeper, failing once the limit is reached.
    fn descend<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            let pos = self.peek().start;
            return Err(ParseError::parse("Maximum nesting depth exceeded", pos, false));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        // the lexer always terminates the list with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Punct(p) if p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> PResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        let message = match &token.kind {
            TokenKind::Eof => {
                return ParseError::parse("Unexpected end of input", token.start, true);
            }
            TokenKind::Number(_) => "Unexpected number".to_string(),
            TokenKind::Str(_) => "Unexpected string".to_string(),
            TokenKind::Template(_) => "Unexpected template string".to_string(),
            TokenKind::Ident(name) => format!("Unexpected identifier '{name}'"),
            TokenKind::Keyword(Keyword::True | Keyword::False) => "Unexpected boolean".to_string(),
            TokenKind::Keyword(Keyword::Null) => "Unexpected token 'null'".to_string(),
            TokenKind::Keyword(kw) => format!("Unexpected token '{}'", keyword_text(*kw)),
            TokenKind::Punct(p) => format!("Unexpected token '{p}'"),
            TokenKind::Comment => "Unexpected token".to_string(),
        };
        ParseError::parse(message, token.start, false)
    }

    pub fn program(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        let stmt = match self.peek().kind {
            TokenKind::Keyword(kw @ (Keyword::Var | Keyword::Let | Keyword::Const)) => {
                self.advance();
                self.declaration(match kw {
                    Keyword::Var => DeclKind::Var,
                    Keyword::Let => DeclKind::Let,
                    _ => DeclKind::Const,
                })?
            }
            _ => Stmt::Expr(self.expression()?),
        };
        self.end_of_statement()?;
        Ok(stmt)
    }

    fn end_of_statement(&mut self) -> PResult<()> {
        if self.eat_punct(";") {
            return Ok(());
        }
        let token = self.peek();
        if token.kind == TokenKind::Eof || token.newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn declaration(&mut self, kind: DeclKind) -> PResult<Stmt> {
        let name = match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            _ => return Err(self.unexpected()),
        };
        let init = if self.eat_punct("=") {
            Some(self.assignment()?)
        } else {
            None
        };
        if kind == DeclKind::Const && init.is_none() {
            let token = self.peek();
            if token.kind == TokenKind::Eof {
                return Err(ParseError::parse("Unexpected end of input", token.start, true));
            }
            return Err(ParseError::parse(
                "Missing initializer in const declaration",
                token.start,
                false,
            ));
        }
        Ok(Stmt::Decl { kind, name, init })
    }

    pub fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let target = self.binary(BP_CONDITIONAL)?;
        if self.is_punct("=") {
            self.advance();
            if !matches!(
                target,
                Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
            ) {
                return Err(ParseError::parse(
                    "Invalid left-hand side in assignment",
                    start,
                    false,
                ));
            }
            let value = self.descend(Self::assignment)?;
            return Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
            });
        }
        Ok(target)
    }

    fn binary(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let TokenKind::Punct(punct) = self.peek().kind else {
                break;
            };
            if punct == "?" {
                if BP_CONDITIONAL < min_bp {
                    break;
                }
                self.advance();
                let consequent = self.descend(Self::assignment)?;
                self.expect_punct(":")?;
                let alternate = self.descend(Self::assignment)?;
                left = Expr::Conditional {
                    test: Box::new(left),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                };
                continue;
            }
            let Some((bp, right_assoc)) = infix_binding(punct) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let next_bp = if right_assoc { bp } else { bp + 1 };
            let right = self.descend(|p| p.binary(next_bp))?;
            left = make_infix(punct, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let expr = self.descend(Self::unary)?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let property = match self.peek().kind.clone() {
                    TokenKind::Ident(name) => name,
                    TokenKind::Keyword(kw) => keyword_text(kw).to_string(),
                    _ => return Err(self.unexpected()),
                };
                self.advance();
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct("[") {
                let index = self.descend(Self::expression)?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_punct("(") {
                let args = self.descend(|p| p.list(")"))?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Comma-separated assignment expressions up to `close`, trailing comma allowed.
    fn list(&mut self, close: &str) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct(close) {
                return Ok(items);
            }
            items.push(self.assignment()?);
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        let expr = match token.kind {
            TokenKind::Number(n) => Expr::Number(n),
            TokenKind::Str(s) => Expr::Str(s),
            TokenKind::Template(parts) => {
                self.advance();
                return self.descend(|p| p.template(parts));
            }
            TokenKind::Ident(name) => Expr::Ident(name),
            TokenKind::Keyword(Keyword::True) => Expr::Bool(true),
            TokenKind::Keyword(Keyword::False) => Expr::Bool(false),
            TokenKind::Keyword(Keyword::Null) => Expr::Null,
            TokenKind::Keyword(Keyword::Undefined) => Expr::Undefined,
            TokenKind::Punct("(") => {
                self.advance();
                let inner = self.descend(Self::expression)?;
                self.expect_punct(")")?;
                return Ok(inner);
            }
            TokenKind::Punct("[") => {
                self.advance();
                return Ok(Expr::Array(self.descend(|p| p.list("]"))?));
            }
            TokenKind::Punct("{") => {
                self.advance();
                return self.descend(Self::object_literal);
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        let mut props = Vec::new();
        loop {
            if self.eat_punct("}") {
                return Ok(Expr::Object(props));
            }
            let key = match self.peek().kind.clone() {
                TokenKind::Ident(name) => name,
                TokenKind::Keyword(kw) => keyword_text(kw).to_string(),
                TokenKind::Str(s) => s,
                TokenKind::Number(n) => crate::value::format_number(n),
                _ => return Err(self.unexpected()),
            };
            let key_token = self.advance();
            let value = if self.eat_punct(":") {
                self.assignment()?
            } else if matches!(key_token.kind, TokenKind::Ident(_)) {
                Expr::Ident(key.clone())
            } else {
                return Err(self.unexpected());
            };
            props.push((key, value));
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                return Ok(Expr::Object(props));
            }
        }
    }

    fn template(&mut self, parts: TemplateParts) -> PResult<Expr> {
        let mut exprs = Vec::with_capacity(parts.exprs.len());
        for (offset, source) in &parts.exprs {
            let expr = parse_expression_at(source, self.depth).map_err(|err| {
                // the template itself is closed, so running out of input inside a
                // substitution is a genuine error
                ParseError::parse(err.message(), offset + err.position(), false)
            })?;
            exprs.push(expr);
        }
        Ok(Expr::Template {
            quasis: parts.quasis,
            exprs,
        })
    }
}


fn infix_binding(punct: &str) -> Option<(u8, bool)> {
    Some(match punct {
        "??" => (BP_NULLISH, false),
        "||" => (BP_OR, false),
        "&&" => (BP_AND, false),
        "==" | "!=" | "===" | "!==" => (BP_EQUALITY, false),
        "<" | ">" | "<=" | ">=" => (BP_RELATIONAL, false),
        "+" | "-" => (BP_ADDITIVE, false),
        "*" | "/" | "%" => (BP_MULTIPLICATIVE, false),
        "**" => (BP_EXPONENT, true),
        _ => return None,
    })
}

fn make_infix(punct: &str, left: Expr, right: Expr) -> Expr {
    let logical = match punct {
        "&&" => Some(LogicalOp::And),
        "||" => Some(LogicalOp::Or),
        "??" => Some(LogicalOp::Nullish),
        _ => None,
    };
    if let Some(op) = logical {
        return Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    let op = match punct {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "**" => BinaryOp::Pow,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::NotEq,
        "===" => BinaryOp::StrictEq,
        "!==" => BinaryOp::StrictNotEq,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "<=" => BinaryOp::LtEq,
        _ => BinaryOp::GtEq,
    };
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn keyword_text(kw: Keyword) -> &'static str {
    match kw {
        Keyword::Var => "var",
        Keyword::Let => "let",
        Keyword::Const => "const",
        Keyword::True => "true",
        Keyword::False => "false",
        Keyword::Null => "null",
        Keyword::Undefined => "undefined",
        Keyword::Typeof => "typeof",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_error(src: &str) -> ParseError {
        parse_program(src).unwrap_err()
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Number(1.0)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Number(2.0)),
                    right: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let expr = parse_expression("2 ** 3 ** 2").unwrap();
        match expr {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOp::Pow);
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_member_call_chain() {
        let expr = parse_expression("Math.max(1, 2)").unwrap();
        match expr {
            Expr::Call { callee, args } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(*callee, Expr::Member { ref property, .. } if property == "max"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_statements_split_on_newline_and_semicolon() {
        let stmts = parse_program("let a = 1\na + 1; a").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Stmt::Decl { kind: DeclKind::Let, .. }));
    }

    #[test]
    fn test_end_of_input_is_flagged() {
        for src in ["(1 + ", "[1, 2", "{ a: 1", "foo(", "1 +"] {
            let err = parse_error(src);
            assert!(
                matches!(err.kind, SyntaxErrorKind::Parse { at_eof: true, .. }),
                "{src}: {err:?}"
            );
            assert_eq!(err.message(), "Unexpected end of input");
        }
    }

    #[test]
    fn test_genuine_errors_are_not_at_eof() {
        for src in ["1 +)", "a b", "1 = 2", "const x;"] {
            let err = parse_error(src);
            assert!(
                !matches!(err.kind, SyntaxErrorKind::Parse { at_eof: true, .. }),
                "{src}: {err:?}"
            );
        }
    }

    #[test]
    fn test_template_substitutions_are_parsed() {
        let expr = parse_expression("`x${a + 1}y`").unwrap();
        match expr {
            Expr::Template { quasis, exprs } => {
                assert_eq!(quasis.len(), 2);
                assert!(matches!(exprs[0], Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}1{}", "[".repeat(depth), "]".repeat(depth));
        assert!(parse_expression(&nested(100)).is_ok());

        let err = parse_error(&nested(50_000));
        assert_eq!(err.message(), "Maximum nesting depth exceeded");
        assert!(!matches!(err.kind, SyntaxErrorKind::Parse { at_eof: true, .. }));

        let err = parse_error(&format!("{}1", "!".repeat(50_000)));
        assert_eq!(err.message(), "Maximum nesting depth exceeded");
        let err = parse_error(&format!("{}1", "a = ".repeat(50_000)));
        assert_eq!(err.message(), "Maximum nesting depth exceeded");
    }

    #[test]
    fn test_object_shorthand_and_keys() {
        let expr = parse_expression("{ a, 'b-c': 2, 3: true }").unwrap();
        match expr {
            Expr::Object(props) => {
                let keys: Vec<_> = props.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b-c", "3"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
