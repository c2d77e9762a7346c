//! Completion for member access, bare identifiers and open calls.

use crate::annotations;
use crate::evaluator::ScriptEvaluator;
use crate::lexer::{KEYWORDS, Keyword, Lexer, Token, TokenKind, is_ident_char, is_ident_start};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tern_types::{
    Completer, CompletionResult, EvalError, EvalOptions, EvalOutcome, Evaluator, RemoteValue,
};
use tracing::debug;

/// Numbers the object group of each request so concurrent requests never free each other's handles.
static REQUESTS: AtomicU64 = AtomicU64::new(0);

pub struct ScriptCompleter {
    evaluator: Arc<ScriptEvaluator>,
    timeout: Duration,
}

impl ScriptCompleter {
    pub fn new(evaluator: Arc<ScriptEvaluator>, timeout: Duration) -> Self {
        ScriptCompleter { evaluator, timeout }
    }

    /// Evaluate `source` without side effects and return the value, if any.
    async fn peek_value(
        &self,
        source: &str,
        group: &str,
    ) -> Result<Option<RemoteValue>, EvalError> {
        let options = EvalOptions::side_effect_free(self.timeout, group);
        match self.evaluator.evaluate(source, options).await {
            Ok(EvalOutcome::Value(value)) => Ok(Some(value)),
            Ok(EvalOutcome::Exception(_)) | Err(EvalError::Timeout(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn complete_member(
        &self,
        source: &str,
        tokens: &[Token],
        target_end: usize,
        partial: &str,
        group: &str,
    ) -> Result<Option<CompletionResult>, EvalError> {
        let Some(start) = chain_start(tokens, target_end) else {
            return Ok(None);
        };
        let target = &source[tokens[start].start..tokens[target_end].end];
        let Some(value) = self.peek_value(target, group).await? else {
            return Ok(None);
        };
        let mut properties = self.evaluator.get_properties(value.id).await?;
        // own properties first, stable otherwise
        properties.sort_by_key(|p| !p.is_own);
        let mut suffixes: Vec<String> = Vec::new();
        for property in properties {
            if !is_identifier(&property.name) || !property.name.starts_with(partial) {
                continue;
            }
            let suffix = property.name[partial.len()..].to_string();
            if !suffix.is_empty() && !suffixes.contains(&suffix) {
                suffixes.push(suffix);
            }
        }
        Ok(candidates(suffixes))
    }

    fn complete_identifier(&self, partial: &str) -> Option<CompletionResult> {
        let mut suffixes: Vec<String> = Vec::new();
        let names = self.evaluator.global_names();
        let keywords = KEYWORDS.iter().map(|k| k.to_string());
        for name in names.into_iter().chain(keywords) {
            if let Some(suffix) = name.strip_prefix(partial)
                && !suffix.is_empty()
                && !suffixes.iter().any(|s| s == suffix)
            {
                suffixes.push(suffix.to_string());
            }
        }
        candidates(suffixes)
    }

    async fn complete_call(
        &self,
        source: &str,
        tokens: &[Token],
        group: &str,
    ) -> Result<Option<CompletionResult>, EvalError> {
        let Some((paren, supplied)) = open_call(tokens) else {
            return Ok(None);
        };
        let Some(start) = chain_start(tokens, paren - 1) else {
            return Ok(None);
        };
        let callee = &source[tokens[start].start..tokens[paren - 1].end];
        let Some(value) = self.peek_value(callee, group).await? else {
            return Ok(None);
        };
        Ok(self.evaluator.builtin_of(value.id).map(|builtin| {
            CompletionResult::Hint(annotations::complete_call(builtin, supplied, source))
        }))
    }

    async fn complete_inner(
        &self,
        source: &str,
        group: &str,
    ) -> Result<Option<CompletionResult>, EvalError> {
        let (tokens, error) = Lexer::tokenize_partial(source);
        if error.is_some() {
            // inside a string or comment
            return Ok(None);
        }
        if tokens
            .iter()
            .rev()
            .find(|t| t.kind != TokenKind::Eof)
            .is_some_and(|t| t.kind == TokenKind::Comment)
        {
            return Ok(None);
        }
        let tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Comment | TokenKind::Eof))
            .collect();
        let Some(last) = tokens.last() else {
            return Ok(None);
        };

        if !source.ends_with(char::is_whitespace) {
            let n = tokens.len();
            let word = match &last.kind {
                TokenKind::Punct(".") if n >= 2 => {
                    self.complete_member(source, &tokens, n - 2, "", group).await?
                }
                TokenKind::Ident(partial)
                    if n >= 3 && tokens[n - 2].kind == TokenKind::Punct(".") =>
                {
                    self.complete_member(source, &tokens, n - 3, partial, group)
                        .await?
                }
                TokenKind::Ident(partial) => {
                    let declaring = n >= 2
                        && matches!(
                            tokens[n - 2].kind,
                            TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const)
                        );
                    if declaring {
                        None
                    } else {
                        self.complete_identifier(partial)
                    }
                }
                _ => None,
            };
            if word.is_some() {
                return Ok(word);
            }
        }
        self.complete_call(source, &tokens, group).await
    }
}

#[async_trait]
impl Completer for ScriptCompleter {
    async fn complete(&self, source: &str) -> Result<Option<CompletionResult>, EvalError> {
        let group = format!("completion-{}", REQUESTS.fetch_add(1, Ordering::Relaxed));
        let result = self.complete_inner(source, &group).await;
        self.evaluator.release_object_group(&group).await;
        if let Err(err) = &result {
            debug!("completion failed: {}", err);
        }
        result
    }
}

fn candidates(suffixes: Vec<String>) -> Option<CompletionResult> {
    match suffixes.as_slice() {
        [] => None,
        [only] if only.is_empty() => None,
        _ => Some(CompletionResult::Candidates(suffixes)),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char)
}

fn ends_expression(token: &Token) -> bool {
    match &token.kind {
        TokenKind::Ident(_) | TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Template(_) => {
            true
        }
        TokenKind::Keyword(kw) => kw.is_literal(),
        TokenKind::Punct(p) => matches!(*p, ")" | "]"),
        _ => false,
    }
}

fn matching_open(tokens: &[Token], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for idx in (0..=close).rev() {
        match tokens[idx].kind {
            TokenKind::Punct(")" | "]" | "}") => depth += 1,
            TokenKind::Punct("(" | "[" | "{") => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the first token of the postfix chain (`a.b(c)[d]`) that ends at
/// `end`, if the tokens there form one.
fn chain_start(tokens: &[Token], end: usize) -> Option<usize> {
    let mut idx = end;
    loop {
        let start = match &tokens[idx].kind {
            TokenKind::Ident(_)
            | TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Template(_) => idx,
            TokenKind::Keyword(kw) if kw.is_literal() => idx,
            TokenKind::Punct(")" | "]") => {
                let open = matching_open(tokens, idx)?;
                if open > 0 && ends_expression(&tokens[open - 1]) {
                    idx = open - 1;
                    continue;
                }
                open
            }
            TokenKind::Punct("}") => matching_open(tokens, idx)?,
            _ => return None,
        };
        if start >= 2 && tokens[start - 1].kind == TokenKind::Punct(".") {
            idx = start - 2;
            continue;
        }
        return Some(start);
    }
}

/// The innermost unclosed call paren and how many arguments precede the
/// cursor.
fn open_call(tokens: &[Token]) -> Option<(usize, usize)> {
    struct Open {
        idx: usize,
        call: bool,
        commas: usize,
        content: bool,
    }
    let mut stack: Vec<Open> = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Punct(open @ ("(" | "[" | "{")) => {
                if let Some(top) = stack.last_mut() {
                    top.content = true;
                }
                stack.push(Open {
                    idx,
                    call: open == "(" && idx > 0 && ends_expression(&tokens[idx - 1]),
                    commas: 0,
                    content: false,
                });
            }
            TokenKind::Punct(")" | "]" | "}") => {
                stack.pop();
            }
            TokenKind::Punct(",") => {
                if let Some(top) = stack.last_mut() {
                    top.commas += 1;
                    top.content = false;
                }
            }
            _ => {
                if let Some(top) = stack.last_mut() {
                    top.content = true;
                }
            }
        }
    }
    let top = stack.pop()?;
    top.call
        .then_some((top.idx, top.commas + usize::from(top.content)))
}
