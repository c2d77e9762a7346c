//! Types shared between the input engine and the runtime it drives.
//!
//! The engine never touches language values directly. It talks to three
//! capabilities:
//!
//! - [`Evaluator`]: evaluate source, enumerate properties, call functions.
//! - [`Completer`]: propose continuations for the current buffer.
//! - [`Highlighter`]: decorate source with terminal colour codes.
//!
//! Values live inside the evaluator and are referred to by [`ObjectId`]
//! handles, optionally grouped so a caller can release everything it
//! created in one go.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Opaque handle to a value owned by an [`Evaluator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"objectId\":{}}}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Function,
    Error,
}

/// A value as seen from outside the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteValue {
    pub id: ObjectId,
    pub kind: ValueKind,
    /// Short plain-text description, e.g. `Array(3)` or `[Function: max]`.
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalOptions {
    /// Resolve the value before returning it.
    pub await_result: bool,
    /// Refuse anything with an observable side effect.
    pub side_effect_free: bool,
    /// Wall-clock budget enforced by the evaluator.
    pub timeout: Option<Duration>,
    /// Group the returned handles are registered under.
    pub object_group: Option<String>,
}

impl EvalOptions {
    pub fn side_effect_free(timeout: Duration, group: &str) -> Self {
        Self {
            await_result: false,
            side_effect_free: true,
            timeout: Some(timeout),
            object_group: Some(group.to_string()),
        }
    }
}

/// Result of a successful round trip to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Value(RemoteValue),
    /// The evaluated code raised. The payload is the thrown value.
    Exception(RemoteValue),
}

impl EvalOutcome {
    pub fn value(&self) -> Option<&RemoteValue> {
        match self {
            EvalOutcome::Value(v) => Some(v),
            EvalOutcome::Exception(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub is_own: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InspectOptions {
    pub colors: bool,
    /// Collapse the inspection onto a single line.
    pub compact: bool,
}

/// Whether a piece of source could be evaluated as it stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCheck {
    Complete,
    /// Fails only because input ended early; more lines may fix it.
    Incomplete,
    Invalid(String),
}

/// Failure to talk to the evaluator at all, as opposed to evaluated code
/// throwing, which is reported through [`EvalOutcome::Exception`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),
    #[error("internal evaluator error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, expression: &str, options: EvalOptions)
    -> Result<EvalOutcome, EvalError>;

    async fn get_properties(&self, object: ObjectId) -> Result<Vec<PropertyDescriptor>, EvalError>;

    async fn call_function(
        &self,
        function: ObjectId,
        args: &[ObjectId],
        group: Option<&str>,
    ) -> Result<EvalOutcome, EvalError>;

    async fn inspect(&self, object: ObjectId, options: InspectOptions) -> Result<String, EvalError>;

    /// Make a value visible to subsequent evaluations under `name`.
    async fn set_binding(&self, name: &str, object: ObjectId) -> Result<(), EvalError>;

    async fn release_object_group(&self, group: &str);

    fn check_syntax(&self, source: &str) -> SyntaxCheck;
}

/// What a [`Completer`] proposes for a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    /// Suffixes that can be appended to the buffer as-is.
    Candidates(Vec<String>),
    /// An annotation (e.g. remaining call arguments), not meant for insertion.
    Hint(String),
}

impl CompletionResult {
    pub fn insertion(text: impl Into<String>) -> Self {
        CompletionResult::Candidates(vec![text.into()])
    }

    pub fn is_fillable(&self) -> bool {
        matches!(self, CompletionResult::Candidates(_))
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, source: &str) -> Result<Option<CompletionResult>, EvalError>;
}

pub trait Highlighter: Send + Sync {
    /// Return `text` with colour codes inserted and nothing else changed.
    fn highlight(&self, text: &str) -> String;
}

/// Highlighter that leaves text untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, text: &str) -> String {
        text.to_string()
    }
}
