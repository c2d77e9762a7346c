//! A compact JavaScript-flavoured language that implements the capabilities
//! the tern input engine drives: evaluation with handles and object groups,
//! completion, call hints, and highlighting.

pub mod annotations;
pub mod builtins;
mod completer;
mod evaluator;
mod highlight;
pub mod inspect;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod recoverable;
pub mod value;

pub use completer::ScriptCompleter;
pub use evaluator::ScriptEvaluator;
pub use highlight::ScriptHighlighter;
pub use interpreter::ConsoleSink;
