//! What happens to a line once the user submits it.

use async_trait::async_trait;
use std::sync::Arc;
use tern_types::{
    EvalOptions, EvalOutcome, Evaluator, InspectOptions, ObjectId, RemoteValue, SyntaxCheck,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// The statement stops short; keep reading lines.
    NeedsAnotherLine,
    /// Text to print below the input.
    Output(String),
}

#[async_trait]
pub trait LineHandler: Send {
    async fn on_line(&mut self, line: &str) -> LineOutcome;
}

/// A handle kept alive by the object group of the line that produced it.
#[derive(Debug, Clone)]
struct Kept {
    id: ObjectId,
    group: String,
}

/// Evaluates submitted statements and keeps the last result and error.
///
/// Every line evaluates in its own object group. A group is released as soon
/// as nothing refers to its handles: at once for lines whose result is not
/// kept, otherwise when a newer result or error takes its place.
pub struct ReplSession {
    evaluator: Arc<dyn Evaluator>,
    colors: bool,
    lines: u64,
    last: Option<Kept>,
    last_error: Option<Kept>,
}

impl ReplSession {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            colors: true,
            lines: 0,
            last: None,
            last_error: None,
        }
    }

    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    pub fn last(&self) -> Option<ObjectId> {
        self.last.as_ref().map(|kept| kept.id)
    }

    pub fn last_error(&self) -> Option<ObjectId> {
        self.last_error.as_ref().map(|kept| kept.id)
    }

    async fn release(&self, replaced: Option<Kept>) {
        if let Some(kept) = replaced {
            self.evaluator.release_object_group(&kept.group).await;
        }
    }

    async fn show(&self, value: &RemoteValue) -> String {
        let options = InspectOptions {
            colors: self.colors,
            compact: false,
        };
        match self.evaluator.inspect(value.id, options).await {
            Ok(text) => text,
            Err(err) => {
                debug!("inspect failed, falling back to description: {err}");
                value.description.clone()
            }
        }
    }

    async fn bind(&self, name: &str, id: ObjectId) {
        if let Err(err) = self.evaluator.set_binding(name, id).await {
            debug!("could not bind {name}: {err}");
        }
    }
}

#[async_trait]
impl LineHandler for ReplSession {
    async fn on_line(&mut self, line: &str) -> LineOutcome {
        if self.evaluator.check_syntax(line) == SyntaxCheck::Incomplete {
            return LineOutcome::NeedsAnotherLine;
        }
        self.lines += 1;
        let group = format!("line-{}", self.lines);
        let options = EvalOptions {
            await_result: true,
            object_group: Some(group.clone()),
            ..EvalOptions::default()
        };
        match self.evaluator.evaluate(line, options).await {
            Ok(EvalOutcome::Value(value)) => {
                let text = self.show(&value).await;
                self.bind("_", value.id).await;
                let kept = Kept {
                    id: value.id,
                    group,
                };
                let replaced = self.last.replace(kept);
                self.release(replaced).await;
                LineOutcome::Output(text)
            }
            Ok(EvalOutcome::Exception(thrown)) => {
                let text = self.show(&thrown).await;
                self.bind("_err", thrown.id).await;
                let kept = Kept {
                    id: thrown.id,
                    group,
                };
                let replaced = self.last_error.replace(kept);
                self.release(replaced).await;
                LineOutcome::Output(format!("Uncaught {text}"))
            }
            Err(err) => {
                warn!("evaluator failed on {line:?}: {err}");
                self.evaluator.release_object_group(&group).await;
                LineOutcome::Output(format!("tern: evaluator unavailable: {err}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_script::ScriptEvaluator;
    use tern_types::{EvalError, PropertyDescriptor};

    fn session() -> ReplSession {
        let evaluator = ScriptEvaluator::with_console(Arc::new(|_: &str| {}));
        ReplSession::new(Arc::new(evaluator)).with_colors(false)
    }

    #[tokio::test]
    async fn test_value_is_inspected() {
        let mut session = session();
        assert_eq!(
            session.on_line("1 + 1").await,
            LineOutcome::Output("2".to_string())
        );
        assert!(session.last().is_some());
    }

    #[tokio::test]
    async fn test_last_result_is_bound() {
        let mut session = session();
        session.on_line("20 + 1").await;
        assert_eq!(
            session.on_line("_ * 2").await,
            LineOutcome::Output("42".to_string())
        );
    }

    #[tokio::test]
    async fn test_only_latest_results_keep_handles() {
        let evaluator = Arc::new(ScriptEvaluator::with_console(Arc::new(|_: &str| {})));
        let mut session = ReplSession::new(evaluator.clone()).with_colors(false);
        let before = evaluator.live_handles();
        for i in 0..50 {
            session.on_line(&format!("[{i}]")).await;
            session.on_line("null.x").await;
        }
        // one result and one error
        assert_eq!(evaluator.live_handles(), before + 2);
        assert_eq!(
            session.on_line("_[0]").await,
            LineOutcome::Output("49".to_string())
        );
    }

    #[tokio::test]
    async fn test_oversized_string_is_uncaught_range_error() {
        let mut session = session();
        assert_eq!(
            session.on_line("'ab'.repeat(1e19)").await,
            LineOutcome::Output("Uncaught RangeError: Invalid string length".to_string())
        );
    }

    #[tokio::test]
    async fn test_deep_nesting_is_a_syntax_error() {
        let mut session = session();
        let LineOutcome::Output(text) = session.on_line(&"[".repeat(50_000)).await else {
            panic!("expected output");
        };
        assert_eq!(text, "Uncaught SyntaxError: Maximum nesting depth exceeded");
    }

    #[tokio::test]
    async fn test_incomplete_needs_another_line() {
        let mut session = session();
        assert_eq!(session.on_line("`abc").await, LineOutcome::NeedsAnotherLine);
        assert_eq!(session.on_line("[1,").await, LineOutcome::NeedsAnotherLine);
    }

    #[tokio::test]
    async fn test_syntax_error_is_uncaught() {
        let mut session = session();
        let LineOutcome::Output(text) = session.on_line("var b = 'invalid").await else {
            panic!("expected output");
        };
        assert!(text.starts_with("Uncaught "));
        assert!(text.contains("SyntaxError:"));
        assert!(session.last_error().is_some());
    }

    #[tokio::test]
    async fn test_thrown_error_is_bound_as_err() {
        let mut session = session();
        session.on_line("JSON.parse('{')").await;
        let LineOutcome::Output(text) = session.on_line("_err").await else {
            panic!("expected output");
        };
        assert!(text.contains("SyntaxError"));
    }

    struct Broken;

    #[async_trait]
    impl Evaluator for Broken {
        async fn evaluate(&self, _: &str, _: EvalOptions) -> Result<EvalOutcome, EvalError> {
            Err(EvalError::Transport("socket closed".to_string()))
        }

        async fn get_properties(&self, _: ObjectId) -> Result<Vec<PropertyDescriptor>, EvalError> {
            Ok(Vec::new())
        }

        async fn call_function(
            &self,
            _: ObjectId,
            _: &[ObjectId],
            _: Option<&str>,
        ) -> Result<EvalOutcome, EvalError> {
            Err(EvalError::Transport("socket closed".to_string()))
        }

        async fn inspect(&self, _: ObjectId, _: InspectOptions) -> Result<String, EvalError> {
            Err(EvalError::Transport("socket closed".to_string()))
        }

        async fn set_binding(&self, _: &str, _: ObjectId) -> Result<(), EvalError> {
            Ok(())
        }

        async fn release_object_group(&self, _: &str) {}

        fn check_syntax(&self, _: &str) -> SyntaxCheck {
            SyntaxCheck::Complete
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let mut session = ReplSession::new(Arc::new(Broken));
        assert_eq!(
            session.on_line("1").await,
            LineOutcome::Output(
                "tern: evaluator unavailable: transport failure: socket closed".to_string()
            )
        );
    }
}
