use crate::input::utils::truncate_to_width;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tern_types::{EvalOptions, EvalOutcome, Evaluator, InspectOptions, SyntaxCheck, ValueKind};
use tracing::debug;

/// Each preview gets its own object group so overlapping previews stay independent.
static PREVIEWS: AtomicU64 = AtomicU64::new(0);

/// Side-effect-free previews of the buffer.
#[derive(Clone)]
pub struct EagerEvaluator {
    evaluator: Arc<dyn Evaluator>,
    timeout: Duration,
}

impl EagerEvaluator {
    pub fn new(evaluator: Arc<dyn Evaluator>, timeout: Duration) -> Self {
        Self { evaluator, timeout }
    }

    /// Single-line inspection of `source`, at most `max_width` columns wide.
    ///
    /// Returns `None` for anything that is not a complete expression, throws,
    /// times out or yields nothing worth showing.
    pub async fn preview(&self, source: &str, max_width: usize) -> Option<String> {
        if source.trim().is_empty()
            || self.evaluator.check_syntax(source) != SyntaxCheck::Complete
        {
            return None;
        }
        // the evaluator enforces the timeout too; this bounds a stuck transport
        let guard = self.timeout + self.timeout / 2;
        let group = format!("eager-{}", PREVIEWS.fetch_add(1, Ordering::Relaxed));
        let text = match tokio::time::timeout(guard, self.inspect(source, &group)).await {
            Ok(text) => text,
            Err(_) => {
                debug!("eager preview timed out for {source:?}");
                None
            }
        };
        self.evaluator.release_object_group(&group).await;
        let text = text?;
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Some(truncate_to_width(&line, max_width))
    }

    async fn inspect(&self, source: &str, group: &str) -> Option<String> {
        let options = EvalOptions::side_effect_free(self.timeout, group);
        let value = match self.evaluator.evaluate(source, options).await {
            Ok(EvalOutcome::Value(value)) => value,
            Ok(EvalOutcome::Exception(thrown)) => {
                debug!("eager preview threw: {}", thrown.description);
                return None;
            }
            Err(err) => {
                debug!("eager preview failed: {err}");
                return None;
            }
        };
        if matches!(value.kind, ValueKind::Undefined | ValueKind::Function) {
            return None;
        }
        let options = InspectOptions {
            colors: false,
            compact: true,
        };
        match self.evaluator.inspect(value.id, options).await {
            Ok(text) => Some(text),
            Err(err) => {
                debug!("eager preview inspection failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_script::ScriptEvaluator;

    fn eager() -> EagerEvaluator {
        let evaluator: Arc<dyn Evaluator> =
            Arc::new(ScriptEvaluator::with_console(Arc::new(|_: &str| {})));
        EagerEvaluator::new(evaluator, Duration::from_millis(250))
    }

    #[tokio::test]
    async fn test_preview_simple_expression() {
        assert_eq!(eager().preview("1 + 1", 80).await, Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_incomplete_buffer_has_no_preview() {
        assert_eq!(eager().preview("Math.max(1,", 80).await, None);
        assert_eq!(eager().preview("", 80).await, None);
    }

    #[tokio::test]
    async fn test_side_effects_are_refused() {
        let eager = eager();
        assert_eq!(eager.preview("console.log(1)", 80).await, None);
        assert_eq!(eager.preview("var a = 1", 80).await, None);
    }

    #[tokio::test]
    async fn test_functions_and_undefined_are_hidden() {
        let eager = eager();
        assert_eq!(eager.preview("Math.max", 80).await, None);
        assert_eq!(eager.preview("undefined", 80).await, None);
    }

    #[tokio::test]
    async fn test_preview_is_single_line_and_bounded() {
        let source = "[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20]";
        let preview = eager().preview(source, 20).await.unwrap();
        assert!(!preview.contains('\n'));
        assert!(preview.ends_with('…'));
        assert_eq!(crate::input::utils::display_width(&preview), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_previews_are_independent() {
        let eager = eager();
        let tasks: Vec<_> = (0..500)
            .map(|_| {
                let eager = eager.clone();
                tokio::spawn(async move { eager.preview("[1, 2, 3]", 80).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().as_deref(), Some("[ 1, 2, 3 ]"));
        }
    }

    #[tokio::test]
    async fn test_oversized_string_has_no_preview() {
        assert_eq!(eager().preview("'ab'.repeat(1e19)", 80).await, None);
        assert_eq!(eager().preview("'ab'.repeat(2)", 80).await, Some("'abab'".to_string()));
    }

    #[tokio::test]
    async fn test_deep_nesting_has_no_preview() {
        let source = format!("{}1{}", "[".repeat(50_000), "]".repeat(50_000));
        assert_eq!(eager().preview(&source, 80).await, None);
    }
}
