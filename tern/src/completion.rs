use crate::input::editor::{Suffix, SuffixKind};
use crate::input::utils::display_width;
use std::sync::Arc;
use tern_types::{Completer, CompletionResult};
use tracing::debug;

/// How a completion result is going to be used once it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Ghost text after every edit.
    Partial,
    /// Explicit request: insert the only candidate or list them all.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullOutcome {
    Insert(String),
    Listing(String),
    Nothing,
}

/// Ask `completer` about `source`, treating every failure as "no completion".
pub async fn request_completions(
    completer: &dyn Completer,
    source: &str,
) -> Option<CompletionResult> {
    match completer.complete(source).await {
        Ok(Some(CompletionResult::Candidates(list)))
            if list.is_empty() || (list.len() == 1 && list[0].is_empty()) =>
        {
            None
        }
        Ok(result) => result,
        Err(err) => {
            debug!("completion failed for {source:?}: {err}");
            None
        }
    }
}

/// Tracks the ghost-text candidates for one buffer generation.
pub struct AutocompleteDriver {
    completer: Arc<dyn Completer>,
    candidates: Vec<String>,
    /// `None` while no candidate is shown.
    index: Option<usize>,
    generation: u64,
}

impl AutocompleteDriver {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self {
            completer,
            candidates: Vec::new(),
            index: None,
            generation: 0,
        }
    }

    pub fn completer(&self) -> Arc<dyn Completer> {
        Arc::clone(&self.completer)
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.index = None;
    }

    #[cfg(test)]
    fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Take a partial-mode result computed for `generation` and return the suffix to show.
    pub fn apply_partial(
        &mut self,
        generation: u64,
        result: Option<CompletionResult>,
    ) -> Option<Suffix> {
        self.clear();
        self.generation = generation;
        match result? {
            CompletionResult::Hint(text) => Some(Suffix {
                text,
                kind: SuffixKind::Hint,
            }),
            CompletionResult::Candidates(list) => {
                self.candidates = list;
                self.index = Some(0);
                self.current()
            }
        }
    }

    fn current(&self) -> Option<Suffix> {
        let text = self.candidates.get(self.index?)?.clone();
        Some(Suffix {
            text,
            kind: SuffixKind::Completion,
        })
    }

    /// Cycle the shown candidate. Stepping past either end shows nothing, the
    /// next step starts over. Candidates from an older generation are dropped.
    pub fn rotate(&mut self, generation: u64, step: isize) -> Option<Suffix> {
        if generation != self.generation {
            self.clear();
            return None;
        }
        let len = self.candidates.len();
        if len == 0 {
            return None;
        }
        self.index = match (self.index, step >= 0) {
            (None, true) => Some(0),
            (None, false) => Some(len - 1),
            (Some(i), true) if i + 1 < len => Some(i + 1),
            (Some(i), false) if i > 0 => Some(i - 1),
            (Some(_), _) => None,
        };
        self.current()
    }

    /// Turn a full-mode result into an insertion at the cursor or a listing.
    /// `typed` is the line up to the cursor, which prefixes every listed entry.
    pub fn resolve_full(
        &mut self,
        result: Option<CompletionResult>,
        typed: &str,
        columns: usize,
    ) -> FullOutcome {
        self.clear();
        match result {
            Some(CompletionResult::Candidates(mut list)) if list.len() == 1 => {
                FullOutcome::Insert(list.remove(0))
            }
            Some(CompletionResult::Candidates(list)) if list.len() > 1 => {
                let entries: Vec<String> = list.iter().map(|c| format!("{typed}{c}")).collect();
                FullOutcome::Listing(format_listing(&entries, columns))
            }
            _ => FullOutcome::Nothing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingGeometry {
    pub column_width: usize,
    pub columns: usize,
    pub rows: usize,
}

pub fn listing_geometry(widths: &[usize], terminal_width: usize) -> ListingGeometry {
    let column_width = widths.iter().copied().max().unwrap_or(0) + 2;
    let columns = (terminal_width / column_width).max(1);
    ListingGeometry {
        column_width,
        columns,
        rows: widths.len().div_ceil(columns),
    }
}

/// Lay `entries` out in columns below the input line.
///
/// The text starts on a fresh line and ends with an empty one, so the prompt
/// reappears below the table.
pub fn format_listing(entries: &[String], terminal_width: usize) -> String {
    let widths: Vec<usize> = entries.iter().map(|e| display_width(e)).collect();
    let geometry = listing_geometry(&widths, terminal_width);
    let mut out = String::from("\r\n");
    let mut in_row = 0;
    let mut padding = 0;
    for (entry, width) in entries.iter().zip(&widths) {
        if in_row == geometry.columns {
            out.push_str("\r\n");
            in_row = 0;
        } else {
            out.push_str(&" ".repeat(padding));
        }
        out.push_str(entry);
        padding = geometry.column_width - width;
        in_row += 1;
    }
    if in_row != 0 {
        out.push_str("\r\n\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tern_types::EvalError;

    struct Fixed(Result<Option<CompletionResult>, EvalError>);

    #[async_trait]
    impl Completer for Fixed {
        async fn complete(&self, _source: &str) -> Result<Option<CompletionResult>, EvalError> {
            self.0.clone()
        }
    }

    fn candidates(list: &[&str]) -> Option<CompletionResult> {
        Some(CompletionResult::Candidates(
            list.iter().map(|s| s.to_string()).collect(),
        ))
    }

    fn driver() -> AutocompleteDriver {
        AutocompleteDriver::new(Arc::new(Fixed(Ok(None))))
    }

    #[tokio::test]
    async fn test_errors_are_swallowed() {
        let completer = Fixed(Err(EvalError::Transport("closed".to_string())));
        assert_eq!(request_completions(&completer, "Math.").await, None);
    }

    #[tokio::test]
    async fn test_single_empty_candidate_is_none() {
        let completer = Fixed(Ok(candidates(&[""])));
        assert_eq!(request_completions(&completer, "Math").await, None);
        let completer = Fixed(Ok(candidates(&["x"])));
        assert_eq!(request_completions(&completer, "Math.ma").await, candidates(&["x"]));
    }

    #[test]
    fn test_partial_shows_first_candidate() {
        let mut driver = driver();
        let suffix = driver.apply_partial(3, candidates(&["x", "n"]));
        assert_eq!(suffix.map(|s| s.text), Some("x".to_string()));
    }

    #[test]
    fn test_hint_is_not_fillable() {
        let mut driver = driver();
        let suffix = driver.apply_partial(1, Some(CompletionResult::Hint(", exponent".into())));
        assert_eq!(suffix.map(|s| s.kind), Some(SuffixKind::Hint));
        assert!(driver.rotate(1, 1).is_none());
    }

    #[test]
    fn test_rotate_cycles_through_empty() {
        let mut driver = driver();
        driver.apply_partial(5, candidates(&["a", "b"]));
        let text = |s: Option<Suffix>| s.map(|s| s.text);
        assert_eq!(text(driver.rotate(5, 1)), Some("b".to_string()));
        assert_eq!(text(driver.rotate(5, 1)), None);
        assert_eq!(text(driver.rotate(5, 1)), Some("a".to_string()));
        assert_eq!(text(driver.rotate(5, -1)), None);
        assert_eq!(text(driver.rotate(5, -1)), Some("b".to_string()));
    }

    #[test]
    fn test_rotate_resets_on_new_generation() {
        let mut driver = driver();
        driver.apply_partial(5, candidates(&["a", "b"]));
        assert!(driver.rotate(6, 1).is_none());
        assert!(driver.candidates().is_empty());
    }

    #[test]
    fn test_full_single_candidate_inserts() {
        let mut driver = driver();
        assert_eq!(
            driver.resolve_full(candidates(&["ndom"]), "Math.ra", 80),
            FullOutcome::Insert("ndom".to_string())
        );
    }

    #[test]
    fn test_full_many_candidates_lists() {
        let mut driver = driver();
        let outcome = driver.resolve_full(candidates(&["x", "n"]), "Math.m", 80);
        assert_eq!(
            outcome,
            FullOutcome::Listing("\r\nMath.mx  Math.mn\r\n\r\n".to_string())
        );
    }

    #[test]
    fn test_listing_geometry() {
        let geometry = listing_geometry(&[3, 10, 3], 20);
        assert_eq!(geometry.column_width, 12);
        assert_eq!(geometry.columns, 1);
        assert_eq!(geometry.rows, 3);
    }

    #[test]
    fn test_listing_narrow_terminal_one_per_row() {
        let entries: Vec<String> = ["abc", "abcdefghij", "abd"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = format_listing(&entries, 20);
        assert_eq!(out, "\r\nabc\r\nabcdefghij\r\nabd\r\n\r\n");
    }

    #[test]
    fn test_listing_two_columns() {
        let entries: Vec<String> = ["ab", "cd"].iter().map(|s| s.to_string()).collect();
        // width 4, two columns fit in 8
        assert_eq!(format_listing(&entries, 8), "\r\nab  cd\r\n\r\n");
    }
}
