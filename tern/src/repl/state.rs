use crate::completion::CompletionMode;
use tern_types::CompletionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Normal,
    ReverseSearch,
    /// An accepted line is being evaluated; input is held back.
    Paused,
}

/// Results of background work, tagged with the buffer generation they were computed for.
#[derive(Debug)]
pub enum AsyncEvent {
    Completion {
        generation: u64,
        mode: CompletionMode,
        result: Option<CompletionResult>,
    },
    Preview {
        generation: u64,
        text: Option<String>,
    },
    HistoryLoaded(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Interrupt pressed twice in a row on an empty buffer.
    Interrupted,
    /// End of input on an empty buffer, or the input stream closed.
    EndOfInput,
}

/// Whether the engine keeps going after handling a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(ExitReason),
}

/// Confirmation for leaving with the interrupt key: the first press on an
/// empty buffer arms it, a second consecutive press confirms.
#[derive(Debug, Default)]
pub struct ExitGuard {
    armed: bool,
}

impl ExitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this press confirms the exit.
    pub fn on_pressed(&mut self) -> bool {
        if self.armed {
            self.armed = false;
            return true;
        }
        self.armed = true;
        false
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn reset(&mut self) {
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_guard_single_press() {
        let mut guard = ExitGuard::new();
        assert!(!guard.on_pressed());
        assert!(guard.is_armed());
    }

    #[test]
    fn test_exit_guard_double_press() {
        let mut guard = ExitGuard::new();
        assert!(!guard.on_pressed());
        assert!(guard.on_pressed());
        assert!(!guard.is_armed());
    }

    #[test]
    fn test_exit_guard_reset() {
        let mut guard = ExitGuard::new();
        assert!(!guard.on_pressed());
        guard.reset();
        assert!(!guard.on_pressed());
    }
}
