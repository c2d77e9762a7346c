//! Key events to editing actions, as a pure function of the key and a
//! snapshot of the buffer, so the mapping can be tested without a terminal.

use crate::input::decoder::{KeyEvent, KeyName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    // cursor
    CursorLeft,
    CursorRight,
    CursorWordLeft,
    CursorWordRight,
    CursorToBegin,
    CursorToEnd,

    // history
    HistoryPrevious,
    HistoryNext,
    HistorySearch,

    // editing
    Insert(String),
    Backspace,
    DeleteForward,
    DeleteWordBackward,
    DeleteToEnd,
    DeleteToBeginning,

    // completion
    TriggerCompletion,
    AcceptCompletion,
    RotateSuggestionForward,
    RotateSuggestionBackward,
    DismissSuffix,

    Submit,
    ClearScreen,
    Interrupt,
    EndOfInput,

    Unsupported,
}

/// Buffer state the mapping depends on.
#[derive(Debug, Clone, Default)]
pub struct KeyContext {
    pub cursor_at_end: bool,
    pub input_empty: bool,
    /// A completion suffix that `Right` can accept is showing.
    pub has_completion: bool,
    /// Any suffix is showing.
    pub has_suffix: bool,
}

pub fn determine_key_action(key: &KeyEvent, ctx: &KeyContext) -> KeyAction {
    match (key.name, key.ctrl, key.meta) {
        (KeyName::Text, false, false) => KeyAction::Insert(key.sequence.clone()),

        (KeyName::Return | KeyName::Enter, _, false) => KeyAction::Submit,

        (KeyName::Up, false, false) | (KeyName::Char('p'), true, false) => {
            KeyAction::HistoryPrevious
        }
        (KeyName::Down, false, false) | (KeyName::Char('n'), true, false) => {
            KeyAction::HistoryNext
        }
        (KeyName::Char('r'), true, false) => KeyAction::HistorySearch,

        (KeyName::Left, true, _) | (KeyName::Left, _, true) | (KeyName::Char('b'), false, true) => {
            KeyAction::CursorWordLeft
        }
        (KeyName::Right, true, _)
        | (KeyName::Right, _, true)
        | (KeyName::Char('f'), false, true) => KeyAction::CursorWordRight,
        (KeyName::Left, false, false) | (KeyName::Char('b'), true, false) => KeyAction::CursorLeft,
        (KeyName::Right, false, false) | (KeyName::Char('f'), true, false)
            if ctx.has_completion && ctx.cursor_at_end =>
        {
            KeyAction::AcceptCompletion
        }
        (KeyName::Right, false, false) | (KeyName::Char('f'), true, false) => {
            KeyAction::CursorRight
        }
        (KeyName::Home, ..) | (KeyName::Char('a'), true, false) => KeyAction::CursorToBegin,
        (KeyName::End, ..) | (KeyName::Char('e'), true, false) => KeyAction::CursorToEnd,

        (KeyName::Backspace, _, false) | (KeyName::Char('h'), true, false) => KeyAction::Backspace,
        (KeyName::Backspace, _, true) | (KeyName::Char('w'), true, false) => {
            KeyAction::DeleteWordBackward
        }
        (KeyName::Delete, ..) => KeyAction::DeleteForward,
        (KeyName::Char('d'), true, false) if ctx.input_empty => KeyAction::EndOfInput,
        (KeyName::Char('d'), true, false) => KeyAction::DeleteForward,
        (KeyName::Char('k'), true, false) => KeyAction::DeleteToEnd,
        (KeyName::Char('u'), true, false) => KeyAction::DeleteToBeginning,

        (KeyName::Tab, false, false) => KeyAction::TriggerCompletion,
        (KeyName::Char(']'), false, true) => KeyAction::RotateSuggestionForward,
        (KeyName::Char('['), false, true) => KeyAction::RotateSuggestionBackward,
        (KeyName::Escape, ..) if ctx.has_suffix => KeyAction::DismissSuffix,

        (KeyName::Char('c'), true, false) => KeyAction::Interrupt,
        (KeyName::Char('l'), true, false) => KeyAction::ClearScreen,

        _ => KeyAction::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: KeyName, ctrl: bool, meta: bool) -> KeyEvent {
        KeyEvent {
            ctrl,
            meta,
            ..KeyEvent::new(name, "")
        }
    }

    fn ctx_default() -> KeyContext {
        KeyContext {
            cursor_at_end: true,
            input_empty: false,
            has_completion: false,
            has_suffix: false,
        }
    }

    #[test]
    fn test_text_inserts() {
        let k = KeyEvent::text("1 + 1");
        assert_eq!(
            determine_key_action(&k, &ctx_default()),
            KeyAction::Insert("1 + 1".to_string())
        );
    }

    #[test]
    fn test_return_and_enter_submit() {
        for name in [KeyName::Return, KeyName::Enter] {
            assert_eq!(
                determine_key_action(&key(name, false, false), &ctx_default()),
                KeyAction::Submit
            );
        }
    }

    #[test]
    fn test_ctrl_a_moves_to_begin() {
        let k = key(KeyName::Char('a'), true, false);
        assert_eq!(
            determine_key_action(&k, &ctx_default()),
            KeyAction::CursorToBegin
        );
    }

    #[test]
    fn test_ctrl_e_moves_to_end() {
        let k = key(KeyName::Char('e'), true, false);
        assert_eq!(
            determine_key_action(&k, &ctx_default()),
            KeyAction::CursorToEnd
        );
    }

    #[test]
    fn test_right_accepts_completion_at_end() {
        let ctx = KeyContext {
            has_completion: true,
            has_suffix: true,
            ..ctx_default()
        };
        let k = key(KeyName::Right, false, false);
        assert_eq!(determine_key_action(&k, &ctx), KeyAction::AcceptCompletion);
    }

    #[test]
    fn test_right_moves_when_not_at_end() {
        let ctx = KeyContext {
            has_completion: true,
            cursor_at_end: false,
            ..ctx_default()
        };
        let k = key(KeyName::Right, false, false);
        assert_eq!(determine_key_action(&k, &ctx), KeyAction::CursorRight);
    }

    #[test]
    fn test_word_movement() {
        let ctx = ctx_default();
        assert_eq!(
            determine_key_action(&key(KeyName::Left, true, false), &ctx),
            KeyAction::CursorWordLeft
        );
        assert_eq!(
            determine_key_action(&key(KeyName::Char('f'), false, true), &ctx),
            KeyAction::CursorWordRight
        );
    }

    #[test]
    fn test_ctrl_d_on_empty_ends_input() {
        let ctx = KeyContext {
            input_empty: true,
            ..ctx_default()
        };
        let k = key(KeyName::Char('d'), true, false);
        assert_eq!(determine_key_action(&k, &ctx), KeyAction::EndOfInput);
        assert_eq!(
            determine_key_action(&k, &ctx_default()),
            KeyAction::DeleteForward
        );
    }

    #[test]
    fn test_ctrl_c_interrupt() {
        let k = key(KeyName::Char('c'), true, false);
        assert_eq!(determine_key_action(&k, &ctx_default()), KeyAction::Interrupt);
    }

    #[test]
    fn test_ctrl_r_search() {
        let k = key(KeyName::Char('r'), true, false);
        assert_eq!(
            determine_key_action(&k, &ctx_default()),
            KeyAction::HistorySearch
        );
    }

    #[test]
    fn test_tab_and_rotation() {
        let ctx = ctx_default();
        assert_eq!(
            determine_key_action(&key(KeyName::Tab, false, false), &ctx),
            KeyAction::TriggerCompletion
        );
        assert_eq!(
            determine_key_action(&key(KeyName::Char(']'), false, true), &ctx),
            KeyAction::RotateSuggestionForward
        );
        assert_eq!(
            determine_key_action(&key(KeyName::Char('['), false, true), &ctx),
            KeyAction::RotateSuggestionBackward
        );
    }

    #[test]
    fn test_escape_dismisses_only_with_suffix() {
        let k = key(KeyName::Escape, false, false);
        assert_eq!(
            determine_key_action(&k, &ctx_default()),
            KeyAction::Unsupported
        );
        let ctx = KeyContext {
            has_suffix: true,
            ..ctx_default()
        };
        assert_eq!(determine_key_action(&k, &ctx), KeyAction::DismissSuffix);
    }

    #[test]
    fn test_history_keys() {
        let ctx = ctx_default();
        assert_eq!(
            determine_key_action(&key(KeyName::Up, false, false), &ctx),
            KeyAction::HistoryPrevious
        );
        assert_eq!(
            determine_key_action(&key(KeyName::Char('n'), true, false), &ctx),
            KeyAction::HistoryNext
        );
    }
}
