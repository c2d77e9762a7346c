use super::key_action::{KeyAction, KeyContext, determine_key_action};
use super::{EngineMode, ExitReason, Flow, InputEngine};
use crate::completion::CompletionMode;
use crate::input::decoder::{KeyEvent, KeyName};
use crate::input::editor::SuffixKind;
use crate::session::LineOutcome;
use anyhow::Result;
use std::io::Write;
use tracing::debug;

pub(crate) async fn handle_key_event<W: Write>(
    engine: &mut InputEngine<W>,
    key: KeyEvent,
) -> Result<Flow> {
    debug!(
        "KEY_EVENT_RECEIVED: name={:?}, ctrl={}, meta={}, seq={:?}",
        key.name, key.ctrl, key.meta, key.sequence
    );

    if engine.mode == EngineMode::ReverseSearch {
        return handle_search_key(engine, &key);
    }

    let ctx = KeyContext {
        cursor_at_end: engine.buffer.cursor_at_end(),
        input_empty: engine.buffer.is_empty(),
        has_completion: matches!(
            engine.buffer.suffix().map(|s| s.kind),
            Some(SuffixKind::Completion)
        ),
        has_suffix: engine.buffer.suffix().is_some(),
    };
    let action = determine_key_action(&key, &ctx);

    if action != KeyAction::Interrupt {
        engine.exit_guard.reset();
    }

    let buffer = &mut engine.buffer;
    match action {
        KeyAction::Insert(text) => {
            buffer.insert_text(&text);
            engine.history.reset_recall();
        }
        KeyAction::CursorLeft => {
            buffer.move_cursor(-1);
        }
        KeyAction::CursorRight => {
            buffer.move_cursor(1);
        }
        KeyAction::CursorWordLeft => {
            buffer.word_left();
        }
        KeyAction::CursorWordRight => {
            buffer.word_right();
        }
        KeyAction::CursorToBegin => {
            buffer.move_to_start();
        }
        KeyAction::CursorToEnd => {
            buffer.move_to_end();
        }
        KeyAction::Backspace => {
            buffer.delete_backward();
        }
        KeyAction::DeleteForward => {
            buffer.delete_forward();
        }
        KeyAction::DeleteWordBackward => {
            buffer.delete_word_backward();
        }
        KeyAction::DeleteToEnd => {
            buffer.clear_from_cursor();
        }
        KeyAction::DeleteToBeginning => {
            buffer.clear_to_cursor();
        }
        KeyAction::HistoryPrevious => {
            if let Some(line) = engine.history.previous() {
                let line = line.to_string();
                buffer.replace(line.as_str(), line.len());
            }
        }
        KeyAction::HistoryNext => {
            if let Some(line) = engine.history.next() {
                let line = line.to_string();
                buffer.replace(line.as_str(), line.len());
            }
        }
        KeyAction::HistorySearch => {
            engine.mode = EngineMode::ReverseSearch;
            engine.search = Default::default();
        }
        KeyAction::AcceptCompletion => {
            buffer.accept_suffix();
        }
        KeyAction::TriggerCompletion => {
            if !buffer.is_empty() {
                engine.request_completion(CompletionMode::Full);
            }
        }
        KeyAction::RotateSuggestionForward => {
            let suffix = engine.completion.rotate(buffer.generation(), 1);
            buffer.set_suffix(suffix);
        }
        KeyAction::RotateSuggestionBackward => {
            let suffix = engine.completion.rotate(buffer.generation(), -1);
            buffer.set_suffix(suffix);
        }
        KeyAction::DismissSuffix => {
            buffer.set_suffix(None);
        }
        KeyAction::Submit => return submit(engine).await,
        KeyAction::ClearScreen => {
            engine.screen.clear_screen()?;
        }
        KeyAction::Interrupt => return interrupt(engine),
        KeyAction::EndOfInput => {
            engine.screen.newline()?;
            engine.screen.flush()?;
            return Ok(Flow::Exit(ExitReason::EndOfInput));
        }
        KeyAction::Unsupported => {
            debug!("unsupported key: {:?}", key);
        }
    }
    Ok(Flow::Continue)
}

fn interrupt<W: Write>(engine: &mut InputEngine<W>) -> Result<Flow> {
    if !engine.buffer.statement().is_empty() {
        engine.exit_guard.reset();
        let prompt = engine.config.prompt.clone();
        engine.buffer.reset(prompt);
        engine.history.reset_recall();
        return Ok(Flow::Continue);
    }
    if engine.exit_guard.on_pressed() {
        engine.screen.newline()?;
        engine.screen.flush()?;
        return Ok(Flow::Exit(ExitReason::Interrupted));
    }
    engine.screen.newline()?;
    let message = format!("{}\n", engine.config.exit_confirm_message);
    engine.screen.print(&message)?;
    Ok(Flow::Continue)
}

async fn submit<W: Write>(engine: &mut InputEngine<W>) -> Result<Flow> {
    let statement = engine.buffer.statement();
    engine.buffer.set_suffix(None);
    engine.buffer.move_to_end();
    engine.render()?;
    engine.screen.newline()?;
    engine.screen.flush()?;

    if statement.trim().is_empty() {
        let prompt = engine.config.prompt.clone();
        engine.buffer.reset(prompt);
        return Ok(Flow::Continue);
    }

    engine.mode = EngineMode::Paused;
    let outcome = engine.line_handler.on_line(&statement).await;
    engine.mode = EngineMode::Normal;

    match outcome {
        LineOutcome::NeedsAnotherLine => {
            debug!("statement continues: {statement:?}");
            let prompt = engine.config.continuation_prompt.clone();
            engine.buffer.push_continuation(prompt);
        }
        LineOutcome::Output(text) => {
            engine.screen.print(&text)?;
            if !text.ends_with('\n') {
                engine.screen.newline()?;
            }
            engine.history.append(&statement);
            let prompt = engine.config.prompt.clone();
            engine.buffer.reset(prompt);
        }
    }
    engine.completion.clear();
    Ok(Flow::Continue)
}

fn handle_search_key<W: Write>(engine: &mut InputEngine<W>, key: &KeyEvent) -> Result<Flow> {
    match (key.name, key.ctrl, key.meta) {
        (KeyName::Text, false, false) => {
            engine.search.query.push_str(&key.sequence);
            engine.search.skip = 0;
        }
        (KeyName::Backspace, ..) => {
            engine.search.query.pop();
            engine.search.skip = 0;
        }
        (KeyName::Char('r'), true, false) => {
            engine.search.skip += 1;
        }
        (KeyName::Char('c' | 'g'), true, false) | (KeyName::Escape, ..) => {
            engine.mode = EngineMode::Normal;
            engine.search = Default::default();
            engine.buffer.clear();
            return Ok(Flow::Continue);
        }
        (KeyName::Char('d'), true, false)
            if engine.search.query.is_empty() && engine.buffer.statement().is_empty() =>
        {
            engine.mode = EngineMode::Normal;
            engine.search = Default::default();
            engine.screen.newline()?;
            engine.screen.flush()?;
            return Ok(Flow::Exit(ExitReason::EndOfInput));
        }
        _ => {
            // any other key accepts the match
            let matched = engine.search.matched.take().unwrap_or_default();
            engine.mode = EngineMode::Normal;
            engine.search = Default::default();
            let len = matched.len();
            engine.buffer.replace(matched, len);
            return Ok(Flow::Continue);
        }
    }
    update_search_match(engine);
    Ok(Flow::Continue)
}

fn update_search_match<W: Write>(engine: &mut InputEngine<W>) {
    let query = &engine.search.query;
    if query.is_empty() {
        engine.search.matched = None;
        return;
    }
    let matches: Vec<&str> = engine.history.matches(query).collect();
    if matches.is_empty() {
        engine.search.matched = None;
        return;
    }
    // stay on the oldest match once past it
    engine.search.skip = engine.search.skip.min(matches.len() - 1);
    engine.search.matched = matches.get(engine.search.skip).map(|s| s.to_string());
}
