use crate::completion::{AutocompleteDriver, CompletionMode, FullOutcome, request_completions};
use crate::config::EngineConfig;
use crate::eager::EagerEvaluator;
use crate::errors::ReplError;
use crate::history::HistoryStore;
use crate::input::decoder::{ESCAPE_TIMEOUT, KeyDecoder};
use crate::input::editor::{EditBuffer, Suffix, SuffixKind};
use crate::session::LineHandler;
use crate::terminal::{Frame, Screen};
use anyhow::{Context as _, Result};
use std::io::{Stdout, Write};
use std::sync::Arc;
use tern_types::{Completer, Highlighter};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::debug;

mod handler;
pub mod key_action;
mod state;

pub use state::{AsyncEvent, EngineMode, ExitGuard, ExitReason, Flow};

/// The capabilities the engine drives while the user types.
pub struct Capabilities {
    pub completer: Arc<dyn Completer>,
    pub highlighter: Arc<dyn Highlighter>,
    /// `None` turns previews off.
    pub eager: Option<EagerEvaluator>,
}

#[derive(Debug, Default)]
pub(crate) struct SearchState {
    pub(crate) query: String,
    /// Matches skipped with repeated Ctrl-R.
    pub(crate) skip: usize,
    pub(crate) matched: Option<String>,
}

/// Turns terminal input into edits, background requests and repaints.
pub struct InputEngine<W: Write = Stdout> {
    pub(crate) config: EngineConfig,
    pub(crate) buffer: EditBuffer,
    pub(crate) decoder: KeyDecoder,
    pub(crate) history: HistoryStore,
    pub(crate) completion: AutocompleteDriver,
    pub(crate) eager: Option<EagerEvaluator>,
    pub(crate) highlighter: Arc<dyn Highlighter>,
    pub(crate) line_handler: Box<dyn LineHandler>,
    pub(crate) screen: Screen<W>,
    pub(crate) mode: EngineMode,
    pub(crate) search: SearchState,
    pub(crate) exit_guard: ExitGuard,
    /// Generation the background work was last started for.
    pub(crate) scheduled: Option<u64>,
    events_tx: mpsc::UnboundedSender<AsyncEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<AsyncEvent>>,
}

impl<W: Write> InputEngine<W> {
    pub fn new(
        config: EngineConfig,
        capabilities: Capabilities,
        line_handler: Box<dyn LineHandler>,
        history: HistoryStore,
        mut screen: Screen<W>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        screen.set_colors(config.ghost_color(), config.match_color());
        Self {
            buffer: EditBuffer::new(config.prompt.clone()),
            decoder: KeyDecoder::new(),
            history,
            completion: AutocompleteDriver::new(capabilities.completer),
            eager: capabilities.eager,
            highlighter: capabilities.highlighter,
            line_handler,
            screen,
            mode: EngineMode::Normal,
            search: SearchState::default(),
            exit_guard: ExitGuard::new(),
            scheduled: None,
            events_tx,
            events_rx: Some(events_rx),
            config,
        }
    }

    /// Sender for results produced outside the engine, e.g. the history loader.
    pub fn events(&self) -> mpsc::UnboundedSender<AsyncEvent> {
        self.events_tx.clone()
    }

    pub fn buffer(&self) -> &EditBuffer {
        &self.buffer
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn screen_mut(&mut self) -> &mut Screen<W> {
        &mut self.screen
    }

    /// Process one chunk of terminal input and repaint once at the end.
    pub async fn feed(&mut self, bytes: &[u8]) -> Result<Flow> {
        let keys = self.decoder.feed(bytes);
        for key in keys {
            if let Flow::Exit(reason) = handler::handle_key_event(self, key).await? {
                return Ok(Flow::Exit(reason));
            }
        }
        self.refresh()?;
        Ok(Flow::Continue)
    }

    /// Called when no byte followed a pending escape within [`ESCAPE_TIMEOUT`].
    pub async fn flush_pending_escape(&mut self) -> Result<Flow> {
        for key in self.decoder.flush() {
            if let Flow::Exit(reason) = handler::handle_key_event(self, key).await? {
                return Ok(Flow::Exit(reason));
            }
        }
        self.refresh()?;
        Ok(Flow::Continue)
    }

    /// Wait for the next background result. Only useful when not inside [`InputEngine::run`].
    pub async fn next_event(&mut self) -> Option<AsyncEvent> {
        self.events_rx.as_mut()?.recv().await
    }

    pub(crate) fn render(&mut self) -> Result<()> {
        if self.mode == EngineMode::ReverseSearch {
            let highlighted = self
                .search
                .matched
                .as_deref()
                .map(|line| self.highlighter.highlight(line));
            self.screen
                .render_search(highlighted.as_deref(), &self.search.query)?;
        } else {
            let highlighted = self.highlighter.highlight(self.buffer.text());
            let frame = Frame {
                prefix: self.buffer.prefix(),
                highlighted: &highlighted,
                before_cursor: self.buffer.before_cursor(),
                suffix: self.buffer.suffix(),
            };
            self.screen.render(&frame)?;
        }
        self.screen.flush().context("failed to write to terminal")
    }

    /// Repaint, then start background work if the buffer changed since last time.
    pub(crate) fn refresh(&mut self) -> Result<()> {
        self.render()?;
        self.schedule_background();
        Ok(())
    }

    fn source_to_cursor(&self) -> String {
        format!("{}{}", self.buffer.accumulator(), self.buffer.before_cursor())
    }

    fn schedule_background(&mut self) {
        if self.mode != EngineMode::Normal {
            return;
        }
        let generation = self.buffer.generation();
        if self.scheduled == Some(generation) {
            return;
        }
        self.scheduled = Some(generation);
        self.completion.clear();
        if self.buffer.is_empty() {
            return;
        }
        if self.buffer.cursor_at_end() {
            self.request_completion(CompletionMode::Partial);
        } else {
            self.request_preview();
        }
    }

    pub(crate) fn request_completion(&self, mode: CompletionMode) {
        let generation = self.buffer.generation();
        let source = self.source_to_cursor();
        let completer = self.completion.completer();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = request_completions(completer.as_ref(), &source).await;
            let _ = tx.send(AsyncEvent::Completion {
                generation,
                mode,
                result,
            });
        });
    }

    fn request_preview(&self) {
        let Some(eager) = self.eager.clone() else {
            return;
        };
        let generation = self.buffer.generation();
        let source = self.buffer.statement();
        let width = self
            .config
            .preview_max_len
            .min(self.screen.columns().saturating_sub(1));
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let text = eager.preview(&source, width).await;
            let _ = tx.send(AsyncEvent::Preview { generation, text });
        });
    }

    /// Apply a background result, unless the buffer has moved on since it was requested.
    pub fn handle_async_event(&mut self, event: AsyncEvent) -> Result<()> {
        let generation = match &event {
            AsyncEvent::HistoryLoaded(_) => None,
            AsyncEvent::Completion { generation, .. } | AsyncEvent::Preview { generation, .. } => {
                Some(*generation)
            }
        };
        if let Some(generation) = generation
            && (generation != self.buffer.generation() || self.mode != EngineMode::Normal)
        {
            debug!(
                "discarding stale result for generation {generation}, buffer is at {}",
                self.buffer.generation()
            );
            return Ok(());
        }

        match event {
            AsyncEvent::HistoryLoaded(entries) => {
                debug!("history loaded: {} entries", entries.len());
                self.history.install(entries);
                Ok(())
            }
            AsyncEvent::Completion {
                generation,
                mode: CompletionMode::Partial,
                result,
            } => match self.completion.apply_partial(generation, result) {
                Some(suffix) => {
                    self.buffer.set_suffix(Some(suffix));
                    self.render()
                }
                None => {
                    self.request_preview();
                    Ok(())
                }
            },
            AsyncEvent::Completion {
                mode: CompletionMode::Full,
                result,
                ..
            } => {
                let columns = self.screen.columns();
                match self
                    .completion
                    .resolve_full(result, self.buffer.before_cursor(), columns)
                {
                    FullOutcome::Insert(text) => {
                        self.buffer.insert_text(&text);
                        self.refresh()
                    }
                    FullOutcome::Listing(listing) => {
                        self.show_listing(&listing)?;
                        self.render()
                    }
                    FullOutcome::Nothing => Ok(()),
                }
            }
            AsyncEvent::Preview { text, .. } => {
                if self.buffer.suffix().is_some() {
                    return Ok(());
                }
                match text.filter(|t| !t.is_empty()) {
                    Some(text) => {
                        self.buffer.set_suffix(Some(Suffix {
                            text,
                            kind: SuffixKind::Preview,
                        }));
                        self.render()
                    }
                    None => Ok(()),
                }
            }
        }
    }

    /// Print a candidate table below the input; the input is redrawn under it.
    fn show_listing(&mut self, listing: &str) -> Result<()> {
        let suffix = self.buffer.suffix().cloned();
        self.buffer.set_suffix(None);
        self.render()?;
        self.buffer.set_suffix(suffix);
        self.screen.print(listing)?;
        Ok(())
    }

    /// Drive the engine until the user leaves or input ends.
    pub async fn run(&mut self, mut input: mpsc::UnboundedReceiver<Vec<u8>>) -> Result<ExitReason> {
        let mut events = self.events_rx.take().ok_or(ReplError::AlreadyRunning)?;
        let mut resized =
            signal(SignalKind::window_change()).context("failed to watch terminal size")?;
        self.refresh()?;
        loop {
            let escape_pending = self.decoder.is_pending();
            let flow = tokio::select! {
                chunk = input.recv() => match chunk {
                    Some(bytes) => self.feed(&bytes).await?,
                    None => Flow::Exit(ExitReason::EndOfInput),
                },
                Some(event) = events.recv() => {
                    self.handle_async_event(event)?;
                    Flow::Continue
                }
                _ = tokio::time::sleep(ESCAPE_TIMEOUT), if escape_pending => {
                    self.flush_pending_escape().await?
                }
                _ = resized.recv() => {
                    if let Ok((columns, _)) = crossterm::terminal::size() {
                        self.screen.set_columns(columns as usize);
                    }
                    self.render()?;
                    Flow::Continue
                }
            };
            if let Flow::Exit(reason) = flow {
                debug!("input engine exiting: {reason:?}");
                self.events_rx = Some(events);
                return Ok(reason);
            }
        }
    }
}
