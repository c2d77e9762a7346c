use crate::config::{CONFIG_FILE, EngineConfig, LOG_FILE, get_config_file, get_state_file};
use crate::eager::EagerEvaluator;
use crate::errors::display_user_error;
use crate::history::HistoryStore;
use crate::repl::{AsyncEvent, Capabilities, ExitReason, InputEngine};
use crate::session::ReplSession;
use crate::terminal::Screen;
use anyhow::{Context as _, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tern_script::{ScriptCompleter, ScriptEvaluator, ScriptHighlighter};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

pub mod completion;
pub mod config;
pub mod eager;
pub mod errors;
pub mod history;
pub mod input;
pub mod repl;
pub mod session;
pub mod terminal;

/// Time budget for completion lookups that evaluate the buffer.
const COMPLETION_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read settings from this file instead of the per-user config
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep history in memory only
    #[arg(long)]
    pub no_history: bool,

    /// Do not preview results while typing
    #[arg(long)]
    pub no_eager: bool,

    /// Line printed before the first prompt
    #[arg(long)]
    pub heading: Option<String>,
}

pub fn lib_main() -> ExitCode {
    if let Err(err) = init_tracing() {
        eprintln!("Failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }

    setup_panic_handler();

    let cli = Cli::parse();
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let result = rt.block_on(run_interactive(cli));
    // the stdin reader blocks in a read that cannot be cancelled
    rt.shutdown_background();
    match result {
        Ok(reason) => {
            debug!("exit: {reason:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            display_user_error(&err);
            ExitCode::FAILURE
        }
    }
}

pub fn init_tracing() -> Result<()> {
    let path = get_state_file(LOG_FILE)?;
    let log_file = Arc::new(
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?,
    );
    let filter = EnvFilter::try_from_env("TERN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .init();
    Ok(())
}

/// Leave raw mode before the default report is printed, and keep a copy in the log.
pub fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = crossterm::terminal::disable_raw_mode();

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();

        // the subscriber may not be installed when the panic happens early
        if let Ok(path) = get_state_file(LOG_FILE)
            && let Ok(mut file) = std::fs::OpenOptions::new().append(true).open(path)
        {
            let now = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S");
            let _ = writeln!(file, "{now} panic at {location}: {message}");
        }
        tracing::error!("panic at {location}: {message}");
        default_hook(panic_info);
    }));
}

/// Leaves raw mode when dropped, whichever way the session ends.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("failed to enter raw mode")?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = crossterm::terminal::disable_raw_mode() {
            warn!("failed to leave raw mode: {err}");
        }
    }
}

fn load_config(cli: &Cli) -> EngineConfig {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => get_config_file(CONFIG_FILE)
            .inspect_err(|err| warn!("no config location: {err:#}"))
            .ok(),
    };
    let mut config = path
        .map(|path| EngineConfig::load_or_default(&path))
        .unwrap_or_default();
    if cli.no_history {
        config.persist_history = false;
    }
    if cli.no_eager {
        config.eager_eval = false;
    }
    if cli.heading.is_some() {
        config.heading = cli.heading.clone();
    }
    config
}

/// Console output arrives while raw mode is on, so line feeds need a carriage return.
fn write_console(text: &str) {
    let mut out = io::stdout();
    let _ = write!(out, "{}\r\n", text.replace('\n', "\r\n"));
    let _ = out.flush();
}

fn open_history(config: &EngineConfig) -> (HistoryStore, Option<PathBuf>) {
    if !config.persist_history {
        return (HistoryStore::new(config.history_size), None);
    }
    match config.history_path() {
        Ok(path) => {
            let mut history = HistoryStore::with_file(&path, config.history_size);
            history.start_background_writer();
            (history, Some(path))
        }
        Err(err) => {
            warn!("history kept in memory only: {err:#}");
            (HistoryStore::new(config.history_size), None)
        }
    }
}

pub async fn run_interactive(cli: Cli) -> Result<ExitReason> {
    let config = load_config(&cli);
    info!("starting tern, eager preview: {}", config.eager_eval);

    let evaluator = Arc::new(ScriptEvaluator::with_console(Arc::new(write_console)));
    let completer = Arc::new(ScriptCompleter::new(
        Arc::clone(&evaluator),
        COMPLETION_TIMEOUT,
    ));
    let eager = config
        .eager_eval
        .then(|| EagerEvaluator::new(evaluator.clone(), config.eager_timeout()));
    let capabilities = Capabilities {
        completer,
        highlighter: Arc::new(ScriptHighlighter),
        eager,
    };
    let session = ReplSession::new(evaluator);

    let (history, history_path) = open_history(&config);
    let (columns, _) = crossterm::terminal::size().context("failed to read terminal size")?;
    let heading = config.heading.clone();
    let mut engine = InputEngine::new(
        config,
        capabilities,
        Box::new(session),
        history,
        Screen::stdout(columns as usize),
    );

    if let Some(path) = history_path {
        let events = engine.events();
        let capacity = engine.config.history_size;
        tokio::task::spawn_blocking(move || {
            let entries = HistoryStore::load(&path, capacity);
            let _ = events.send(AsyncEvent::HistoryLoaded(entries));
        });
    }

    let _raw = RawModeGuard::enable()?;
    if let Some(heading) = heading {
        engine.screen_mut().print(&format!("{heading}\n"))?;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            }
        }
    });

    engine.run(rx).await
}
