use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("input engine is already running")]
    AlreadyRunning,
}

/// Display error in a user-friendly format without stack traces.
pub fn display_user_error(err: &anyhow::Error) {
    debug!("fatal: {err:?}");
    eprintln!("{}", user_message(err));
}

pub fn user_message(err: &anyhow::Error) -> String {
    format!("tern: {err:#}")
}
