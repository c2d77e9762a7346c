use crate::errors::ReplError;
use crate::history::DEFAULT_CAPACITY;
use anyhow::{Context as _, Result};
use crossterm::style::Color;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const APP_NAME: &str = "tern";
pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_FILE: &str = "history";
pub const LOG_FILE: &str = "tern.log";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub prompt: String,
    pub continuation_prompt: String,
    pub history_size: usize,
    pub history_file: Option<PathBuf>,
    /// `false` keeps history in memory only.
    pub persist_history: bool,
    pub eager_eval: bool,
    pub eager_timeout_ms: u64,
    pub preview_max_len: usize,
    pub ghost_color: String,
    pub match_color: String,
    pub exit_confirm_message: String,
    /// Printed once before the first prompt.
    pub heading: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            continuation_prompt: "... ".to_string(),
            history_size: DEFAULT_CAPACITY,
            history_file: None,
            persist_history: true,
            eager_eval: true,
            eager_timeout_ms: 250,
            preview_max_len: 120,
            ghost_color: "dark_grey".to_string(),
            match_color: "reset".to_string(),
            exit_confirm_message: "(To exit, press Ctrl+C again or Ctrl+D)".to_string(),
            heading: None,
        }
    }
}

impl EngineConfig {
    pub fn eager_timeout(&self) -> Duration {
        Duration::from_millis(self.eager_timeout_ms)
    }

    pub fn ghost_color(&self) -> Color {
        parse_color(&self.ghost_color, Color::DarkGrey)
    }

    pub fn match_color(&self) -> Color {
        parse_color(&self.match_color, Color::Reset)
    }

    /// Configured history file, or the per-user default.
    pub fn history_path(&self) -> Result<PathBuf> {
        match &self.history_file {
            Some(path) => Ok(path.clone()),
            None => get_data_file(HISTORY_FILE),
        }
    }

    pub fn read(path: &Path) -> Result<Self, ReplError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReplError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ReplError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path`, falling back to defaults when it is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::read(path) {
            Ok(config) => config,
            Err(ReplError::ConfigRead { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => {
                warn!("{err}; using defaults");
                Self::default()
            }
        }
    }
}

fn parse_color(name: &str, fallback: Color) -> Color {
    if name.eq_ignore_ascii_case("reset") {
        return Color::Reset;
    }
    Color::try_from(name).unwrap_or_else(|_| {
        warn!("unknown colour {name:?}");
        fallback
    })
}

pub fn get_config_file(name: &str) -> Result<PathBuf> {
    let xdg_dir =
        xdg::BaseDirectories::with_prefix(APP_NAME).context("failed get xdg directory")?;
    Ok(xdg_dir.get_config_home().join(name))
}

pub fn get_data_file(name: &str) -> Result<PathBuf> {
    let xdg_dir =
        xdg::BaseDirectories::with_prefix(APP_NAME).context("failed get xdg directory")?;
    xdg_dir.place_data_file(name).context("failed get path")
}

pub fn get_state_file(name: &str) -> Result<PathBuf> {
    let xdg_dir =
        xdg::BaseDirectories::with_prefix(APP_NAME).context("failed get xdg directory")?;
    xdg_dir.place_state_file(name).context("failed get path")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        init();
        let config = EngineConfig::load_or_default(Path::new("/nonexistent/tern/config.json"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "prompt": "tern> ", "eager_eval": false }"#)?;
        let config = EngineConfig::load_or_default(&path);
        assert_eq!(config.prompt, "tern> ");
        assert!(!config.eager_eval);
        assert_eq!(config.continuation_prompt, "... ");
        assert_eq!(config.history_size, DEFAULT_CAPACITY);
        Ok(())
    }

    #[test]
    fn test_malformed_file_gives_defaults() -> Result<()> {
        init();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ prompt: ")?;
        assert!(matches!(
            EngineConfig::read(&path),
            Err(ReplError::ConfigParse { .. })
        ));
        assert_eq!(EngineConfig::load_or_default(&path), EngineConfig::default());
        Ok(())
    }

    #[test]
    fn test_colors() {
        let config = EngineConfig {
            ghost_color: "dark_cyan".to_string(),
            match_color: "not a colour".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(config.ghost_color(), Color::DarkCyan);
        assert_eq!(config.match_color(), Color::Reset);
    }
}
