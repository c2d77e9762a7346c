//! Accepted lines, most recent first, mirrored to a plain text file.
//!
//! Persistence is best effort. The first I/O error turns it off for the rest
//! of the session and history keeps working in memory.

use anyhow::{Context as _, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, warn};

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct HistoryStore {
    entries: Vec<String>,
    capacity: usize,
    path: Option<PathBuf>,
    persist: Arc<AtomicBool>,
    sender: Option<mpsc::Sender<Vec<String>>>,
    /// Index of the entry currently recalled into the buffer.
    recall: Option<usize>,
    /// Writes wait until the file contents have been merged in.
    loaded: bool,
}

impl HistoryStore {
    /// In-memory only history.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            path: None,
            persist: Arc::new(AtomicBool::new(false)),
            sender: None,
            recall: None,
            loaded: true,
        }
    }

    /// History backed by `path`. Nothing is written until [`HistoryStore::install`]
    /// hands over the lines already in the file.
    pub fn with_file(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: Some(path.into()),
            persist: Arc::new(AtomicBool::new(true)),
            loaded: false,
            ..Self::new(capacity)
        }
    }

    /// Read up to `capacity` lines from `path`. A missing or unreadable file yields nothing.
    pub fn load(path: &Path, capacity: usize) -> Vec<String> {
        match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .take(capacity)
                .map(str::to_string)
                .collect(),
            Err(err) => {
                debug!("history not loaded from {}: {err}", path.display());
                Vec::new()
            }
        }
    }

    /// Merge lines loaded in the background behind anything accepted meanwhile.
    pub fn install(&mut self, loaded: Vec<String>) {
        let accepted_meanwhile = !self.entries.is_empty();
        self.entries.extend(loaded);
        self.entries.truncate(self.capacity);
        self.loaded = true;
        if accepted_meanwhile {
            self.save();
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some() && self.persist.load(Ordering::Relaxed)
    }

    /// Hand writes to a dedicated thread so the input loop never waits on disk.
    pub fn start_background_writer(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        let (tx, rx) = mpsc::channel::<Vec<String>>();
        let persist = Arc::clone(&self.persist);
        let spawned = thread::Builder::new()
            .name("tern-history".to_string())
            .spawn(move || {
                while let Ok(entries) = rx.recv() {
                    if !persist.load(Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(err) = write_file(&path, &entries) {
                        warn!("history persistence disabled: {err:#}");
                        persist.store(false, Ordering::Relaxed);
                    }
                }
            });
        match spawned {
            Ok(_) => self.sender = Some(tx),
            Err(err) => warn!("history writer thread not started: {err}"),
        }
    }

    pub fn append(&mut self, line: &str) {
        let line = line.replace(['\r', '\n'], " ");
        if line.trim().is_empty() {
            return;
        }
        self.entries.insert(0, line);
        self.entries.truncate(self.capacity);
        self.recall = None;
        self.save();
    }

    fn save(&mut self) {
        if !self.loaded || !self.is_persistent() {
            return;
        }
        if let Some(sender) = &self.sender {
            if sender.send(self.entries.clone()).is_ok() {
                return;
            }
            self.sender = None;
        }
        if let Some(path) = &self.path
            && let Err(err) = write_file(path, &self.entries)
        {
            warn!("history persistence disabled: {err:#}");
            self.persist.store(false, Ordering::Relaxed);
        }
    }

    /// Entries containing `needle`, most recent first.
    pub fn matches<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.contains(needle))
            .map(String::as_str)
    }

    pub fn search<'a>(&'a self, needle: &'a str) -> Option<&'a str> {
        self.matches(needle).next()
    }

    /// Step to the next older entry. Stays on the oldest one.
    pub fn previous(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match self.recall {
            None => 0,
            Some(i) => (i + 1).min(self.entries.len() - 1),
        };
        self.recall = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    /// Step to the next newer entry. `Some("")` once past the newest.
    pub fn next(&mut self) -> Option<&str> {
        match self.recall {
            None => None,
            Some(0) => {
                self.recall = None;
                Some("")
            }
            Some(i) => {
                self.recall = Some(i - 1);
                self.entries.get(i - 1).map(String::as_str)
            }
        }
    }

    pub fn reset_recall(&mut self) {
        self.recall = None;
    }
}

fn write_file(path: &Path, entries: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut content = entries.join("\n");
    content.push('\n');
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn opened(path: &Path, capacity: usize) -> HistoryStore {
        let mut history = HistoryStore::with_file(path, capacity);
        history.install(HistoryStore::load(path, capacity));
        history
    }

    #[test]
    fn test_append_then_load_in_new_session() -> Result<()> {
        init();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("history");
        let mut history = opened(&path, DEFAULT_CAPACITY);
        history.append("1 + 1");
        history.append("Math.max(1,\n2)");

        let loaded = HistoryStore::load(&path, DEFAULT_CAPACITY);
        assert_eq!(loaded[0], "Math.max(1, 2)");
        assert_eq!(loaded[1], "1 + 1");
        Ok(())
    }

    #[test]
    fn test_file_is_private() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("history");
        let mut history = opened(&path, DEFAULT_CAPACITY);
        history.append("secret");
        let mode = fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn test_lines_accepted_before_load_keep_old_history() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("history");
        fs::write(&path, "old 1\nold 2\n")?;
        let mut history = HistoryStore::with_file(&path, DEFAULT_CAPACITY);
        history.append("1 + 1");
        assert_eq!(HistoryStore::load(&path, 10), ["old 1", "old 2"]);

        history.install(HistoryStore::load(&path, DEFAULT_CAPACITY));
        assert_eq!(HistoryStore::load(&path, 10), ["1 + 1", "old 1", "old 2"]);
        Ok(())
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let loaded = HistoryStore::load(Path::new("/nonexistent/tern/history"), 10);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_write_failure_disables_persistence() -> Result<()> {
        init();
        let dir = tempfile::tempdir()?;
        // a directory where the file should be
        let path = dir.path().join("history");
        fs::create_dir(&path)?;
        let mut history = opened(&path, DEFAULT_CAPACITY);
        history.append("1");
        assert!(!history.is_persistent());
        history.append("2");
        assert_eq!(history.entries(), ["2", "1"]);
        Ok(())
    }

    #[test]
    fn test_capacity_and_load_bound() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("history");
        let mut history = opened(&path, 3);
        for i in 0..5 {
            history.append(&i.to_string());
        }
        assert_eq!(history.entries(), ["4", "3", "2"]);
        assert_eq!(HistoryStore::load(&path, 2), ["4", "3"]);
        Ok(())
    }

    #[test]
    fn test_search_most_recent_first() {
        let mut history = HistoryStore::new(DEFAULT_CAPACITY);
        history.append("let alpha = 1");
        history.append("let beta = 2");
        history.append("alpha + beta");
        assert_eq!(history.search("alpha"), Some("alpha + beta"));
        assert_eq!(history.search("= 1"), Some("let alpha = 1"));
        assert_eq!(history.search("gamma"), None);
    }

    #[test]
    fn test_recall_walks_and_returns_to_empty() {
        let mut history = HistoryStore::new(DEFAULT_CAPACITY);
        history.append("a");
        history.append("b");
        assert_eq!(history.previous(), Some("b"));
        assert_eq!(history.previous(), Some("a"));
        assert_eq!(history.previous(), Some("a"));
        assert_eq!(history.next(), Some("b"));
        assert_eq!(history.next(), Some(""));
        assert_eq!(history.next(), None);
    }

    #[test]
    fn test_install_keeps_fresh_lines_on_top() {
        let mut history = HistoryStore::new(3);
        history.append("typed early");
        history.install(vec!["old 1".to_string(), "old 2".to_string(), "old 3".to_string()]);
        assert_eq!(history.entries(), ["typed early", "old 1", "old 2"]);
    }

    #[test]
    fn test_background_writer_persists() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("history");
        let mut history = opened(&path, DEFAULT_CAPACITY);
        history.start_background_writer();
        history.append("x");
        // dropping the store closes the channel; the writer drains it first
        drop(history);
        for _ in 0..100 {
            if HistoryStore::load(&path, 10) == ["x"] {
                return Ok(());
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("history was never written");
    }
}
