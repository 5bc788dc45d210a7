use std::path::PathBuf;
use std::sync::RwLock;

use analysis_core::canonicalize;

/// Hot-reloadable watchlist.
///
/// The scheduler reads through this handle at the start of every batch so
/// edits to the backing file (or a reload trigger) take effect without a
/// restart. When no file is configured the boot-time STOCK_LIST is served.
pub struct WatchlistHandle {
    file: Option<PathBuf>,
    current: RwLock<Vec<String>>,
}

impl WatchlistHandle {
    pub fn new(initial: Vec<String>, file: Option<String>) -> Self {
        WatchlistHandle {
            file: file.map(PathBuf::from),
            current: RwLock::new(initial),
        }
    }

    /// Current watchlist; re-reads the backing file when one is set.
    pub fn read(&self) -> Vec<String> {
        if let Some(path) = &self.file {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let tickers: Vec<String> = text
                        .split([',', '\n'])
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty() && !s.starts_with('#'))
                        .map(canonicalize)
                        .collect();
                    *self.current.write().expect("watchlist lock poisoned") = tickers.clone();
                    return tickers;
                }
                Err(e) => {
                    tracing::warn!("watchlist file {:?} unreadable, keeping last list: {}", path, e);
                }
            }
        }
        self.current.read().expect("watchlist lock poisoned").clone()
    }

    /// Replace the in-memory list (used by the admin API).
    pub fn replace(&self, tickers: Vec<String>) {
        let tickers: Vec<String> = tickers.iter().map(|t| canonicalize(t)).collect();
        *self.current.write().expect("watchlist lock poisoned") = tickers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_boot_list_without_file() {
        let handle = WatchlistHandle::new(vec!["600519".into(), "AAPL".into()], None);
        assert_eq!(handle.read(), vec!["600519", "AAPL"]);
    }

    #[test]
    fn replace_canonicalizes() {
        let handle = WatchlistHandle::new(vec![], None);
        handle.replace(vec!["aapl".into(), " 600519".into()]);
        assert_eq!(handle.read(), vec!["AAPL", "600519"]);
    }

    #[test]
    fn reads_file_fresh_each_call() {
        let dir = std::env::temp_dir().join(format!("watchlist-{}", std::process::id()));
        std::fs::write(&dir, "600519,AAPL\n# comment\n00700\n").unwrap();
        let handle = WatchlistHandle::new(vec![], Some(dir.to_string_lossy().into_owned()));
        assert_eq!(handle.read(), vec!["600519", "AAPL", "00700"]);

        std::fs::write(&dir, "TSLA\n").unwrap();
        assert_eq!(handle.read(), vec!["TSLA"]);
        std::fs::remove_file(&dir).ok();
    }
}
