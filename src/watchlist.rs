//! Watched-securities store, persisted as a JSON list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::info;

use crate::market::board;
use crate::models::WatchEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyExists,
}

pub struct WatchlistStore {
    path: Option<PathBuf>,
    entries: RwLock<Vec<WatchEntry>>,
}

impl WatchlistStore {
    /// In-memory store; nothing is persisted.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// File-backed store. A missing file yields an empty list.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read watchlist from {}", path.display()))?;
            serde_json::from_str(&text).context("malformed watchlist file")?
        } else {
            Vec::new()
        };
        info!(path = %path.display(), count = entries.len(), "watchlist loaded");
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    pub fn list(&self) -> Vec<WatchEntry> {
        self.entries.read().clone()
    }

    pub fn codes(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.code.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.read().iter().any(|e| e.code == code)
    }

    pub fn add(&self, code: &str, name: &str, notes: Option<String>) -> Result<AddOutcome> {
        {
            let mut entries = self.entries.write();
            if entries.iter().any(|e| e.code == code) {
                return Ok(AddOutcome::AlreadyExists);
            }
            entries.push(WatchEntry {
                code: code.to_string(),
                name: name.to_string(),
                market: board::market_prefix(code).to_string(),
                notes,
            });
        }
        self.persist()?;
        Ok(AddOutcome::Added)
    }

    /// Remove by code; false when absent.
    pub fn remove(&self, code: &str) -> Result<bool> {
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|e| e.code != code);
            entries.len() != before
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&*self.entries.read())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move watchlist into {}", path.display()))?;
        Ok(())
    }
}

/// 6-digit decimal security code.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}
