//! Durable record of the one open directional position per index.
//!
//! Backed by a JSON object keyed by index name. Every operation re-reads the
//! file under an async mutex and rewrites it through a temp file + rename, so
//! a crash mid-write leaves the previous version intact. The mutex is
//! process-local: two processes writing the same file can still lose updates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use optdesk_core::{Direction, EngineError, InstrumentIndex, Leg};

use crate::types::Position;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err.to_string())
    }
}

type Book = BTreeMap<InstrumentIndex, Position>;

enum Backing {
    File(PathBuf),
    Memory(Book),
}

pub struct PositionLedger {
    backing: Mutex<Backing>,
}

impl PositionLedger {
    /// File-backed ledger; the file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Mutex::new(Backing::File(path.into())),
        }
    }

    /// Ledger that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backing: Mutex::new(Backing::Memory(Book::new())),
        }
    }

    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the file exists but cannot be read or parsed.
    pub async fn get(&self, index: InstrumentIndex) -> Result<Option<Position>, LedgerError> {
        let backing = self.backing.lock().await;
        let book = match &*backing {
            Backing::File(path) => load(path).await?,
            Backing::Memory(book) => book.clone(),
        };
        Ok(book.get(&index).cloned())
    }

    /// Records `direction` with `legs` for `index`, replacing whatever was there.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the file cannot be read or written.
    pub async fn add(
        &self,
        index: InstrumentIndex,
        direction: Direction,
        legs: Vec<Leg>,
    ) -> Result<Position, LedgerError> {
        let position = Position {
            index,
            direction,
            opened_at: Utc::now(),
            naked: true,
            hedged: false,
            legs,
        };

        let mut backing = self.backing.lock().await;
        match &mut *backing {
            Backing::File(path) => {
                let mut book = load(path).await?;
                book.insert(index, position.clone());
                store(path, &book).await?;
            }
            Backing::Memory(book) => {
                book.insert(index, position.clone());
            }
        }

        info!(%index, %direction, legs = position.legs.len(), "Position recorded");
        Ok(position)
    }

    /// Removes the position for `index`; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the file cannot be read or written.
    pub async fn remove(&self, index: InstrumentIndex) -> Result<bool, LedgerError> {
        let mut backing = self.backing.lock().await;
        let removed = match &mut *backing {
            Backing::File(path) => {
                let mut book = load(path).await?;
                let removed = book.remove(&index).is_some();
                if removed {
                    store(path, &book).await?;
                }
                removed
            }
            Backing::Memory(book) => book.remove(&index).is_some(),
        };

        if removed {
            info!(%index, "Position removed");
        }
        Ok(removed)
    }
}

async fn load(path: &Path) -> Result<Book, LedgerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Book::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No ledger file yet");
            Ok(Book::new())
        }
        Err(e) => Err(e.into()),
    }
}

async fn store(path: &Path, book: &Book) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let bytes = serde_json::to_vec_pretty(book)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
