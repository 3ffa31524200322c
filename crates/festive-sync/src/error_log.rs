//! # Rolling Error Log
//!
//! The most recent failures, kept on disk for later inspection at the stall.
//! Oldest entries are dropped once the log is full.

use std::collections::VecDeque;
use std::fmt::Display;
use std::path::PathBuf;

use chrono::Utc;
use festive_core::ErrorLogEntry;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::durable::JsonDocument;
use crate::error::SyncResult;

/// Stock re-read before submission failed.
pub const CTX_STOCK_VALIDATION: &str = "Validacion stock fallo";
/// Header or line write failed.
pub const CTX_SAVE_SALE: &str = "Error guardando venta";
/// Sale saved, stock decrement did not apply.
pub const CTX_STOCK_ADJUSTMENT: &str = "Fallo ajuste de stock";
/// A queued order could not be replayed.
pub const CTX_OFFLINE_REPLAY: &str = "Reintento offline fallo";

#[derive(Debug)]
pub struct ErrorLog {
    doc: JsonDocument,
    capacity: usize,
    entries: Mutex<VecDeque<ErrorLogEntry>>,
}

impl ErrorLog {
    /// Opens the log at `path`. An unreadable file is moved aside and the
    /// log starts empty.
    pub async fn load(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let doc = JsonDocument::new(path);

        let entries: VecDeque<ErrorLogEntry> = match doc.read::<Vec<ErrorLogEntry>>().await {
            Ok(found) => found.unwrap_or_default().into(),
            Err(e) => {
                warn!(?e, path = %doc.path().display(), "Error log unreadable, starting empty");
                if let Err(e) = doc.quarantine().await {
                    warn!(?e, "Could not move unreadable error log aside");
                }
                VecDeque::new()
            }
        };

        let mut log = ErrorLog {
            doc,
            capacity: capacity.max(1),
            entries: Mutex::new(entries),
        };
        log.trim_loaded();
        log
    }

    fn trim_loaded(&mut self) {
        let entries = self.entries.get_mut();
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Appends an entry and persists the whole log.
    pub async fn append(&self, context: &str, message: impl Display) -> SyncResult<()> {
        let entry = ErrorLogEntry {
            context: context.to_string(),
            message: message.to_string(),
            time: Utc::now(),
        };
        error!(context = %entry.context, message = %entry.message, "Recorded error");

        let mut entries = self.entries.lock().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        self.doc.write(&*entries).await
    }

    /// Like [`append`](Self::append), logging a persistence failure instead
    /// of returning it.
    pub async fn record(&self, context: &str, message: impl Display) {
        if let Err(e) = self.append(context, message).await {
            warn!(?e, context, "Could not persist error log");
        }
    }

    pub async fn persist(&self) -> SyncResult<()> {
        let entries = self.entries.lock().await;
        self.doc.write(&*entries).await
    }

    /// Oldest first.
    pub async fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_is_capped_oldest_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pos_error_logs.json");
        let log = ErrorLog::load(&path, 3).await;

        for i in 0..5 {
            log.append(CTX_SAVE_SALE, format!("fallo {i}")).await.unwrap();
        }

        let entries = log.entries().await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "fallo 2");
        assert_eq!(entries[2].message, "fallo 4");
    }

    #[tokio::test]
    async fn test_log_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pos_error_logs.json");

        let log = ErrorLog::load(&path, 50).await;
        log.append(CTX_STOCK_ADJUSTMENT, "Led rojo 100 x2").await.unwrap();
        drop(log);

        let reloaded = ErrorLog::load(&path, 50).await;
        let entries = reloaded.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].context, "Fallo ajuste de stock");
    }

    #[tokio::test]
    async fn test_corrupt_log_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pos_error_logs.json");
        std::fs::write(&path, b"[{").unwrap();

        let log = ErrorLog::load(&path, 50).await;
        assert!(log.entries().await.is_empty());
        log.persist().await.unwrap();
        assert!(path.exists());
    }
}
