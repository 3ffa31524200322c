//! # Offline Queue
//!
//! Orders captured while the store was unreachable, persisted as one JSON
//! document and replayed in FIFO order once connectivity returns.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  confirm (offline) ──► append ──► persist ──► [ r1, r2, r3 ]            │
//! │                                                   │                     │
//! │  replay:  snapshot() ──► submit r1 ── ok ──► remove(r1) ──► persist    │
//! │                       └► submit r2 ── err ─► stays queued               │
//! │                                                                         │
//! │  A record is only ever removed after its own replay succeeded.          │
//! │  Records appended during a replay are not in the snapshot and stay.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use festive_core::OfflineOrderRecord;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::durable::JsonDocument;
use crate::error::SyncResult;

#[derive(Debug)]
pub struct OfflineQueue {
    doc: JsonDocument,
    records: Mutex<Vec<OfflineOrderRecord>>,
}

impl OfflineQueue {
    /// Opens the queue at `path`, loading whatever a previous run left.
    ///
    /// An unreadable document is moved aside, never overwritten.
    pub async fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let queue = OfflineQueue {
            doc: JsonDocument::new(path),
            records: Mutex::new(Vec::new()),
        };
        queue.load().await?;
        Ok(queue)
    }

    /// Replaces the in-memory queue with the persisted one.
    ///
    /// ## Returns
    /// Number of records loaded.
    pub async fn load(&self) -> SyncResult<usize> {
        let loaded = match self.doc.read::<Vec<OfflineOrderRecord>>().await {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(?e, path = %self.doc.path().display(), "Offline queue unreadable");
                self.doc.quarantine().await?;
                Vec::new()
            }
        };

        let count = loaded.len();
        *self.records.lock().await = loaded;

        if count > 0 {
            info!(count, "Loaded queued offline orders");
        }
        Ok(count)
    }

    /// Appends a record and persists the whole queue.
    ///
    /// On a persistence error the record stays queued in memory.
    pub async fn append(&self, record: OfflineOrderRecord) -> SyncResult<()> {
        let mut records = self.records.lock().await;
        info!(id = %record.id, items = record.items.len(), "Queueing order offline");
        records.push(record);
        self.doc.write(&*records).await
    }

    /// Removes a record by id and persists.
    ///
    /// ## Returns
    /// `true` if the record was queued.
    pub async fn remove(&self, id: &str) -> SyncResult<bool> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| r.id != id);

        if records.len() == before {
            return Ok(false);
        }

        debug!(id, remaining = records.len(), "Removed offline order");
        self.doc.write(&*records).await?;
        Ok(true)
    }

    /// Notes the header a failed replay of `id` left in the store.
    ///
    /// ## Returns
    /// `true` if the record was queued.
    pub async fn set_orphan_sale(&self, id: &str, sale_id: Option<i64>) -> SyncResult<bool> {
        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };

        if record.orphan_sale_id == sale_id {
            return Ok(true);
        }
        record.orphan_sale_id = sale_id;
        self.doc.write(&*records).await?;
        Ok(true)
    }

    /// Writes the current queue to disk.
    pub async fn persist(&self) -> SyncResult<()> {
        let records = self.records.lock().await;
        self.doc.write(&*records).await
    }

    /// Copy of the queue, oldest first.
    pub async fn snapshot(&self) -> Vec<OfflineOrderRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
