//! # Change Feed
//!
//! Per-table row change notifications, published after every committed write.
//!
//! ```text
//! SaleRepository::insert_sale ──┐
//! SaleRepository::insert_items ─┼──► ChangeFeed (broadcast) ──► subscribe([Sales, SaleItems])
//! SaleRepository::mark_paid ────┘                                     │
//!                                                                      ▼
//!                                                      SyncCoordinator reloads its view
//! ```
//!
//! A subscriber that falls behind gets a synthetic change instead of an
//! error, so a reload still happens.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Capacity of the broadcast buffer.
const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Sales,
    SaleItems,
    CashClosures,
}

impl Table {
    pub const fn name(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Sales => "sales",
            Table::SaleItems => "sale_items",
            Table::CashClosures => "cash_closures",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableChange {
    pub table: Table,
    pub kind: ChangeKind,
    /// `None` for multi-row or lagged notifications.
    pub row_id: Option<i64>,
}

/// Publisher side. Cheap to clone; every repository holds one.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<TableChange>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        ChangeFeed { tx }
    }

    /// Publishes a change. Having no subscribers is not an error.
    pub fn publish(&self, table: Table, kind: ChangeKind, row_id: Option<i64>) {
        let change = TableChange { table, kind, row_id };
        let receivers = self.tx.send(change).unwrap_or(0);
        trace!(%table, ?kind, ?row_id, receivers, "Published table change");
    }

    /// Subscribes to changes on `tables`.
    pub fn subscribe(&self, tables: &[Table]) -> ChangeSubscription {
        debug!(?tables, "New change subscription");
        ChangeSubscription {
            rx: self.tx.subscribe(),
            tables: tables.iter().copied().collect(),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver filtered to a set of tables.
///
/// Dropping it ends the subscription.
#[derive(Debug)]
pub struct ChangeSubscription {
    rx: broadcast::Receiver<TableChange>,
    tables: HashSet<Table>,
}

impl ChangeSubscription {
    /// Waits for the next change on a subscribed table.
    ///
    /// ## Returns
    /// `None` once the feed has been dropped.
    pub async fn recv(&mut self) -> Option<TableChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.tables.contains(&change.table) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Change subscription lagged");
                    let table = self.tables.iter().next().copied().unwrap_or(Table::Sales);
                    return Some(TableChange {
                        table,
                        kind: ChangeKind::Update,
                        row_id: None,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }
}
