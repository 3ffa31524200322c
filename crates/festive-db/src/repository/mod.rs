//! # Repository Module
//!
//! Repository implementations for the shared store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  OrderSubmitter / SyncCoordinator                                      │
//! │       │                                                                 │
//! │       │  db.sales().list(&filter)                                      │
//! │       ▼                                                                 │
//! │  SaleRepository                                                        │
//! │  ├── insert_sale / insert_items / delete_sale                          │
//! │  ├── list / get_by_id / get_items                                      │
//! │  └── mark_paid / item_totals_by_method                                 │
//! │       │                                                                 │
//! │       │  SQL + ChangeFeed::publish after commit                        │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog reads and stock decrements
//! - [`SaleRepository`](sale::SaleRepository) - Sales, line items and settlement
//! - [`ClosingRepository`](closing::ClosingRepository) - Cash closings
//!
//! ## Timestamps
//! Every timestamp column is written through [`timestamp`], which fixes the
//! precision at microseconds. Text comparison in SQL then matches
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub mod closing;
pub mod product;
pub mod sale;

/// Formats a timestamp for storage: `2026-10-16T21:04:05.123456Z`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
