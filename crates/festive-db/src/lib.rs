//! # festive-db: Shared Store for Festive POS
//!
//! Every terminal at the stall reads and writes the same SQLite store through
//! this crate. It owns the pool, the schema and every SQL statement.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Festive POS Data Flow                            │
//! │                                                                         │
//! │  OrderSubmitter / SyncCoordinator / ClosingService (festive-sync)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     festive-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SaleRepo      │    │ 001_init.sql │  │   │
//! │  │   │ ChangeFeed    │    │ ClosingRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`notify`] - Per-table change feed
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use festive_db::{Database, DbConfig, Table};
//!
//! let db = Database::new(DbConfig::new("festive.db")).await?;
//!
//! let mut changes = db.subscribe(&[Table::Sales, Table::SaleItems]);
//! let pending = db.sales().list(&filter).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod notify;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use notify::{ChangeFeed, ChangeKind, ChangeSubscription, Table, TableChange};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::closing::ClosingRepository;
pub use repository::product::{ProductRepository, StockDecrement};
pub use repository::sale::SaleRepository;
