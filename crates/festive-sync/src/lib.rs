//! # festive-sync: Submission & Sync Engine for Festive POS
//!
//! Everything a stall terminal does against the shared store: submitting
//! orders under partial failure, queueing them while offline, keeping views
//! fresh and recording cash closings.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PosTerminal (terminal.rs)                        │
//! │                                                                         │
//! │   drafts ──confirm──► OrderSubmitter ──► SalesStore ──► festive-db      │
//! │                           │                                             │
//! │                           └─ Offline ──► OfflineQueue (JSON on disk)    │
//! │                                               ▲                         │
//! │   Connectivity ── offline → online ──► ReplayWorker (backoff)           │
//! │                                                                         │
//! │   ┌──────────────────────┐       ┌──────────────────────────────────┐  │
//! │   │   SyncCoordinator    │       │        ClosingService            │  │
//! │   │                      │       │                                  │  │
//! │   │ change feed + poll + │       │ window since last closing,       │  │
//! │   │ manual refresh       │──────►│ totals per method,               │  │
//! │   │ → ViewSnapshot       │       │ conditional insert               │  │
//! │   └──────────────────────┘       └──────────────────────────────────┘  │
//! │                                                                         │
//! │   ErrorLog: rolling record of the last failures (JSON on disk)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`terminal`] - `PosTerminal` orchestrator and `ReplayWorker`
//! - [`submitter`] - Order Submitter
//! - [`offline_queue`] - Durable queue of orders captured offline
//! - [`coordinator`] - Sync Coordinator for the active view
//! - [`closing`] - Closing window, totals and save
//! - [`connectivity`] - Online/offline signal
//! - [`error_log`] - Rolling error log
//! - [`durable`] - Atomic JSON documents
//! - [`store`] - `SalesStore` seam over the database
//! - [`config`] - Terminal configuration (TOML)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use festive_db::{Database, DbConfig};
//! use festive_sync::{PosTerminal, ReplayWorker, TerminalConfig};
//!
//! let config = TerminalConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//!
//! let mut terminal = PosTerminal::open(config, db).await?;
//! let views = terminal.start_coordinator();
//!
//! let terminal = Arc::new(terminal);
//! let (worker, replay) = ReplayWorker::new(terminal.clone());
//! tokio::spawn(worker.run());
//!
//! let draft = terminal.active_draft().id;
//! terminal.add_item(&draft, led_id, 2).await?;
//! let outcome = terminal.confirm_order(&draft, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod closing;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod durable;
pub mod error;
pub mod error_log;
pub mod offline_queue;
pub mod store;
pub mod submitter;
pub mod terminal;

// =============================================================================
// Re-exports
// =============================================================================

pub use closing::{ClosingReview, ClosingService};
pub use config::{TerminalConfig, ERROR_LOG_KEY, OFFLINE_QUEUE_KEY};
pub use connectivity::Connectivity;
pub use coordinator::{ActiveView, CoordinatorHandle, SyncCoordinator, ViewSnapshot};
pub use error::{StockAdjustmentWarning, StockShortage, SubmitError, SyncError, SyncResult};
pub use error_log::ErrorLog;
pub use offline_queue::OfflineQueue;
pub use store::SalesStore;
pub use submitter::{OrderSubmitter, SubmitReceipt};
pub use terminal::{ConfirmOutcome, PosTerminal, ReplayHandle, ReplayReport, ReplayStatus, ReplayWorker};
