//! # festive-core: Pure Business Logic for Festive POS
//!
//! Everything a stall terminal decides without talking to anything: draft
//! orders, stock clamping, totals, order notes, view filters and the cash
//! closing window.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Festive POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/terminal (binary)                          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   festive-sync: PosTerminal, Submitter, OfflineQueue,           │   │
//! │  │                 SyncCoordinator, ClosingService                 │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────────┐  ┌────────▼──────────────────┐    │
//! │  │   ★ festive-core (THIS CRATE) ★ │  │ festive-db                │    │
//! │  │                                 │◄─│ SQLite store, migrations, │    │
//! │  │  types  money  draft  closing   │  │ repositories, change feed │    │
//! │  │  views  validation  error       │  └───────────────────────────┘    │
//! │  │                                 │                                   │
//! │  │  NO I/O • NO DATABASE • NO CLOCK│                                   │
//! │  └─────────────────────────────────┘                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, OrderLineItem, ClosingRecord, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`draft`] - Draft Order Store
//! - [`closing`] - Closing window and per-method totals
//! - [`views`] - Overview / pending filters
//! - [`validation`] - Input checks
//! - [`error`] - Domain error types
//!
//! Functions that depend on the current time take `now` as an argument.
//!
//! ## Example Usage
//!
//! ```rust
//! use festive_core::{DraftOrderStore, Money, Product};
//!
//! let mut drafts = DraftOrderStore::new();
//! let led = Product {
//!     id: 1,
//!     name: "Led rojo 100".into(),
//!     price: 2500,
//!     category: None,
//!     stock: 10,
//!     is_active: true,
//! };
//!
//! let id = drafts.active_id().to_string();
//! drafts.add_item(&id, &led, 2).unwrap();
//! drafts.add_manual_item(&id, "Flete", Money::from_units(3000), 1).unwrap();
//!
//! assert_eq!(drafts.totals(&id).unwrap().total.units(), 8000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod closing;
pub mod draft;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;
pub mod views;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use closing::{ClosingBucket, ClosingSummary, ClosingWindow, MethodTotals, NewClosing};
pub use draft::{order_notes, settled_notes, DraftOrder, DraftOrderStore, DraftTotals};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;
pub use views::{OverviewFilter, OverviewRange, PendingFilter, PendingRange, SaleFilter};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 1000 instead of 10) on lines
/// that have no stock bound, such as manual entries.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest unit price a line may carry.
///
/// Bounds line totals and order sums well inside `i64`.
pub const MAX_UNIT_PRICE: i64 = 100_000_000;

/// Name fragment identifying the catalog product manual lines are booked
/// against.
///
/// ## Business Reason
/// `sale_items.product_id` is mandatory, so ad-hoc charges ("Flete",
/// "Instalación") need a catalog row. The stall keeps one product whose name
/// contains this marker.
pub const MANUAL_PRODUCT_MARKER: &str = "venta manual";

/// Prefix of draft labels ("Pedido 1", "Pedido 2", ...).
pub const DRAFT_LABEL_PREFIX: &str = "Pedido ";

/// Prefix written on the notes of unpaid orders.
pub const PENDING_NOTE_PREFIX: &str = "PENDIENTE - ";
