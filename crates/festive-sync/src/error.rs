//! # Sync Error Types
//!
//! Error types for submission, queueing and view synchronization.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Storage      │  │     Submission          │ │
//! │  │                 │  │                 │  │  (SubmitError)          │ │
//! │  │  InvalidConfig  │  │  StorageFailed  │  │  Validation             │ │
//! │  │  ConfigLoad     │  │  Serialization  │  │  Stock                  │ │
//! │  │  ConfigSave     │  │                 │  │  Persistence / Offline  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │     Drafts      │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Database       │  │  Draft          │  │  ShuttingDown           │ │
//! │  │  ClosingConflict│  │  (CoreError)    │  │  ChannelError           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use festive_core::{CoreError, ValidationError};
use festive_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Terminal-level error type.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid terminal configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Reading or writing a durable local document failed.
    #[error("Local storage failed: {0}")]
    StorageFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Another terminal saved a cash closing after this window was computed.
    #[error("Cash closing conflict: {0}")]
    ClosingConflict(String),

    // =========================================================================
    // Order Errors
    // =========================================================================
    #[error(transparent)]
    Draft(#[from] CoreError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The background task behind a handle has stopped.
    #[error("Terminal is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Draft(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::StorageFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(DbError::from(err))
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the operation can be retried as-is later.
    ///
    /// ## Retryable Errors
    /// - The store was unreachable
    /// - A closing raced another terminal (retry with a fresh window)
    /// - Local storage hiccups
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Database(e) => e.is_connectivity(),
            SyncError::Submit(e) => e.is_offline(),
            SyncError::ClosingConflict(_) | SyncError::StorageFailed(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Submission Errors
// =============================================================================

/// A catalog line the store cannot cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockShortage {
    pub product_id: i64,
    pub name: String,
    /// `0` when the product no longer exists.
    pub available: i64,
    pub requested: i64,
}

impl fmt::Display for StockShortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (disponible {}, pedido {})",
            self.name, self.available, self.requested
        )
    }
}

/// Why an order was not submitted.
///
/// Nothing is left in the store when any of these is returned, except a
/// header whose removal failed: its id is carried as `orphan_sale`.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Empty order or malformed lines.
    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),

    /// One or more catalog lines exceed current stock.
    #[error("Insufficient stock: {}", format_shortages(.shortages))]
    Stock { shortages: Vec<StockShortage> },

    /// Manual lines need a catalog row matching the marker.
    #[error("No active product matches '{marker}' for manual lines")]
    ManualProductMissing { marker: String },

    /// Header or line write failed.
    #[error("Could not save sale: {reason}")]
    Persistence {
        reason: String,
        orphan_sale: Option<i64>,
    },

    /// The store could not be reached. The caller queues the order.
    #[error("Store unreachable: {reason}")]
    Offline {
        reason: String,
        /// Header written before the store dropped and not removed since.
        orphan_sale: Option<i64>,
    },
}

impl SubmitError {
    #[inline]
    pub fn is_offline(&self) -> bool {
        matches!(self, SubmitError::Offline { .. })
    }

    /// Id of a header left in the store without its lines.
    pub fn orphan_sale(&self) -> Option<i64> {
        match self {
            SubmitError::Persistence { orphan_sale, .. } | SubmitError::Offline { orphan_sale, .. } => {
                *orphan_sale
            }
            _ => None,
        }
    }

    pub(crate) fn with_orphan_sale(mut self, sale_id: i64) -> Self {
        if let SubmitError::Persistence { orphan_sale, .. } | SubmitError::Offline { orphan_sale, .. } =
            &mut self
        {
            *orphan_sale = Some(sale_id);
        }
        self
    }

    /// Unreachable store means the order can be queued; anything else is a
    /// persistence failure.
    pub(crate) fn from_store(err: DbError) -> Self {
        let reason = err.to_string();
        if err.is_connectivity() {
            SubmitError::Offline { reason, orphan_sale: None }
        } else {
            SubmitError::Persistence { reason, orphan_sale: None }
        }
    }
}

fn format_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The sale was saved but a stock decrement did not go as planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustmentWarning {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub reason: String,
}

impl fmt::Display for StockAdjustmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}: {}", self.name, self.quantity, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Database(DbError::PoolExhausted).is_retryable());
        assert!(SyncError::Submit(SubmitError::from_store(DbError::PoolExhausted)).is_retryable());
        assert!(SyncError::ClosingConflict("stale".into()).is_retryable());

        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::Database(DbError::not_found("Sale", 1)).is_retryable());
        assert!(!SyncError::Submit(SubmitError::from_store(DbError::QueryFailed("fk".into()))).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::ConfigLoadFailed("x".into()).is_config_error());
        assert!(!SyncError::ChannelError("closed".into()).is_config_error());
    }

    #[test]
    fn test_stock_error_names_every_shortage() {
        let err = SubmitError::Stock {
            shortages: vec![
                StockShortage { product_id: 1, name: "Led rojo 100".into(), available: 1, requested: 2 },
                StockShortage { product_id: 2, name: "Bolsa mediana".into(), available: 0, requested: 1 },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("Led rojo 100 (disponible 1, pedido 2)"));
        assert!(msg.contains("Bolsa mediana"));
    }

    #[test]
    fn test_read_errors_classified() {
        assert!(SubmitError::from_store(DbError::ConnectionFailed("io".into())).is_offline());
        assert!(!SubmitError::from_store(DbError::QueryFailed("syntax".into())).is_offline());
    }

    #[test]
    fn test_orphan_sale_kept_on_store_errors_only() {
        let offline = SubmitError::from_store(DbError::ConnectionFailed("io".into())).with_orphan_sale(7);
        assert!(offline.is_offline());
        assert_eq!(offline.orphan_sale(), Some(7));

        let stock = SubmitError::Stock { shortages: vec![] }.with_orphan_sale(7);
        assert_eq!(stock.orphan_sale(), None);
    }
}
