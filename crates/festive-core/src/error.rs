//! # Error Types
//!
//! Domain-specific error types for festive-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  festive-core errors (this file)                                       │
//! │  ├── CoreError        - Draft and stock rule violations                │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  festive-db errors (separate crate)                                    │
//! │  └── DbError          - Store operation failures                       │
//! │                                                                         │
//! │  festive-sync errors (separate crate)                                  │
//! │  ├── SubmitError      - Submission outcome taxonomy                    │
//! │  └── SyncError        - Config, durable files, background tasks        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Draft editing and stock rule errors.
///
/// None of these touch the store; the draft is left unchanged when one is
/// returned.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No draft with this id exists.
    #[error("Draft not found: {0}")]
    DraftNotFound(String),

    /// No line with this id exists in the draft.
    #[error("Line item {item_id} not found in draft {draft_id}")]
    LineItemNotFound { draft_id: String, item_id: String },

    /// Adding one more unit would exceed the known stock.
    ///
    /// ## When This Occurs
    /// ```text
    /// Draft has Led rojo 100 × 3, stock = 3
    ///      │
    ///      ▼
    /// add_item(Led rojo 100)
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Led rojo 100", available: 3, requested: 4 }
    ///      │
    ///      ▼
    /// UI shows: "Stock insuficiente"
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// A product with zero stock cannot enter a draft.
    #[error("{product} is out of stock")]
    OutOfStock { product: String },

    /// Submitting or queueing an order with no lines.
    #[error("Order has no items")]
    EmptyOrder,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product: "Led rojo 100".to_string(),
            available: 3,
            requested: 4,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Led rojo 100: available 3, requested 4"
        );
        assert_eq!(
            CoreError::OutOfStock { product: "Guirnalda".into() }.to_string(),
            "Guirnalda is out of stock"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::Required {
            field: "name".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(err.to_string(), "Validation error: name is required");
    }
}
