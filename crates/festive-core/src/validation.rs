//! # Validation Module
//!
//! Input checks run before a draft is edited or an order leaves the terminal.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Draft editing (this module)                                  │
//! │  ├── manual line name / price / quantity                               │
//! │  └── order must not be empty                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Submitter                                                    │
//! │  └── live stock check against the store                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0), CHECK (quantity > 0)                          │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::OrderLineItem;
use crate::{MAX_ITEM_QUANTITY, MAX_UNIT_PRICE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates the name of a manual line item.
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters
///
/// ## Returns
/// The trimmed name.
///
/// ## Example
/// ```rust
/// use festive_core::validation::validate_item_name;
///
/// assert_eq!(validate_item_name("  Flete ").unwrap(), "Flete");
/// assert!(validate_item_name("   ").is_err());
/// ```
pub fn validate_item_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(name.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the unit price of a manual line.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_UNIT_PRICE
pub fn validate_unit_price(units: i64) -> ValidationResult<()> {
    if units <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }

    if units > MAX_UNIT_PRICE {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 1,
            max: MAX_UNIT_PRICE,
        });
    }

    Ok(())
}

/// Validates a counted cash amount at closing. Zero is allowed.
pub fn validate_counted_cash(units: i64) -> ValidationResult<()> {
    if units < 0 {
        return Err(ValidationError::OutOfRange {
            field: "counted cash".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the lines of an order about to be submitted.
///
/// ## Rules
/// - At least one line
/// - Every line has a valid quantity and a unit price in `[0, MAX_UNIT_PRICE]`
/// - Catalog lines carry a product id
pub fn validate_order_items(items: &[OrderLineItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    for item in items {
        validate_quantity(item.quantity)?;

        if item.unit_price.is_negative() || item.unit_price.units() > MAX_UNIT_PRICE {
            return Err(ValidationError::OutOfRange {
                field: format!("price of {}", item.name),
                min: 0,
                max: MAX_UNIT_PRICE,
            });
        }

        if !item.is_manual && item.product_id.is_none() {
            return Err(ValidationError::Required {
                field: format!("product id of {}", item.name),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
