//! # Domain Types
//!
//! Core domain types shared by the terminal, the store and the offline queue.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │  SaleLineItem   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id             │   │  sale_id (FK)   │       │
//! │  │  name           │   │  total_amount   │   │  product_id     │       │
//! │  │  price          │   │  payment_method │   │  quantity       │       │
//! │  │  stock (≥ 0)    │   │  paid_* (opt)   │   │  total_price    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ OrderLineItem   │   │ OfflineOrder    │   │ ClosingRecord   │       │
//! │  │  ─────────────  │   │  Record         │   │  ─────────────  │       │
//! │  │  draft line     │   │  queued order   │   │  expected/real  │       │
//! │  │  (local only)   │   │  (JSON on disk) │   │  cash/transfers │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows read from the store derive `sqlx::FromRow` behind the `sqlx` feature,
//! so the column names in `migrations/sqlite` match these field names.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::MANUAL_PRODUCT_MARKER;

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale was (or will be) paid.
///
/// `Pending` means the customer has not paid yet; the sale is settled later
/// with cash or transfer.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Bank transfer.
    Transfer,
    /// Not paid yet.
    Pending,
}

impl PaymentMethod {
    /// All methods, in the order the stall shows them.
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Cash,
        PaymentMethod::Transfer,
        PaymentMethod::Pending,
    ];

    /// The value stored in `sales.payment_method`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Pending => "pending",
        }
    }

    #[inline]
    pub const fn is_pending(&self) -> bool {
        matches!(self, PaymentMethod::Pending)
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "transfer" => Ok(PaymentMethod::Transfer),
            "pending" => Ok(PaymentMethod::Pending),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: PaymentMethod::ALL.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalog product.
///
/// Owned by the catalog surface; the terminal only reads it and decrements
/// `stock` when a sale is submitted.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Unit price in whole currency units.
    pub price: i64,
    pub category: Option<String>,
    /// Units on hand. Never negative.
    pub stock: i64,
    pub is_active: bool,
}

impl Product {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_units(self.price)
    }

    /// Whether this is the catalog row manual line items are booked against.
    ///
    /// ## Example
    /// ```rust
    /// # use festive_core::Product;
    /// let p = Product {
    ///     id: 99,
    ///     name: "Venta Manual".into(),
    ///     price: 0,
    ///     category: None,
    ///     stock: 0,
    ///     is_active: true,
    /// };
    /// assert!(p.is_manual_sale_product());
    /// ```
    pub fn is_manual_sale_product(&self) -> bool {
        self.matches_name_marker(MANUAL_PRODUCT_MARKER)
    }

    /// Case-insensitive substring match on the product name.
    pub fn matches_name_marker(&self, marker: &str) -> bool {
        self.name.to_lowercase().contains(&marker.to_lowercase())
    }
}

// =============================================================================
// Order Line Item
// =============================================================================

/// A line in a draft order (or in a queued offline order).
///
/// Catalog lines carry the product id and the stock level seen when the
/// product was last added; manual lines carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrderLineItem {
    /// Line id inside the draft: the product id for catalog lines,
    /// `manual-<uuid>` for manual lines.
    pub id: String,
    pub product_id: Option<i64>,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub is_manual: bool,
    /// Clamp bound for quantity adjustments.
    pub stock: Option<i64>,
}

impl OrderLineItem {
    /// Creates a catalog-backed line at quantity 1.
    pub fn from_product(product: &Product) -> Self {
        OrderLineItem {
            id: product.id.to_string(),
            product_id: Some(product.id),
            name: product.name.clone(),
            unit_price: product.unit_price(),
            quantity: 1,
            is_manual: false,
            stock: Some(product.stock),
        }
    }

    /// Creates a manual (not stock-backed) line.
    pub fn manual(name: impl Into<String>, unit_price: Money, quantity: i64) -> Self {
        OrderLineItem {
            id: format!("manual-{}", uuid::Uuid::new_v4()),
            product_id: None,
            name: name.into(),
            unit_price,
            quantity,
            is_manual: true,
            stock: None,
        }
    }

    /// unit_price × quantity
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Catalog id of a stock-backed line.
    #[inline]
    pub fn stock_backed_product(&self) -> Option<i64> {
        if self.is_manual {
            None
        } else {
            self.product_id
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A persisted sale header.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<String>,
    pub paid_method: Option<PaymentMethod>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_units(self.total_amount)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.payment_method.is_pending()
    }
}

/// A persisted sale line.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: i64,
    /// unit_price × quantity
    pub total_price: i64,
}

/// A line ready to be written under a sale header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSaleLine {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_price: i64,
}

/// A sale header ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub created_at: DateTime<Utc>,
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<String>,
    pub paid_method: Option<PaymentMethod>,
}

impl NewSale {
    /// Builds a header; paid fields are stamped unless the method is pending.
    pub fn new(
        total: Money,
        payment_method: PaymentMethod,
        notes: Option<String>,
        operator: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let paid = !payment_method.is_pending();
        NewSale {
            created_at: now,
            total_amount: total.units(),
            payment_method,
            notes,
            paid_at: paid.then_some(now),
            paid_by: paid.then(|| operator.to_string()),
            paid_method: paid.then_some(payment_method),
        }
    }
}

// =============================================================================
// Cash Closing
// =============================================================================

/// An immutable cash reconciliation record.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClosingRecord {
    pub id: i64,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub expected_cash: i64,
    /// Cash counted by the operator.
    pub real_cash: i64,
    pub expected_transfers: i64,
    pub real_transfers: i64,
    pub comment: Option<String>,
    pub closed_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl ClosingRecord {
    /// counted − expected
    pub fn cash_difference(&self) -> Money {
        Money::from_units(self.real_cash - self.expected_cash)
    }
}

// =============================================================================
// Offline Queue & Error Log Documents
// =============================================================================

/// An order captured while the store was unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OfflineOrderRecord {
    pub id: String,
    pub items: Vec<OrderLineItem>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Header a failed submit left in the store; deleted before replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan_sale_id: Option<i64>,
}

impl OfflineOrderRecord {
    pub fn new(
        items: Vec<OrderLineItem>,
        payment_method: PaymentMethod,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        OfflineOrderRecord {
            id: uuid::Uuid::new_v4().to_string(),
            items,
            payment_method,
            notes,
            created_at,
            orphan_sale_id: None,
        }
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(OrderLineItem::line_total).sum()
    }
}

/// One entry of the rolling error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ErrorLogEntry {
    pub context: String,
    pub message: String,
    #[ts(as = "String")]
    pub time: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
