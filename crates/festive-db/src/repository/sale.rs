//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. HEADER                                                             │
//! │     └── insert_sale() → sales row (paid_* null while pending)          │
//! │                                                                         │
//! │  2. LINES                                                              │
//! │     └── insert_items() → sale_items rows, one transaction              │
//! │     └── on failure: delete_sale() removes the header again             │
//! │                                                                         │
//! │  3. (PENDING ONLY) SETTLE                                              │
//! │     └── mark_paid() → payment_method + paid_* stamped                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every committed write is published on the change feed.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::notify::{ChangeFeed, ChangeKind, Table};
use crate::repository::timestamp;
use festive_core::{
    ClosingWindow, MethodTotals, NewSale, NewSaleLine, PaymentMethod, Sale, SaleFilter,
    SaleLineItem,
};

const SALE_COLUMNS: &str =
    "id, created_at, total_amount, payment_method, notes, paid_at, paid_by, paid_method";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        SaleRepository { pool, feed }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Inserts a sale header.
    ///
    /// ## Returns
    /// The id of the new sale.
    pub async fn insert_sale(&self, sale: &NewSale) -> DbResult<i64> {
        debug!(
            total = sale.total_amount,
            method = %sale.payment_method,
            "Inserting sale"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO sales (
                created_at, total_amount, payment_method, notes,
                paid_at, paid_by, paid_method
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(timestamp(sale.created_at))
        .bind(sale.total_amount)
        .bind(sale.payment_method.as_str())
        .bind(sale.notes.as_deref())
        .bind(sale.paid_at.map(timestamp))
        .bind(sale.paid_by.as_deref())
        .bind(sale.paid_method.map(|m| m.as_str()))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.feed.publish(Table::Sales, ChangeKind::Insert, Some(id));
        Ok(id)
    }

    /// Inserts all lines of a sale in one transaction.
    ///
    /// Either every line is written or none is.
    pub async fn insert_items(&self, sale_id: i64, lines: &[NewSaleLine]) -> DbResult<()> {
        debug!(sale_id, lines = lines.len(), "Inserting sale items");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO sale_items (sale_id, product_id, quantity, unit_price, total_price)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(sale_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        self.feed.publish(Table::SaleItems, ChangeKind::Insert, None);
        Ok(())
    }

    /// Deletes a sale header; its lines go with it.
    pub async fn delete_sale(&self, id: i64) -> DbResult<()> {
        debug!(id, "Deleting sale");

        let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", id));
        }

        self.feed.publish(Table::Sales, ChangeKind::Delete, Some(id));
        Ok(())
    }

    /// Gets all items for a sale.
    pub async fn get_items(&self, sale_id: i64) -> DbResult<Vec<SaleLineItem>> {
        let items = sqlx::query_as::<_, SaleLineItem>(
            r#"
            SELECT id, sale_id, product_id, quantity, unit_price, total_price
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Lists sales matching `filter`, newest first.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE 1 = 1"));

        if let Some(from) = filter.created_from {
            query.push(" AND created_at >= ").push_bind(timestamp(from));
        }
        if let Some(to) = filter.created_to {
            let op = if filter.to_inclusive { " AND created_at <= " } else { " AND created_at < " };
            query.push(op).push_bind(timestamp(to));
        }
        if let Some(method) = filter.method {
            query.push(" AND payment_method = ").push_bind(method.as_str());
        }
        if let Some(search) = &filter.notes_contains {
            query
                .push(" AND LOWER(COALESCE(notes, '')) LIKE ")
                .push_bind(format!("%{}%", search.to_lowercase()));
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let sales = query.build_query_as::<Sale>().fetch_all(&self.pool).await?;
        debug!(count = sales.len(), "Listed sales");

        Ok(sales)
    }

    /// Settles a pending sale.
    ///
    /// ## Returns
    /// * `Ok(())` - The sale is now paid with `method`
    /// * `Err(DbError::NotFound)` - No such sale
    /// * `Err(DbError::Conflict)` - The sale is no longer pending
    pub async fn mark_paid(
        &self,
        id: i64,
        method: PaymentMethod,
        notes: Option<&str>,
        paid_by: &str,
        paid_at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id, method = %method, "Settling pending sale");

        let result = sqlx::query(
            r#"
            UPDATE sales SET
                payment_method = ?2,
                notes = ?3,
                paid_at = ?4,
                paid_by = ?5,
                paid_method = ?2
            WHERE id = ?1 AND payment_method = 'pending'
            "#,
        )
        .bind(id)
        .bind(method.as_str())
        .bind(notes)
        .bind(timestamp(paid_at))
        .bind(paid_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_by_id(id).await? {
                Some(_) => Err(DbError::Conflict(format!("sale {id} is not pending"))),
                None => Err(DbError::not_found("Sale", id)),
            };
        }

        self.feed.publish(Table::Sales, ChangeKind::Update, Some(id));
        Ok(())
    }

    /// Sums line totals per payment method for sales created inside
    /// `window` (start inclusive, end exclusive).
    pub async fn item_totals_by_method(&self, window: &ClosingWindow) -> DbResult<MethodTotals> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT s.payment_method, COALESCE(SUM(si.total_price), 0)
            FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            WHERE s.created_at >= ?1 AND s.created_at < ?2
            GROUP BY s.payment_method
            "#,
        )
        .bind(timestamp(window.from))
        .bind(timestamp(window.to))
        .fetch_all(&self.pool)
        .await?;

        Ok(MethodTotals::from_rows(rows))
    }

    /// Counts sales (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
