//! # Product Repository
//!
//! Catalog reads and stock decrements.
//!
//! ## Stock Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Two terminals sell the last units of the same product              │
//! │                                                                     │
//! │  Terminal A: UPDATE ... SET stock = stock - 3                       │
//! │              WHERE id = ? AND stock >= 3      → 1 row  (Applied)    │
//! │  Terminal B: UPDATE ... SET stock = stock - 2                       │
//! │              WHERE id = ? AND stock >= 2      → 0 rows              │
//! │              UPDATE ... SET stock = MAX(0, stock - 2)  (Floored)    │
//! │                                                                     │
//! │  Stock never goes negative; B's sale still stands.                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::notify::{ChangeFeed, ChangeKind, Table};
use festive_core::Product;

const PRODUCT_COLUMNS: &str = "id, name, price, category, stock, is_active";

/// Outcome of [`ProductRepository::decrement_stock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    /// The full quantity was subtracted.
    Applied,
    /// Fewer units were left than requested; stock was set to zero.
    Floored,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let levels = db.products().stock_levels(&[1, 2, 3]).await?;
/// let manual = db.products().find_by_name_marker("venta manual").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        ProductRepository { pool, feed }
    }

    /// Inserts a catalog product and returns its id.
    pub async fn insert(
        &self,
        name: &str,
        price: i64,
        category: Option<&str>,
        stock: i64,
    ) -> DbResult<i64> {
        debug!(name = %name, price, stock, "Inserting product");

        let result = sqlx::query(
            "INSERT INTO products (name, price, category, stock, is_active) VALUES (?1, ?2, ?3, ?4, 1)",
        )
        .bind(name)
        .bind(price)
        .bind(category)
        .bind(stock)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.feed.publish(Table::Products, ChangeKind::Insert, Some(id));
        Ok(id)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active products ordered by name.
    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Reads current stock for a set of products in one query.
    ///
    /// Ids with no matching row are absent from the map.
    pub async fn stock_levels(&self, ids: &[i64]) -> DbResult<HashMap<i64, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, stock FROM products WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(i64, i64)> = query.build_query_as().fetch_all(&self.pool).await?;
        debug!(requested = ids.len(), found = rows.len(), "Read stock levels");

        Ok(rows.into_iter().collect())
    }

    /// Finds the first active product whose name contains `marker`
    /// (case-insensitive).
    ///
    /// Used to locate the catalog row manual lines are booked against.
    pub async fn find_by_name_marker(&self, marker: &str) -> DbResult<Option<Product>> {
        let pattern = format!("%{}%", marker.trim().to_lowercase());

        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE is_active = 1 AND LOWER(name) LIKE ?1
             ORDER BY id
             LIMIT 1"
        ))
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Subtracts `quantity` units, never going below zero.
    ///
    /// ## Returns
    /// * `Ok(StockDecrement::Applied)` - Enough units were on hand
    /// * `Ok(StockDecrement::Floored)` - Stock was short and is now zero
    /// * `Err(DbError::NotFound)` - No such product
    pub async fn decrement_stock(&self, id: i64, quantity: i64) -> DbResult<StockDecrement> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - ?2 WHERE id = ?1 AND stock >= ?2",
        )
        .bind(id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            self.feed.publish(Table::Products, ChangeKind::Update, Some(id));
            return Ok(StockDecrement::Applied);
        }

        let result = sqlx::query("UPDATE products SET stock = MAX(0, stock - ?2) WHERE id = ?1")
            .bind(id)
            .bind(quantity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        warn!(product_id = id, quantity, "Stock was short, floored to zero");
        self.feed.publish(Table::Products, ChangeKind::Update, Some(id));
        Ok(StockDecrement::Floored)
    }

    /// Overwrites the stock count.
    pub async fn set_stock(&self, id: i64, stock: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET stock = ?2 WHERE id = ?1")
            .bind(id)
            .bind(stock)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.feed.publish(Table::Products, ChangeKind::Update, Some(id));
        Ok(())
    }

    /// Marks every product inactive. Catalog reloads start here.
    pub async fn deactivate_all(&self) -> DbResult<u64> {
        let result = sqlx::query("UPDATE products SET is_active = 0")
            .execute(&self.pool)
            .await?;

        self.feed.publish(Table::Products, ChangeKind::Update, None);
        Ok(result.rows_affected())
    }

    /// Updates the product with this exact name, or inserts it.
    /// Either way the product ends up active.
    ///
    /// ## Returns
    /// `true` when a new row was inserted.
    pub async fn upsert_by_name(
        &self,
        name: &str,
        price: i64,
        category: Option<&str>,
        stock: i64,
    ) -> DbResult<bool> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM products WHERE name = ?1 ORDER BY id LIMIT 1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE products SET price = ?2, category = ?3, stock = ?4, is_active = 1 WHERE id = ?1",
                )
                .bind(id)
                .bind(price)
                .bind(category)
                .bind(stock)
                .execute(&self.pool)
                .await?;

                self.feed.publish(Table::Products, ChangeKind::Update, Some(id));
                Ok(false)
            }
            None => {
                self.insert(name, price, category, stock).await?;
                Ok(true)
            }
        }
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    use super::*;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_stock_levels_batched_read() {
        let db = db().await;
        let repo = db.products();
        let led = repo.insert("Led rojo 100", 2500, Some("Leds"), 5).await.unwrap();
        let bag = repo.insert("Bolsa mediana", 1000, Some("Bolsas"), 12).await.unwrap();

        let levels = repo.stock_levels(&[led, bag, 9999]).await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[&led], 5);
        assert_eq!(levels[&bag], 12);

        assert!(repo.stock_levels(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decrement_applied_and_floored() {
        let db = db().await;
        let repo = db.products();
        let id = repo.insert("Cascada blanca 100", 5500, None, 3).await.unwrap();

        assert_eq!(repo.decrement_stock(id, 2).await.unwrap(), StockDecrement::Applied);
        assert_eq!(repo.get_by_id(id).await.unwrap().unwrap().stock, 1);

        assert_eq!(repo.decrement_stock(id, 5).await.unwrap(), StockDecrement::Floored);
        assert_eq!(repo.get_by_id(id).await.unwrap().unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_decrement_unknown_product() {
        let db = db().await;
        let err = db.products().decrement_stock(42, 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_find_by_name_marker_is_case_insensitive() {
        let db = db().await;
        let repo = db.products();
        repo.insert("Guirnalda verde", 1500, None, 16).await.unwrap();
        let manual = repo.insert("Venta Manual", 0, None, 0).await.unwrap();

        let found = repo.find_by_name_marker("venta manual").await.unwrap().unwrap();
        assert_eq!(found.id, manual);
        assert!(found.is_manual_sale_product());

        assert!(repo.find_by_name_marker("flete").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_reactivates_existing() {
        let db = db().await;
        let repo = db.products();
        repo.insert("Led rojo 100", 2000, Some("Leds"), 1).await.unwrap();

        repo.deactivate_all().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);

        assert!(!repo.upsert_by_name("Led rojo 100", 2500, Some("Leds"), 5).await.unwrap());
        assert!(repo.upsert_by_name("Bolsa mediana", 1000, Some("Bolsas"), 12).await.unwrap());

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[1].name, "Led rojo 100");
        assert_eq!(active[1].price, 2500);
    }

    #[tokio::test]
    async fn test_stock_write_is_published() {
        let db = db().await;
        let id = db.products().insert("Bolsa chica", 500, None, 2).await.unwrap();
        let mut sub = db.subscribe(&[Table::Products]);

        db.products().set_stock(id, 10).await.unwrap();

        let change = sub.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.row_id, Some(id));
    }
}
