//! # Sales Store Seam
//!
//! The store operations the order submitter needs, behind a trait so tests
//! can inject connectivity failures at any step.

use std::collections::HashMap;

use async_trait::async_trait;
use festive_core::{NewSale, NewSaleLine, Product};
use festive_db::{Database, DbResult, StockDecrement};

#[async_trait]
pub trait SalesStore: Send + Sync {
    /// Current stock for each id, in one read.
    async fn stock_levels(&self, product_ids: &[i64]) -> DbResult<HashMap<i64, i64>>;

    /// The catalog row manual lines are booked against.
    async fn manual_product(&self, marker: &str) -> DbResult<Option<Product>>;

    async fn insert_sale(&self, sale: &NewSale) -> DbResult<i64>;

    async fn insert_items(&self, sale_id: i64, lines: &[NewSaleLine]) -> DbResult<()>;

    async fn delete_sale(&self, sale_id: i64) -> DbResult<()>;

    async fn decrement_stock(&self, product_id: i64, quantity: i64) -> DbResult<StockDecrement>;
}

#[async_trait]
impl SalesStore for Database {
    async fn stock_levels(&self, product_ids: &[i64]) -> DbResult<HashMap<i64, i64>> {
        self.products().stock_levels(product_ids).await
    }

    async fn manual_product(&self, marker: &str) -> DbResult<Option<Product>> {
        self.products().find_by_name_marker(marker).await
    }

    async fn insert_sale(&self, sale: &NewSale) -> DbResult<i64> {
        self.sales().insert_sale(sale).await
    }

    async fn insert_items(&self, sale_id: i64, lines: &[NewSaleLine]) -> DbResult<()> {
        self.sales().insert_items(sale_id, lines).await
    }

    async fn delete_sale(&self, sale_id: i64) -> DbResult<()> {
        self.sales().delete_sale(sale_id).await
    }

    async fn decrement_stock(&self, product_id: i64, quantity: i64) -> DbResult<StockDecrement> {
        self.products().decrement_stock(product_id, quantity).await
    }
}
