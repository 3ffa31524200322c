//! # Order Submitter
//!
//! Turns a confirmed order into one sale header plus its line items, then
//! decrements stock for the catalog lines.
//!
//! ## Submission Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. validate lines                                                      │
//! │  2. read stock for all catalog ids (one batched read)                   │
//! │       └─ any shortage ─────────────────────────► Err(Stock), no writes  │
//! │  3. resolve the manual product (if any manual line)                     │
//! │  4. insert header ──────── fail ───────────────► Err, no writes         │
//! │  5. insert lines ───────── fail ──► delete header ──► Err               │
//! │       └─ delete fails ──► Err carries the header id (orphan_sale)       │
//! │  6. decrement stock per product                                         │
//! │       └─ floored / failed ──► warning, sale stands                      │
//! │                                                                         │
//! │  Store unreachable at steps 2-5 → Err(Offline), caller queues the order │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 4 to 6 are separate statements. Another terminal can sell the same
//! product between the stock read and the decrement; the decrement then
//! floors at zero instead of failing the sale.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use festive_core::validation::validate_order_items;
use festive_core::{Money, NewSale, NewSaleLine, OrderLineItem, PaymentMethod, ValidationError};
use festive_db::{DbError, StockDecrement};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{StockAdjustmentWarning, StockShortage, SubmitError};
use crate::error_log::{ErrorLog, CTX_SAVE_SALE, CTX_STOCK_ADJUSTMENT, CTX_STOCK_VALIDATION};
use crate::store::SalesStore;

/// A sale that made it into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub sale_id: i64,
    pub total: Money,
    /// Stock decrements that were floored or failed.
    pub warnings: Vec<StockAdjustmentWarning>,
}

/// Quantity requested per catalog product, summed across lines.
#[derive(Debug)]
struct Requested {
    name: String,
    quantity: i64,
}

pub struct OrderSubmitter {
    store: Arc<dyn SalesStore>,
    error_log: Arc<ErrorLog>,
    operator: String,
    manual_marker: String,
}

impl OrderSubmitter {
    pub fn new(
        store: Arc<dyn SalesStore>,
        error_log: Arc<ErrorLog>,
        operator: impl Into<String>,
        manual_marker: impl Into<String>,
    ) -> Self {
        OrderSubmitter {
            store,
            error_log,
            operator: operator.into(),
            manual_marker: manual_marker.into(),
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Submits an order.
    ///
    /// ## Arguments
    /// * `items` - Order lines, catalog and manual
    /// * `method` - Payment method; `Pending` leaves the paid fields empty
    /// * `notes` - Stored verbatim on the header
    ///
    /// ## Returns
    /// The new sale id and total. Stock decrement problems do not fail the
    /// call; they come back as warnings and are recorded in the error log.
    #[instrument(skip(self, items, notes), fields(lines = items.len(), method = %method))]
    pub async fn submit(
        &self,
        items: &[OrderLineItem],
        method: PaymentMethod,
        notes: Option<String>,
    ) -> Result<SubmitReceipt, SubmitError> {
        validate_order_items(items)?;

        let requested = requested_stock(items);
        self.check_stock(&requested).await?;

        let manual_product_id = if items.iter().any(|i| i.is_manual) {
            Some(self.resolve_manual_product().await?)
        } else {
            None
        };

        let lines = items
            .iter()
            .map(|item| sale_line(item, manual_product_id))
            .collect::<Result<Vec<_>, _>>()?;

        let total: Money = items.iter().map(OrderLineItem::line_total).sum();
        let header = NewSale::new(total, method, notes, &self.operator, Utc::now());

        let sale_id = match self.store.insert_sale(&header).await {
            Ok(id) => id,
            Err(e) => {
                self.error_log.record(CTX_SAVE_SALE, &e).await;
                return Err(SubmitError::from_store(e));
            }
        };

        if let Err(e) = self.store.insert_items(sale_id, &lines).await {
            self.error_log.record(CTX_SAVE_SALE, &e).await;
            let err = SubmitError::from_store(e);
            return Err(if self.compensate(sale_id).await {
                err
            } else {
                err.with_orphan_sale(sale_id)
            });
        }

        let warnings = self.adjust_stock(&requested).await;

        info!(
            sale_id,
            total = total.units(),
            lines = lines.len(),
            warnings = warnings.len(),
            "Sale submitted"
        );

        Ok(SubmitReceipt {
            sale_id,
            total,
            warnings,
        })
    }

    /// Rejects the order if any catalog product cannot cover its quantity.
    async fn check_stock(&self, requested: &BTreeMap<i64, Requested>) -> Result<(), SubmitError> {
        if requested.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = requested.keys().copied().collect();
        let levels = match self.store.stock_levels(&ids).await {
            Ok(levels) => levels,
            Err(e) => {
                self.error_log.record(CTX_STOCK_VALIDATION, &e).await;
                return Err(SubmitError::from_store(e));
            }
        };

        let shortages: Vec<StockShortage> = requested
            .iter()
            .filter_map(|(&product_id, req)| {
                let available = levels.get(&product_id).copied().unwrap_or(0);
                (available < req.quantity).then(|| StockShortage {
                    product_id,
                    name: req.name.clone(),
                    available,
                    requested: req.quantity,
                })
            })
            .collect();

        if shortages.is_empty() {
            Ok(())
        } else {
            debug!(count = shortages.len(), "Order rejected for stock");
            Err(SubmitError::Stock { shortages })
        }
    }

    async fn resolve_manual_product(&self) -> Result<i64, SubmitError> {
        match self.store.manual_product(&self.manual_marker).await {
            Ok(Some(product)) => Ok(product.id),
            Ok(None) => {
                warn!(marker = %self.manual_marker, "Manual product missing from catalog");
                Err(SubmitError::ManualProductMissing {
                    marker: self.manual_marker.clone(),
                })
            }
            Err(e) => {
                self.error_log.record(CTX_SAVE_SALE, &e).await;
                Err(SubmitError::from_store(e))
            }
        }
    }

    /// Removes a header whose lines could not be written.
    ///
    /// ## Returns
    /// `false` if the header is still in the store.
    async fn compensate(&self, sale_id: i64) -> bool {
        match self.store.delete_sale(sale_id).await {
            Ok(()) => {
                debug!(sale_id, "Removed header without lines");
                true
            }
            Err(e) => {
                error!(sale_id, ?e, "Could not remove header without lines");
                self.error_log
                    .record(CTX_SAVE_SALE, format!("venta {sale_id} sin items: {e}"))
                    .await;
                false
            }
        }
    }

    /// Deletes a header an earlier failed submit left behind.
    ///
    /// A header that is already gone counts as removed. Sale ids are never
    /// reused, so this cannot hit another terminal's sale.
    pub async fn discard_orphan(&self, sale_id: i64) -> Result<(), SubmitError> {
        match self.store.delete_sale(sale_id).await {
            Ok(()) => {
                info!(sale_id, "Removed header left by an earlier submit");
                Ok(())
            }
            Err(DbError::NotFound { .. }) => Ok(()),
            Err(e) => Err(SubmitError::from_store(e).with_orphan_sale(sale_id)),
        }
    }

    async fn adjust_stock(&self, requested: &BTreeMap<i64, Requested>) -> Vec<StockAdjustmentWarning> {
        let mut warnings = Vec::new();

        for (&product_id, req) in requested {
            let reason = match self.store.decrement_stock(product_id, req.quantity).await {
                Ok(StockDecrement::Applied) => continue,
                Ok(StockDecrement::Floored) => "stock insuficiente, quedo en 0".to_string(),
                Err(e) => e.to_string(),
            };

            let warning = StockAdjustmentWarning {
                product_id,
                name: req.name.clone(),
                quantity: req.quantity,
                reason,
            };
            self.error_log.record(CTX_STOCK_ADJUSTMENT, &warning).await;
            warnings.push(warning);
        }

        warnings
    }
}

fn requested_stock(items: &[OrderLineItem]) -> BTreeMap<i64, Requested> {
    let mut requested: BTreeMap<i64, Requested> = BTreeMap::new();
    for item in items {
        if let Some(product_id) = item.stock_backed_product() {
            requested
                .entry(product_id)
                .or_insert_with(|| Requested {
                    name: item.name.clone(),
                    quantity: 0,
                })
                .quantity += item.quantity;
        }
    }
    requested
}

fn sale_line(item: &OrderLineItem, manual_product_id: Option<i64>) -> Result<NewSaleLine, SubmitError> {
    let product_id = if item.is_manual {
        manual_product_id
    } else {
        item.product_id
    };

    let product_id = product_id.ok_or_else(|| ValidationError::Required {
        field: format!("product id of {}", item.name),
    })?;

    Ok(NewSaleLine {
        product_id,
        quantity: item.quantity,
        unit_price: item.unit_price.units(),
        total_price: item.line_total().units(),
    })
}

#[cfg(test)]
mod tests {
    use festive_core::{Product, MANUAL_PRODUCT_MARKER};
    use festive_core::SaleFilter;
    use festive_db::{Database, DbConfig};

    use super::*;
    use crate::store::testing::FlakyStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<FlakyStore>,
        log: Arc<ErrorLog>,
        submitter: OrderSubmitter,
        led: Product,
        manual_id: i64,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let led_id = db.products().insert("Led rojo 100", 2500, Some("Leds"), 5).await.unwrap();
        let manual_id = db.products().insert("Venta manual", 0, Some("Manual"), 0).await.unwrap();
        let led = db.products().get_by_id(led_id).await.unwrap().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ErrorLog::load(dir.path().join("errors.json"), 50).await);
        let store = Arc::new(FlakyStore::new(db));
        let submitter = OrderSubmitter::new(store.clone(), log.clone(), "caja", MANUAL_PRODUCT_MARKER);

        Fixture {
            _dir: dir,
            store,
            log,
            submitter,
            led,
            manual_id,
        }
    }

    fn led_line(led: &Product, quantity: i64) -> OrderLineItem {
        let mut line = OrderLineItem::from_product(led);
        line.quantity = quantity;
        line
    }

    #[tokio::test]
    async fn test_submit_mixed_order() {
        let fx = fixture().await;
        let items = vec![
            led_line(&fx.led, 2),
            OrderLineItem::manual("Flete", Money::from_units(3000), 1),
        ];

        let receipt = fx
            .submitter
            .submit(&items, PaymentMethod::Cash, Some("2x Led rojo 100, 1x Flete".into()))
            .await
            .unwrap();
        assert_eq!(receipt.total.units(), 8000);
        assert!(receipt.warnings.is_empty());

        let db = &fx.store.db;
        let sale = db.sales().get_by_id(receipt.sale_id).await.unwrap().unwrap();
        assert_eq!(sale.total_amount, 8000);
        assert_eq!(sale.paid_by.as_deref(), Some("caja"));
        assert_eq!(sale.paid_method, Some(PaymentMethod::Cash));

        let lines = db.sales().get_items(receipt.sale_id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.iter().map(|l| l.total_price).sum::<i64>(), sale.total_amount);
        assert!(lines.iter().any(|l| l.product_id == fx.manual_id && l.unit_price == 3000));

        let led = db.products().get_by_id(fx.led.id).await.unwrap().unwrap();
        assert_eq!(led.stock, 3);
    }

    #[tokio::test]
    async fn test_pending_sale_has_no_paid_fields() {
        let fx = fixture().await;
        let receipt = fx
            .submitter
            .submit(&[led_line(&fx.led, 1)], PaymentMethod::Pending, Some("PENDIENTE - 1x Led rojo 100".into()))
            .await
            .unwrap();

        let sale = fx.store.db.sales().get_by_id(receipt.sale_id).await.unwrap().unwrap();
        assert!(sale.is_pending());
        assert!(sale.paid_at.is_none());
        assert!(sale.paid_by.is_none());
        assert!(sale.paid_method.is_none());
    }

    #[tokio::test]
    async fn test_shortage_writes_nothing() {
        let fx = fixture().await;
        let err = fx
            .submitter
            .submit(&[led_line(&fx.led, 6)], PaymentMethod::Cash, None)
            .await
            .unwrap_err();

        match err {
            SubmitError::Stock { shortages } => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].available, 5);
                assert_eq!(shortages[0].requested, 6);
            }
            other => panic!("expected stock error, got {other:?}"),
        }
        assert_eq!(fx.store.db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_split_lines_of_one_product_are_summed() {
        let fx = fixture().await;
        let items = vec![led_line(&fx.led, 3), led_line(&fx.led, 3)];

        let err = fx.submitter.submit(&items, PaymentMethod::Cash, None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Stock { .. }));
    }

    #[tokio::test]
    async fn test_empty_order_rejected() {
        let fx = fixture().await;
        let err = fx.submitter.submit(&[], PaymentMethod::Cash, None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[tokio::test]
    async fn test_manual_product_missing() {
        let fx = fixture().await;
        let submitter = OrderSubmitter::new(fx.store.clone(), fx.log.clone(), "caja", "no existe");

        let err = submitter
            .submit(&[OrderLineItem::manual("Flete", Money::from_units(3000), 1)], PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::ManualProductMissing { .. }));
        assert_eq!(fx.store.db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_lines_remove_header() {
        let fx = fixture().await;
        fx.store.set(&fx.store.faults.fail_items, true);

        let err = fx
            .submitter
            .submit(&[led_line(&fx.led, 1)], PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Persistence { orphan_sale: None, .. }));

        let db = &fx.store.db;
        assert!(db.sales().list(&SaleFilter::all()).await.unwrap().is_empty());
        assert_eq!(db.products().get_by_id(fx.led.id).await.unwrap().unwrap().stock, 5);

        let entries = fx.log.entries().await;
        assert!(entries.iter().any(|e| e.context == CTX_SAVE_SALE));
    }

    #[tokio::test]
    async fn test_drop_after_header_reports_orphan() {
        let fx = fixture().await;
        fx.store.set(&fx.store.faults.drop_after_header, true);

        let err = fx
            .submitter
            .submit(&[led_line(&fx.led, 1)], PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(err.is_offline());
        let orphan = err.orphan_sale().unwrap();

        let db = &fx.store.db;
        assert!(db.sales().get_by_id(orphan).await.unwrap().is_some());
        assert!(db.sales().get_items(orphan).await.unwrap().is_empty());

        // Still unreachable: the header stays and the id comes back.
        let again = fx.submitter.discard_orphan(orphan).await.unwrap_err();
        assert_eq!(again.orphan_sale(), Some(orphan));

        fx.store.set(&fx.store.faults.drop_after_header, false);
        fx.store.set(&fx.store.faults.offline, false);
        fx.submitter.discard_orphan(orphan).await.unwrap();
        fx.submitter.discard_orphan(orphan).await.unwrap();
        assert!(db.sales().get_by_id(orphan).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_offline() {
        let fx = fixture().await;
        fx.store.set(&fx.store.faults.offline, true);

        let err = fx
            .submitter
            .submit(&[led_line(&fx.led, 1)], PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(err.is_offline());

        let entries = fx.log.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].context, CTX_STOCK_VALIDATION);
    }

    #[tokio::test]
    async fn test_failed_decrement_keeps_sale() {
        let fx = fixture().await;
        fx.store.set(&fx.store.faults.fail_decrement, true);

        let receipt = fx
            .submitter
            .submit(&[led_line(&fx.led, 2)], PaymentMethod::Transfer, None)
            .await
            .unwrap();
        assert_eq!(receipt.warnings.len(), 1);
        assert!(fx.store.db.sales().get_by_id(receipt.sale_id).await.unwrap().is_some());

        let entries = fx.log.entries().await;
        assert!(entries.iter().any(|e| e.context == CTX_STOCK_ADJUSTMENT));
    }

    #[tokio::test]
    async fn test_concurrent_sale_floors_stock() {
        let fx = fixture().await;
        // Stock read sees 15, the store holds 5.
        fx.store.set(&fx.store.faults.stale_stock, true);

        let receipt = fx
            .submitter
            .submit(&[led_line(&fx.led, 7)], PaymentMethod::Cash, None)
            .await
            .unwrap();
        assert_eq!(receipt.warnings.len(), 1);
        assert_eq!(receipt.warnings[0].product_id, fx.led.id);

        let led = fx.store.db.products().get_by_id(fx.led.id).await.unwrap().unwrap();
        assert_eq!(led.stock, 0);
    }
}
