//! # Closing Window Calculator
//!
//! Computes the interval a cash closing covers, the per-method totals inside
//! it, and saves the closing record.
//!
//! ```text
//!   closing #1              closing #2                  now
//!   created_at=t1           created_at=t2                │
//!       │◄──── window 2 ────►│◄──────── open window ────►│
//!
//!   No closing yet: the open window starts at local midnight.
//! ```
//!
//! A saved closing's `created_at` is its window end, so consecutive windows
//! share their boundary and a sale falls in exactly one of them. The insert
//! is conditional on the newest closing still being the one the window was
//! computed from; two terminals closing at once cannot both succeed.

use chrono::{DateTime, Local, SubsecRound, Utc};
use festive_core::validation::validate_counted_cash;
use festive_core::{ClosingRecord, ClosingSummary, ClosingWindow, Money, NewClosing};
use festive_db::{Database, DbError};
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};

/// A computed summary plus the closing it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosingReview {
    pub summary: ClosingSummary,
    /// `created_at` of the newest closing when the window was computed.
    pub last_closing: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ClosingService {
    db: Database,
    operator: String,
}

impl ClosingService {
    pub fn new(db: Database, operator: impl Into<String>) -> Self {
        ClosingService {
            db,
            operator: operator.into(),
        }
    }

    /// The window open at `now`.
    ///
    /// If the newest closing cannot be read the window starts at local
    /// midnight. A later save then only succeeds if there really is no
    /// closing yet.
    pub async fn open_window(&self, now: DateTime<Utc>) -> (ClosingWindow, Option<DateTime<Utc>>) {
        let last_closing = match self.db.closings().latest_created_at().await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(?e, "Could not read last closing, window starts at midnight");
                None
            }
        };

        (ClosingWindow::open(last_closing, now, &Local), last_closing)
    }

    /// Totals for the open window and the difference against `counted_cash`.
    pub async fn review(&self, counted_cash: Money) -> SyncResult<ClosingReview> {
        let now = Utc::now().trunc_subsecs(6);
        let (window, last_closing) = self.open_window(now).await;
        let totals = self.db.sales().item_totals_by_method(&window).await?;

        Ok(ClosingReview {
            summary: ClosingSummary::new(window, totals, counted_cash),
            last_closing,
        })
    }

    /// Saves the closing for a reviewed window.
    ///
    /// ## Returns
    /// * `Ok(id)` - The closing was recorded
    /// * `Err(ClosingConflict)` - Another closing was saved since the review
    pub async fn save(&self, review: &ClosingReview, comment: Option<String>) -> SyncResult<i64> {
        let summary = &review.summary;
        validate_counted_cash(summary.counted_cash.units())?;

        let closing = NewClosing::for_window(
            &summary.window,
            &summary.totals,
            summary.counted_cash,
            comment,
            self.operator.as_str(),
            &Local,
        );

        match self.db.closings().insert_if_latest(&closing, review.last_closing).await {
            Ok(id) => {
                info!(
                    id,
                    expected_cash = closing.expected_cash,
                    difference = closing.cash_difference().units(),
                    "Closing recorded"
                );
                Ok(id)
            }
            Err(DbError::Conflict(msg)) => Err(SyncError::ClosingConflict(msg)),
            Err(e) => Err(e.into()),
        }
    }

    /// Reviews the open window and saves it in one step.
    pub async fn close(&self, counted_cash: Money, comment: Option<String>) -> SyncResult<ClosingReview> {
        validate_counted_cash(counted_cash.units())?;
        let review = self.review(counted_cash).await?;
        self.save(&review, comment).await?;
        Ok(review)
    }

    /// Newest closings first.
    pub async fn history(&self, limit: i64) -> SyncResult<Vec<ClosingRecord>> {
        Ok(self.db.closings().list_recent(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use festive_core::{MethodTotals, NewSale, NewSaleLine, PaymentMethod};
    use festive_db::DbConfig;

    use super::*;

    async fn setup() -> (Database, i64, ClosingService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let led = db.products().insert("Led rojo 100", 2500, Some("Leds"), 50).await.unwrap();
        let service = ClosingService::new(db.clone(), "caja");
        (db, led, service)
    }

    async fn sale(db: &Database, product: i64, units: i64, method: PaymentMethod, at: DateTime<Utc>) {
        let id = db
            .sales()
            .insert_sale(&NewSale::new(Money::from_units(units), method, None, "caja", at))
            .await
            .unwrap();
        db.sales()
            .insert_items(
                id,
                &[NewSaleLine { product_id: product, quantity: 1, unit_price: units, total_price: units }],
            )
            .await
            .unwrap();
    }

    /// Stores a closing ending at `at`, so tests do not depend on local midnight.
    async fn closing_at(db: &Database, at: DateTime<Utc>) {
        let window = ClosingWindow { from: at - Duration::hours(8), to: at };
        let closing = NewClosing::for_window(&window, &MethodTotals::default(), Money::zero(), None, "caja", &Local);
        let latest = db.closings().latest_created_at().await.unwrap();
        db.closings().insert_if_latest(&closing, latest).await.unwrap();
    }

    #[tokio::test]
    async fn test_review_counts_only_open_window() {
        let (db, led, service) = setup().await;
        let now = Utc::now().trunc_subsecs(6);
        closing_at(&db, now - Duration::hours(2)).await;

        sale(&db, led, 1000, PaymentMethod::Cash, now - Duration::hours(3)).await;
        sale(&db, led, 2500, PaymentMethod::Cash, now - Duration::hours(1)).await;
        sale(&db, led, 4000, PaymentMethod::Transfer, now - Duration::minutes(30)).await;
        sale(&db, led, 700, PaymentMethod::Pending, now - Duration::minutes(10)).await;

        let review = service.review(Money::from_units(2000)).await.unwrap();
        let summary = review.summary;
        assert_eq!(summary.window.from, now - Duration::hours(2));
        assert_eq!(summary.totals.cash.units(), 2500);
        assert_eq!(summary.totals.transfer.units(), 4000);
        assert_eq!(summary.totals.pending.units(), 700);
        assert_eq!(summary.closing_total.units(), 7200);
        assert_eq!(summary.cash_difference.units(), -500);
    }

    #[tokio::test]
    async fn test_consecutive_closings_share_boundary() {
        let (db, led, service) = setup().await;
        let now = Utc::now().trunc_subsecs(6);
        closing_at(&db, now - Duration::hours(2)).await;
        sale(&db, led, 2500, PaymentMethod::Cash, now - Duration::hours(1)).await;

        let first = service.close(Money::from_units(2500), Some("sin novedad".into())).await.unwrap();
        assert_eq!(first.summary.totals.cash.units(), 2500);

        let second = service.review(Money::zero()).await.unwrap();
        assert_eq!(second.summary.window.from, first.summary.window.to);
        assert!(second.summary.totals.total().is_zero());

        let history = service.history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].created_at, first.summary.window.to);
        assert_eq!(history[0].expected_cash, 2500);
        assert_eq!(history[0].real_transfers, history[0].expected_transfers);
        assert_eq!(history[0].comment.as_deref(), Some("sin novedad"));
    }

    #[tokio::test]
    async fn test_stale_review_conflicts() {
        let (db, _led, service) = setup().await;
        let other_terminal = ClosingService::new(db.clone(), "caja 2");

        let review = service.review(Money::zero()).await.unwrap();
        other_terminal.close(Money::zero(), None).await.unwrap();

        let err = service.save(&review, None).await.unwrap_err();
        assert!(matches!(err, SyncError::ClosingConflict(_)));
        assert!(err.is_retryable());
        assert_eq!(service.history(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_counted_cash_rejected() {
        let (_db, _led, service) = setup().await;
        let err = service.close(Money::from_units(-1), None).await.unwrap_err();
        assert!(matches!(err, SyncError::Draft(_)));
        assert!(service.history(10).await.unwrap().is_empty());
    }
}
