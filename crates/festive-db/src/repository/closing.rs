//! # Closing Repository
//!
//! Cash closing records. Rows are insert-only.
//!
//! ## Conditional Insert
//! ```text
//! Terminal A computes window [t0, t1)     Terminal B computes window [t0, t2)
//!          │                                        │
//!          ▼                                        ▼
//! INSERT ... WHERE MAX(created_at) IS t0   INSERT ... WHERE MAX(created_at) IS t0
//!          │                                        │
//!          ▼                                        ▼
//!     1 row (saved)                          0 rows → DbError::Conflict
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::notify::{ChangeFeed, ChangeKind, Table};
use crate::repository::timestamp;
use festive_core::{ClosingRecord, NewClosing};

#[derive(Debug, Clone)]
pub struct ClosingRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl ClosingRepository {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        ClosingRepository { pool, feed }
    }

    /// `created_at` of the newest closing, if any.
    pub async fn latest_created_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM cash_closures")
                .fetch_one(&self.pool)
                .await?;

        Ok(latest)
    }

    /// Inserts `closing` only if the newest stored closing is still
    /// `expected_latest` (`None` meaning there is none).
    ///
    /// ## Returns
    /// * `Ok(id)` - The closing was saved
    /// * `Err(DbError::Conflict)` - Another closing was saved in between
    pub async fn insert_if_latest(
        &self,
        closing: &NewClosing,
        expected_latest: Option<DateTime<Utc>>,
    ) -> DbResult<i64> {
        debug!(
            date = %closing.date,
            expected_cash = closing.expected_cash,
            real_cash = closing.real_cash,
            "Inserting closing"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO cash_closures (
                date, expected_cash, real_cash, expected_transfers, real_transfers,
                comment, closed_by, created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
            WHERE (SELECT MAX(created_at) FROM cash_closures) IS ?9
            "#,
        )
        .bind(closing.date)
        .bind(closing.expected_cash)
        .bind(closing.real_cash)
        .bind(closing.expected_transfers)
        .bind(closing.real_transfers)
        .bind(closing.comment.as_deref())
        .bind(closing.closed_by.as_str())
        .bind(timestamp(closing.created_at))
        .bind(expected_latest.map(timestamp))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(
                "a newer cash closing was saved; recompute the window".to_string(),
            ));
        }

        let id = result.last_insert_rowid();
        info!(id, closed_by = %closing.closed_by, "Cash closing saved");
        self.feed.publish(Table::CashClosures, ChangeKind::Insert, Some(id));
        Ok(id)
    }

    /// Newest closings first.
    pub async fn list_recent(&self, limit: i64) -> DbResult<Vec<ClosingRecord>> {
        let records = sqlx::query_as::<_, ClosingRecord>(
            r#"
            SELECT id, date, expected_cash, real_cash, expected_transfers, real_transfers,
                   comment, closed_by, created_at
            FROM cash_closures
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
