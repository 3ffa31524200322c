//! # Closing Window
//!
//! Cash closing reconciles everything sold since the previous closing.
//!
//! ## Contiguous Windows
//! ```text
//!  start of day      closing #1          closing #2          now
//!       │                 │                   │               │
//!       ▼                 ▼                   ▼               ▼
//!  ─────[─────────────────)[──────────────────)[──────────────)────►
//!        window 1               window 2           open window
//!
//!  window(n+1).from == window(n).to   (closing n is stamped with window(n).to)
//! ```
//!
//! With no prior closing, the window starts at local midnight.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::PaymentMethod;

// =============================================================================
// Window
// =============================================================================

/// Half-open interval `[from, to)` of sale creation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClosingWindow {
    #[ts(as = "String")]
    pub from: DateTime<Utc>,
    #[ts(as = "String")]
    pub to: DateTime<Utc>,
}

impl ClosingWindow {
    /// The window still open at `now`.
    ///
    /// ## Arguments
    /// * `last_closing` - `created_at` of the newest closing, `None` when there
    ///   is none or it could not be read
    /// * `now` - window end
    /// * `tz` - zone whose midnight starts the first window of the day
    pub fn open<Tz: TimeZone>(last_closing: Option<DateTime<Utc>>, now: DateTime<Utc>, tz: &Tz) -> Self {
        let from = last_closing.unwrap_or_else(|| start_of_day(now, tz));
        ClosingWindow {
            from,
            to: now.max(from),
        }
    }

    #[inline]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }

    /// The window that opens when this one is closed.
    pub fn next(&self, now: DateTime<Utc>) -> ClosingWindow {
        ClosingWindow {
            from: self.to,
            to: now.max(self.to),
        }
    }
}

/// Local midnight of `now`'s calendar day, as UTC.
pub fn start_of_day<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let midnight = now.with_timezone(tz).date_naive().and_time(NaiveTime::default());

    // DST gaps may skip midnight entirely
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

// =============================================================================
// Totals
// =============================================================================

/// Which column a sale's amount is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ClosingBucket {
    Cash,
    Transfer,
    Pending,
    /// Anything the terminal does not recognise.
    Other,
}

impl ClosingBucket {
    /// Buckets a raw `payment_method` column value.
    pub fn from_raw(method: &str) -> Self {
        match method.parse::<PaymentMethod>() {
            Ok(m) => m.into(),
            Err(_) => ClosingBucket::Other,
        }
    }
}

impl From<PaymentMethod> for ClosingBucket {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => ClosingBucket::Cash,
            PaymentMethod::Transfer => ClosingBucket::Transfer,
            PaymentMethod::Pending => ClosingBucket::Pending,
        }
    }
}

/// Per-method sums for a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodTotals {
    pub cash: Money,
    pub transfer: Money,
    pub pending: Money,
    pub other: Money,
}

impl MethodTotals {
    pub fn add(&mut self, bucket: ClosingBucket, amount: Money) {
        match bucket {
            ClosingBucket::Cash => self.cash += amount,
            ClosingBucket::Transfer => self.transfer += amount,
            ClosingBucket::Pending => self.pending += amount,
            ClosingBucket::Other => self.other += amount,
        }
    }

    /// Sums `(payment_method, amount)` rows.
    ///
    /// ## Example
    /// ```rust
    /// use festive_core::closing::MethodTotals;
    ///
    /// let totals = MethodTotals::from_rows([
    ///     ("cash".to_string(), 5000),
    ///     ("transfer".to_string(), 3000),
    ///     ("giftcard".to_string(), 100),
    /// ]);
    /// assert_eq!(totals.cash.units(), 5000);
    /// assert_eq!(totals.other.units(), 100);
    /// assert_eq!(totals.total().units(), 8100);
    /// ```
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        let mut totals = MethodTotals::default();
        for (method, amount) in rows {
            totals.add(ClosingBucket::from_raw(method.as_ref()), Money::from_units(amount));
        }
        totals
    }

    pub fn get(&self, bucket: ClosingBucket) -> Money {
        match bucket {
            ClosingBucket::Cash => self.cash,
            ClosingBucket::Transfer => self.transfer,
            ClosingBucket::Pending => self.pending,
            ClosingBucket::Other => self.other,
        }
    }

    pub fn total(&self) -> Money {
        self.cash + self.transfer + self.pending + self.other
    }
}

// =============================================================================
// Closing Record Draft
// =============================================================================

/// A closing about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClosing {
    pub date: NaiveDate,
    pub expected_cash: i64,
    pub real_cash: i64,
    pub expected_transfers: i64,
    pub real_transfers: i64,
    pub comment: Option<String>,
    pub closed_by: String,
    /// Equal to the window end so the next window starts here.
    pub created_at: DateTime<Utc>,
}

impl NewClosing {
    /// Builds the record for `window`.
    ///
    /// Transfers are not counted by hand; the expected amount is recorded as
    /// the counted amount too.
    pub fn for_window<Tz: TimeZone>(
        window: &ClosingWindow,
        totals: &MethodTotals,
        counted_cash: Money,
        comment: Option<String>,
        closed_by: impl Into<String>,
        tz: &Tz,
    ) -> Self {
        NewClosing {
            date: window.to.with_timezone(tz).date_naive(),
            expected_cash: totals.cash.units(),
            real_cash: counted_cash.units(),
            expected_transfers: totals.transfer.units(),
            real_transfers: totals.transfer.units(),
            comment: comment
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            closed_by: closed_by.into(),
            created_at: window.to,
        }
    }

    /// counted − expected
    pub fn cash_difference(&self) -> Money {
        Money::from_units(self.real_cash - self.expected_cash)
    }
}

/// What the closing screen shows before the operator saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ClosingSummary {
    pub window: ClosingWindow,
    pub totals: MethodTotals,
    pub closing_total: Money,
    pub counted_cash: Money,
    pub cash_difference: Money,
}

impl ClosingSummary {
    pub fn new(window: ClosingWindow, totals: MethodTotals, counted_cash: Money) -> Self {
        ClosingSummary {
            window,
            totals,
            closing_total: totals.total(),
            counted_cash,
            cash_difference: counted_cash - totals.cash,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
