//! # View Filters
//!
//! The read-only lists the terminal keeps fresh, and how their filters turn
//! into a sale query.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┬─────────────────────────┐
//! │ View         │ Date range                   │ Bounds                  │
//! ├──────────────┼──────────────────────────────┼─────────────────────────┤
//! │ Overview     │ today / yesterday / last7 /  │ calendar days, local,   │
//! │              │ all                          │ [midnight, midnight)    │
//! │ Pending      │ today / 7d / 30d / all       │ rolling, ending now     │
//! │ Closing      │ open closing window          │ [from, to)              │
//! └──────────────┴──────────────────────────────┴─────────────────────────┘
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::closing::{start_of_day, ClosingWindow};
use crate::types::PaymentMethod;

// =============================================================================
// Sale Filter
// =============================================================================

/// A filtered sale read, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleFilter {
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Whether `created_to` itself is included.
    pub to_inclusive: bool,
    pub method: Option<PaymentMethod>,
    /// Case-insensitive substring match on notes.
    pub notes_contains: Option<String>,
}

impl SaleFilter {
    /// Every sale.
    pub fn all() -> Self {
        SaleFilter::default()
    }

    /// `from <= created_at <= to`
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        SaleFilter {
            created_from: Some(from),
            created_to: Some(to),
            to_inclusive: true,
            ..SaleFilter::default()
        }
    }

    /// `from <= created_at < to`
    pub fn until(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        SaleFilter {
            created_from: Some(from),
            created_to: Some(to),
            to_inclusive: false,
            ..SaleFilter::default()
        }
    }

    /// Sales inside a closing window.
    pub fn in_window(window: &ClosingWindow) -> Self {
        SaleFilter::until(window.from, window.to)
    }

    pub fn with_method(mut self, method: Option<PaymentMethod>) -> Self {
        self.method = method;
        self
    }

    /// Blank searches are dropped.
    pub fn with_notes_search(mut self, search: Option<&str>) -> Self {
        self.notes_contains = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }
}

// =============================================================================
// Overview
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum OverviewRange {
    Today,
    Yesterday,
    Last7,
    #[default]
    All,
}

impl OverviewRange {
    /// Half-open `[from, to)` bounds, or `None` for [`OverviewRange::All`].
    ///
    /// Ranges are whole local days; `last7` is the six previous days plus
    /// today. A sale at midnight belongs to the day that starts there.
    pub fn bounds<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = start_of_day(now, tz);
        let tomorrow = today + Duration::days(1);
        match self {
            OverviewRange::Today => Some((today, tomorrow)),
            OverviewRange::Yesterday => Some((today - Duration::days(1), today)),
            OverviewRange::Last7 => Some((today - Duration::days(6), tomorrow)),
            OverviewRange::All => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OverviewFilter {
    pub range: OverviewRange,
    /// `None` shows every method.
    pub method: Option<PaymentMethod>,
}

impl OverviewFilter {
    pub fn to_sale_filter<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> SaleFilter {
        let base = match self.range.bounds(now, tz) {
            Some((from, to)) => SaleFilter::until(from, to),
            None => SaleFilter::all(),
        };
        base.with_method(self.method)
    }
}

// =============================================================================
// Pending
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PendingRange {
    #[default]
    Today,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    All,
}

impl PendingRange {
    /// Inclusive bounds ending at `now`, or `None` for [`PendingRange::All`].
    pub fn bounds<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            PendingRange::Today => Some((start_of_day(now, tz), now)),
            PendingRange::Last7Days => Some((now - Duration::days(7), now)),
            PendingRange::Last30Days => Some((now - Duration::days(30), now)),
            PendingRange::All => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PendingFilter {
    pub range: PendingRange,
    /// `None` means pending orders only.
    pub method: Option<PaymentMethod>,
    pub search: Option<String>,
}

impl PendingFilter {
    pub fn effective_method(&self) -> PaymentMethod {
        self.method.unwrap_or(PaymentMethod::Pending)
    }

    pub fn to_sale_filter<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> SaleFilter {
        let base = match self.range.bounds(now, tz) {
            Some((from, to)) => SaleFilter::between(from, to),
            None => SaleFilter::all(),
        };
        base.with_method(Some(self.effective_method()))
            .with_notes_search(self.search.as_deref())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
