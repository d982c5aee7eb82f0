//! Billing data types and the cost-data capability trait.
//!
//! The pipeline talks to the billing API only through [`CostDataSource`], so
//! everything downstream of it (builder, orchestration) works against a fake
//! in tests. The Cost Explorer implementation lives in [`explorer`].

pub mod explorer;

pub use explorer::CostExplorerSource;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Longest window the billing API is asked for.
const MAX_WINDOW_DAYS: i64 = 366;

/// Half-open reporting window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidInput(format!(
                "report period must end after it starts ({start} ..= {end})"
            )));
        }
        if (end - start).num_days() > MAX_WINDOW_DAYS {
            return Err(Error::InvalidInput(format!(
                "report period may not exceed {MAX_WINDOW_DAYS} days"
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of `lookback_days` ending at (and excluding) `date`.
    pub fn ending(date: NaiveDate, lookback_days: i64) -> Result<Self> {
        if lookback_days <= 0 {
            return Err(Error::InvalidInput(format!(
                "lookback window must be positive, got {lookback_days}"
            )));
        }
        Self::new(date - Duration::days(lookback_days), date)
    }

    /// The adjacent window of the same length immediately before this one.
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - Duration::days(self.days()),
            end: self.start,
        }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// One day's spend inside the reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub cost: f64,
}

/// Raw cost-and-usage answer for one window: period total, the daily series,
/// and the per-service breakdown, all rounded to cents.
#[derive(Debug, Clone, PartialEq)]
pub struct CostUsage {
    pub total_cost: f64,
    pub daily_costs: Vec<DailyCost>,
    pub currency: String,
    pub services: BTreeMap<String, f64>,
}

/// Best-effort spend forecast for the period after the reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostForecast {
    pub forecasted_cost: f64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// Everything the pipeline computed from the billing API for one window.
/// Immutable once assembled; the report builder consumes it whole.
#[derive(Debug, Clone, PartialEq)]
pub struct CostSnapshot {
    pub period: ReportPeriod,
    pub total_cost: f64,
    pub currency: String,
    pub daily_costs: Vec<DailyCost>,
    pub services: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, f64>,
}

/// Read-only access to the billing API.
#[async_trait]
pub trait CostDataSource: Send + Sync {
    /// Total, daily series, and per-service breakdown for the window.
    ///
    /// Fails with `RemoteDataUnavailable` when the billing API is not yet
    /// enabled or returns no rows; billing data lags up to 24 hours.
    async fn cost_and_usage(&self, period: &ReportPeriod) -> Result<CostUsage>;

    /// Plain total for a window, used for the previous-period comparison.
    async fn period_total(&self, period: &ReportPeriod) -> Result<f64>;

    /// Spend grouped by one cost-allocation tag key. Empty map when the
    /// account reports no activations for the key. The breakdown is an
    /// optional report section; callers degrade errors to an empty map
    /// rather than failing the run.
    async fn cost_by_tag(&self, period: &ReportPeriod, tag_key: &str)
        -> Result<BTreeMap<String, f64>>;

    /// Best-effort forecast; `None` on any provider error.
    async fn cost_forecast(&self, period: &ReportPeriod) -> Option<CostForecast>;
}

/// Round to cents, the precision everything in the report is stored at.
pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_period_ending() {
        let period = ReportPeriod::ending(date("2025-08-30"), 30).unwrap();
        assert_eq!(period.start, date("2025-07-31"));
        assert_eq!(period.end, date("2025-08-30"));
        assert_eq!(period.days(), 30);
    }

    #[test]
    fn test_previous_period_is_adjacent_and_same_length() {
        let period = ReportPeriod::ending(date("2025-08-30"), 30).unwrap();
        let previous = period.previous();
        assert_eq!(previous.end, period.start);
        assert_eq!(previous.days(), period.days());
        assert_eq!(previous.start, date("2025-07-01"));
    }

    #[test]
    fn test_inverted_period_rejected() {
        let err = ReportPeriod::new(date("2025-08-30"), date("2025-08-30")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_window_longer_than_a_year_rejected() {
        let err = ReportPeriod::ending(date("2025-08-30"), 400).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_zero_lookback_rejected() {
        assert!(ReportPeriod::ending(date("2025-08-30"), 0).is_err());
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(123.4567), 123.46);
        assert_eq!(round_cents(0.004), 0.0);
        assert_eq!(round_cents(-35.134), -35.13);
    }
}
