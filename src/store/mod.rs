//! Report persistence behind the `ReportStore` trait.
//!
//! Reports live in a date-partitioned layout with a fixed "latest" pointer
//! alongside it. Both backends write the dated object first so the pointer
//! never references a date that has no dated copy.

pub mod fs;
pub mod s3;

pub use fs::FsReportStore;
pub use s3::S3ReportStore;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use crate::error::{Error, Result};
use crate::report::Report;

/// Key of the always-current pointer object.
pub const LATEST_KEY: &str = "reports/latest/cost-report.json";

/// Prefix shared by all dated report keys.
pub const DATED_PREFIX: &str = "reports/year=";

/// A report's address in the partitioned layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReportLocator {
    pub date: NaiveDate,
    pub key: String,
}

impl StoredReportLocator {
    /// The canonical dated key for a report date.
    pub fn for_date(date: NaiveDate) -> Self {
        let key = format!(
            "reports/year={:04}/month={:02}/day={:02}/cost-report-{}.json",
            date.year(),
            date.month(),
            date.day(),
            date.format("%Y-%m-%d"),
        );
        Self { date, key }
    }

    /// Recover the report date from a dated key. Returns `None` for the
    /// latest pointer and anything else outside the partitioned layout.
    pub fn from_key(key: &str) -> Option<Self> {
        let file = key.strip_prefix(DATED_PREFIX).and_then(|rest| {
            rest.split('/').next_back()
        })?;
        let date = file
            .strip_prefix("cost-report-")?
            .strip_suffix(".json")?
            .parse()
            .ok()?;
        let canonical = Self::for_date(date);
        (canonical.key == key).then_some(canonical)
    }
}

/// Inclusive date range used by listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidInput(format!(
                "date range is inverted: {from} > {to}"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Where reports go and come back from. Backends are interchangeable;
/// the pipeline only sees this trait.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist the report under its dated key and refresh the latest
    /// pointer. Writing the same date twice overwrites in place.
    async fn put(&self, report: &Report) -> Result<StoredReportLocator>;

    /// Fetch the report for a date, or the latest one when `date` is `None`.
    async fn get(&self, date: Option<NaiveDate>) -> Result<Report>;

    /// Dated report locators inside the range, oldest first. The latest
    /// pointer is never included.
    async fn list(&self, range: DateRange) -> Result<Vec<StoredReportLocator>>;

    /// Human-readable destination for logs and run summaries.
    fn describe(&self) -> String;
}

pub(crate) fn encode(report: &Report) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(report)
        .map_err(|e| Error::StorageUnavailable(format!("report failed to serialize: {e}")))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Report> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::StorageUnavailable(format!("stored report is not readable: {e}")))
}
