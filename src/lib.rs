//! costwatch — scheduled AWS cost reporting.
//!
//! Each run pulls billing data from Cost Explorer, scans the account for
//! idle resources, folds both into a daily report with trends and ranked
//! recommendations, and persists it to a date-partitioned store with a
//! stable "latest" pointer.

pub mod config;
pub mod cost;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{InvocationResult, Pipeline};
pub use report::{Report, ReportBuilder, ReportThresholds};
