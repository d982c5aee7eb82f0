//! Error taxonomy for the report pipeline.
//!
//! Every fallible seam in the pipeline maps into one of four variants. The
//! orchestrator decides what is fatal: billing and storage failures fail the
//! run, per-category scan failures degrade to empty results and are recorded
//! on the scan outcome instead of passing through here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Billing or inventory API unreachable, not yet provisioned, or timed
    /// out. Billing data can lag up to 24 hours, so callers should treat this
    /// as retryable-by-waiting.
    #[error("remote data unavailable: {0}")]
    RemoteDataUnavailable(String),

    /// Malformed inputs to the report builder. Fatal to the run.
    #[error("invalid report input: {0}")]
    InvalidInput(String),

    /// Read or write failure against the report sink. Not retried internally;
    /// the invoking scheduler owns the retry policy.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A read targeted a locator with no stored report behind it.
    #[error("report not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP-style status code used in the invocation result.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RemoteDataUnavailable(_) => 503,
            Error::InvalidInput(_) => 400,
            Error::StorageUnavailable(_) => 503,
            Error::NotFound(_) => 404,
        }
    }
}
