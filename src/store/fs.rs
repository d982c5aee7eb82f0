//! Filesystem-backed report store for local runs and tests.
//!
//! Mirrors the object layout exactly: keys become paths under the root
//! directory, so a tree written here matches what the S3 backend produces.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::error::{Error, Result};
use crate::report::Report;
use crate::store::{decode, encode, DateRange, ReportStore, StoredReportLocator, LATEST_KEY};

pub struct FsReportStore {
    root: PathBuf,
}

impl FsReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn write_key(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::StorageUnavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("cannot write {}: {e}", path.display())))
    }

    async fn read_key(&self, key: &str) -> Result<Report> {
        let path = self.path_for(key);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("no report at {key}"))
            } else {
                Error::StorageUnavailable(format!("cannot read {}: {e}", path.display()))
            }
        })?;
        decode(&bytes)
    }

    /// Collect dated report files under `dir`, recursing into partition
    /// directories.
    fn walk<'a>(
        &'a self,
        dir: &'a Path,
        found: &'a mut Vec<StoredReportLocator>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    return Err(Error::StorageUnavailable(format!(
                        "cannot list {}: {e}",
                        dir.display()
                    )))
                }
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                Error::StorageUnavailable(format!("cannot list {}: {e}", dir.display()))
            })? {
                let path = entry.path();
                if path.is_dir() {
                    self.walk(&path, found).await?;
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel.to_string_lossy().replace('\\', "/");
                    if let Some(locator) = StoredReportLocator::from_key(&key) {
                        found.push(locator);
                    }
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ReportStore for FsReportStore {
    async fn put(&self, report: &Report) -> Result<StoredReportLocator> {
        let locator = StoredReportLocator::for_date(report.date);
        let bytes = encode(report)?;

        // Dated copy first so the latest pointer never leads nowhere.
        self.write_key(&locator.key, &bytes).await?;
        self.write_key(LATEST_KEY, &bytes).await?;
        debug!(key = %locator.key, "report written");
        Ok(locator)
    }

    async fn get(&self, date: Option<NaiveDate>) -> Result<Report> {
        let key = match date {
            Some(date) => StoredReportLocator::for_date(date).key,
            None => LATEST_KEY.to_string(),
        };
        self.read_key(&key).await
    }

    async fn list(&self, range: DateRange) -> Result<Vec<StoredReportLocator>> {
        let mut found = Vec::new();
        let base = self.root.join("reports");
        self.walk(&base, &mut found).await?;
        found.retain(|locator| range.contains(locator.date));
        found.sort_by_key(|locator| locator.date);
        Ok(found)
    }

    fn describe(&self) -> String {
        format!("dir {}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::ReportPeriod;
    use crate::report::{PricingTable, ReportBuilder, ReportThresholds};
    use crate::scanner::IdleResourceSet;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn report(date: &str, total: f64) -> Report {
        let date: NaiveDate = date.parse().unwrap();
        let snapshot = crate::cost::CostSnapshot {
            period: ReportPeriod::ending(date, 30).unwrap(),
            total_cost: total,
            currency: "USD".to_string(),
            daily_costs: Vec::new(),
            services: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        ReportBuilder::new(ReportThresholds::default(), PricingTable::default())
            .build(
                snapshot,
                IdleResourceSet::default(),
                total,
                None,
                "test",
                date,
                Utc::now(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());

        let report = report("2025-08-29", 120.5);
        let locator = store.put(&report).await.unwrap();
        assert_eq!(
            locator.key,
            "reports/year=2025/month=08/day=29/cost-report-2025-08-29.json"
        );

        let fetched = store.get(Some(report.date)).await.unwrap();
        assert_eq!(fetched, report);
    }

    #[tokio::test]
    async fn test_latest_pointer_tracks_most_recent_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());

        store.put(&report("2025-08-28", 100.0)).await.unwrap();
        let newer = report("2025-08-29", 200.0);
        store.put(&newer).await.unwrap();

        let latest = store.get(None).await.unwrap();
        assert_eq!(latest, newer);
    }

    #[tokio::test]
    async fn test_rewriting_a_date_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());

        store.put(&report("2025-08-29", 100.0)).await.unwrap();
        let corrected = report("2025-08-29", 150.0);
        store.put(&corrected).await.unwrap();

        let fetched = store.get(Some(corrected.date)).await.unwrap();
        assert_eq!(fetched.summary.total_cost, 150.0);

        let range = DateRange::new(corrected.date, corrected.date).unwrap();
        assert_eq!(store.list(range).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_latest_write_still_leaves_dated_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());
        // A directory squatting on the pointer path makes the second write fail.
        tokio::fs::create_dir_all(dir.path().join(LATEST_KEY))
            .await
            .unwrap();

        let report = report("2025-08-29", 120.5);
        let err = store.put(&report).await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));

        // The dated partition went first, so it survives the failed pointer.
        let dated = store.get(Some(report.date)).await.unwrap();
        assert_eq!(dated, report);
    }

    #[tokio::test]
    async fn test_failed_dated_write_leaves_no_latest_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());
        let report = report("2025-08-29", 120.5);
        let locator = StoredReportLocator::for_date(report.date);
        tokio::fs::create_dir_all(dir.path().join(&locator.key))
            .await
            .unwrap();

        let err = store.put(&report).await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));

        // The pointer is never written when the dated copy fails.
        let err = store.get(None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_report_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());

        let err = store
            .get(Some("2025-01-01".parse().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = store.get(None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_range_and_skips_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsReportStore::new(dir.path());

        for day in ["2025-08-27", "2025-08-28", "2025-08-29"] {
            store.put(&report(day, 100.0)).await.unwrap();
        }

        let range = DateRange::new(
            "2025-08-28".parse().unwrap(),
            "2025-08-29".parse().unwrap(),
        )
        .unwrap();
        let listed = store.list(range).await.unwrap();
        let dates: Vec<String> = listed.iter().map(|l| l.date.to_string()).collect();
        assert_eq!(dates, vec!["2025-08-28", "2025-08-29"]);
        assert!(listed.iter().all(|l| l.key != LATEST_KEY));
    }
}
